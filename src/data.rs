//! Attribute bundles.
//!
//! Prim attributes are exposed as containers mapping field names to data
//! sources. A data source is either a leaf [`Value`] or a nested container;
//! containers are trait objects so implementations can be lazy (the
//! flattening cache's wrappers compute their fields on first access).

use std::fmt;
use std::sync::Arc;

use crate::gf::Matrix4d;
use crate::locator::Locator;

/// A leaf attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Token(String),
    Matrix(Matrix4d),
    Double(f64),
    Doubles(Vec<f64>),
}

/// Shared handle to a container data source.
pub type ContainerHandle = Arc<dyn ContainerDataSource>;

/// A key-value mapping of attribute fields.
///
/// Implementations may compute values lazily in `get`; callers must tolerate
/// concurrent access.
pub trait ContainerDataSource: Send + Sync {
    /// The field names this container provides.
    fn names(&self) -> Vec<String>;

    /// Look up a field by name.
    fn get(&self, name: &str) -> Option<DataSource>;
}

/// Either a leaf value or a nested container.
#[derive(Clone)]
pub enum DataSource {
    Value(Value),
    Container(ContainerHandle),
}

impl DataSource {
    /// A boolean leaf.
    pub fn boolean(value: bool) -> Self {
        Self::Value(Value::Bool(value))
    }

    /// A token leaf.
    pub fn token(value: impl Into<String>) -> Self {
        Self::Value(Value::Token(value.into()))
    }

    /// A matrix leaf.
    pub fn matrix(value: Matrix4d) -> Self {
        Self::Value(Value::Matrix(value))
    }

    /// The nested container, if this is one.
    pub fn as_container(&self) -> Option<&ContainerHandle> {
        match self {
            Self::Container(container) => Some(container),
            Self::Value(_) => None,
        }
    }

    /// Consume into a container handle, if this is one.
    pub fn into_container(self) -> Option<ContainerHandle> {
        match self {
            Self::Container(container) => Some(container),
            Self::Value(_) => None,
        }
    }

    /// The leaf value, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Container(_) => None,
        }
    }

    /// The boolean leaf value, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self.as_value() {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// The token leaf value, if this is one.
    pub fn as_token(&self) -> Option<&str> {
        match self.as_value() {
            Some(Value::Token(t)) => Some(t),
            _ => None,
        }
    }

    /// The matrix leaf value, if this is one.
    pub fn as_matrix(&self) -> Option<Matrix4d> {
        match self.as_value() {
            Some(Value::Matrix(m)) => Some(*m),
            _ => None,
        }
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "DataSource::Value({value:?})"),
            Self::Container(_) => write!(f, "DataSource::Container(..)"),
        }
    }
}

/// Follow `locator` through nested containers starting at `container`.
pub fn get_at(container: &ContainerHandle, locator: &Locator) -> Option<DataSource> {
    let mut current = DataSource::Container(container.clone());
    for index in 0..locator.len() {
        let name = locator.element(index)?;
        current = current.as_container()?.get(name)?;
    }
    Some(current)
}

/// An eager container backed by a list of named fields.
pub struct RetainedContainer {
    entries: Vec<(String, DataSource)>,
}

impl RetainedContainer {
    /// Build a container handle from `(name, data source)` pairs.
    pub fn new(entries: Vec<(String, DataSource)>) -> ContainerHandle {
        Arc::new(Self { entries })
    }
}

impl ContainerDataSource for RetainedContainer {
    fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    fn get(&self, name: &str) -> Option<DataSource> {
        self.entries
            .iter()
            .find(|(held, _)| held == name)
            .map(|(_, source)| source.clone())
    }
}

/// Overlays two containers, strongest first; the first container providing a
/// field wins.
pub struct OverlayContainer {
    stronger: ContainerHandle,
    weaker: ContainerHandle,
}

impl OverlayContainer {
    /// Build an overlay handle of `stronger` over `weaker`.
    pub fn new(stronger: ContainerHandle, weaker: ContainerHandle) -> ContainerHandle {
        Arc::new(Self { stronger, weaker })
    }

    /// Overlay two optional containers, reusing a lone side directly rather
    /// than allocating an overlay around it.
    pub fn use_or_create_new(
        stronger: Option<ContainerHandle>,
        weaker: Option<ContainerHandle>,
    ) -> Option<ContainerHandle> {
        match (stronger, weaker) {
            (Some(stronger), Some(weaker)) => Some(Self::new(stronger, weaker)),
            (Some(stronger), None) => Some(stronger),
            (None, weaker) => weaker,
        }
    }
}

impl ContainerDataSource for OverlayContainer {
    fn names(&self) -> Vec<String> {
        let mut names = self.stronger.names();
        for name in self.weaker.names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    fn get(&self, name: &str) -> Option<DataSource> {
        self.stronger.get(name).or_else(|| self.weaker.get(name))
    }
}
