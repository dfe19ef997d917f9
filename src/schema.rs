//! Accessors for the tracked attribute kinds.
//!
//! Each schema struct wraps an optional attribute container and provides
//! typed field access plus the default locator the flattening cache uses to
//! match dirty notifications against that kind. The shapes mirror the USD
//! Hydra schemas: `xform = {matrix, resetXformStack}`,
//! `visibility = {visibility}`, `purpose = {purpose}`,
//! `model = {drawMode, ...}`, `materialBindings = {<purpose>: {path,
//! bindingStrength}}`, `primvars = {<name>: ...}`, `coordSysBinding =
//! {<name>: ...}`.

use std::sync::OnceLock;

use crate::data::{ContainerHandle, DataSource, RetainedContainer};
use crate::gf::Matrix4d;
use crate::locator::Locator;

/// Field and value tokens shared across the crate.
pub mod tokens {
    pub const XFORM: &str = "xform";
    pub const MATRIX: &str = "matrix";
    pub const RESET_XFORM_STACK: &str = "resetXformStack";
    pub const VISIBILITY: &str = "visibility";
    pub const PURPOSE: &str = "purpose";
    pub const GEOMETRY: &str = "geometry";
    pub const MODEL: &str = "model";
    pub const DRAW_MODE: &str = "drawMode";
    pub const INHERITED: &str = "inherited";
    pub const MATERIAL_BINDINGS: &str = "materialBindings";
    pub const BINDING_STRENGTH: &str = "bindingStrength";
    pub const STRONGER_THAN_DESCENDANTS: &str = "strongerThanDescendants";
    pub const PRIMVARS: &str = "primvars";
    pub const COORD_SYS_BINDING: &str = "coordSysBinding";
}

fn child_container(prim: Option<&ContainerHandle>, name: &str) -> Option<ContainerHandle> {
    prim.and_then(|container| container.get(name))
        .and_then(DataSource::into_container)
}

/// Transform schema: `xform/matrix` and `xform/resetXformStack`.
pub struct XformSchema(Option<ContainerHandle>);

impl XformSchema {
    /// Extract the `xform` container from a prim-level container.
    pub fn from_parent(prim: Option<&ContainerHandle>) -> Self {
        Self(child_container(prim, tokens::XFORM))
    }

    /// The wrapped container, if present.
    pub fn container(&self) -> Option<ContainerHandle> {
        self.0.clone()
    }

    /// The authored matrix, if present.
    pub fn matrix(&self) -> Option<Matrix4d> {
        self.0
            .as_ref()
            .and_then(|c| c.get(tokens::MATRIX))
            .and_then(|d| d.as_matrix())
    }

    /// True when the prim explicitly resets the transform stack.
    pub fn reset_xform_stack(&self) -> bool {
        self.0
            .as_ref()
            .and_then(|c| c.get(tokens::RESET_XFORM_STACK))
            .and_then(|d| d.as_bool())
            .unwrap_or(false)
    }

    /// Build an `xform` container holding `matrix`.
    pub fn build(matrix: Matrix4d) -> ContainerHandle {
        RetainedContainer::new(vec![(tokens::MATRIX.to_string(), DataSource::matrix(matrix))])
    }

    pub fn default_locator() -> &'static Locator {
        static LOCATOR: OnceLock<Locator> = OnceLock::new();
        LOCATOR.get_or_init(|| Locator::new([tokens::XFORM]))
    }
}

/// Visibility schema: `visibility/visibility`.
pub struct VisibilitySchema(Option<ContainerHandle>);

impl VisibilitySchema {
    pub fn from_parent(prim: Option<&ContainerHandle>) -> Self {
        Self(child_container(prim, tokens::VISIBILITY))
    }

    pub fn container(&self) -> Option<ContainerHandle> {
        self.0.clone()
    }

    /// The authored visibility, if present.
    pub fn visibility(&self) -> Option<bool> {
        self.0
            .as_ref()
            .and_then(|c| c.get(tokens::VISIBILITY))
            .and_then(|d| d.as_bool())
    }

    /// Build a `visibility` container holding `visible`.
    pub fn build(visible: bool) -> ContainerHandle {
        RetainedContainer::new(vec![(
            tokens::VISIBILITY.to_string(),
            DataSource::boolean(visible),
        )])
    }

    pub fn default_locator() -> &'static Locator {
        static LOCATOR: OnceLock<Locator> = OnceLock::new();
        LOCATOR.get_or_init(|| Locator::new([tokens::VISIBILITY]))
    }
}

/// Purpose schema: `purpose/purpose`.
pub struct PurposeSchema(Option<ContainerHandle>);

impl PurposeSchema {
    pub fn from_parent(prim: Option<&ContainerHandle>) -> Self {
        Self(child_container(prim, tokens::PURPOSE))
    }

    pub fn container(&self) -> Option<ContainerHandle> {
        self.0.clone()
    }

    /// The authored purpose token, if present.
    pub fn purpose(&self) -> Option<String> {
        self.0
            .as_ref()
            .and_then(|c| c.get(tokens::PURPOSE))
            .and_then(|d| d.as_token().map(str::to_string))
    }

    /// Build a `purpose` container holding `purpose`.
    pub fn build(purpose: &str) -> ContainerHandle {
        RetainedContainer::new(vec![(tokens::PURPOSE.to_string(), DataSource::token(purpose))])
    }

    pub fn default_locator() -> &'static Locator {
        static LOCATOR: OnceLock<Locator> = OnceLock::new();
        LOCATOR.get_or_init(|| Locator::new([tokens::PURPOSE]))
    }
}

/// Locator of the draw-mode field nested inside the `model` container.
pub fn draw_mode_locator() -> &'static Locator {
    static LOCATOR: OnceLock<Locator> = OnceLock::new();
    LOCATOR.get_or_init(|| Locator::new([tokens::MODEL, tokens::DRAW_MODE]))
}

/// One material binding entry: `{path, bindingStrength}`.
pub struct MaterialBindingSchema(Option<ContainerHandle>);

impl MaterialBindingSchema {
    pub fn new(container: Option<ContainerHandle>) -> Self {
        Self(container)
    }

    pub fn container(&self) -> Option<ContainerHandle> {
        self.0.clone()
    }

    /// The binding strength token, if authored.
    pub fn binding_strength(&self) -> Option<String> {
        self.0
            .as_ref()
            .and_then(|c| c.get(tokens::BINDING_STRENGTH))
            .and_then(|d| d.as_token().map(str::to_string))
    }

    /// Locator of the prim-level `materialBindings` container.
    pub fn default_locator() -> &'static Locator {
        static LOCATOR: OnceLock<Locator> = OnceLock::new();
        LOCATOR.get_or_init(|| Locator::new([tokens::MATERIAL_BINDINGS]))
    }
}

/// Primvars schema: the prim-level `primvars` container.
pub struct PrimvarsSchema;

impl PrimvarsSchema {
    /// Extract the `primvars` container from a prim-level container.
    pub fn container_from_parent(prim: Option<&ContainerHandle>) -> Option<ContainerHandle> {
        child_container(prim, tokens::PRIMVARS)
    }

    pub fn default_locator() -> &'static Locator {
        static LOCATOR: OnceLock<Locator> = OnceLock::new();
        LOCATOR.get_or_init(|| Locator::new([tokens::PRIMVARS]))
    }
}

/// Coordinate-system binding schema: the prim-level `coordSysBinding`
/// container.
pub struct CoordSysBindingSchema;

impl CoordSysBindingSchema {
    pub fn container_from_parent(prim: Option<&ContainerHandle>) -> Option<ContainerHandle> {
        child_container(prim, tokens::COORD_SYS_BINDING)
    }

    pub fn default_locator() -> &'static Locator {
        static LOCATOR: OnceLock<Locator> = OnceLock::new();
        LOCATOR.get_or_init(|| Locator::new([tokens::COORD_SYS_BINDING]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xform_schema_reads_fields() {
        let matrix = Matrix4d::translate(1.0, 2.0, 3.0);
        let prim = RetainedContainer::new(vec![(
            tokens::XFORM.to_string(),
            DataSource::Container(XformSchema::build(matrix)),
        )]);

        let schema = XformSchema::from_parent(Some(&prim));
        assert_eq!(schema.matrix(), Some(matrix));
        assert!(!schema.reset_xform_stack());

        let schema = XformSchema::from_parent(None);
        assert!(schema.matrix().is_none());
        assert!(schema.container().is_none());
    }

    #[test]
    fn test_visibility_absent_versus_authored() {
        let prim = RetainedContainer::new(vec![(
            tokens::VISIBILITY.to_string(),
            DataSource::Container(VisibilitySchema::build(false)),
        )]);
        assert_eq!(VisibilitySchema::from_parent(Some(&prim)).visibility(), Some(false));

        let empty = RetainedContainer::new(vec![]);
        assert_eq!(VisibilitySchema::from_parent(Some(&empty)).visibility(), None);
    }
}
