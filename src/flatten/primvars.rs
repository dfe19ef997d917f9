//! Flattened primvars with per-key invalidation.
//!
//! Primvars compose key-wise: a primvar authored locally wins over the
//! parent's composed primvar of the same name. Unlike the other tracked
//! kinds, the composed result is a stateful overlay that memoizes lookups
//! per key and can invalidate a single key, so an edit to one primvar deep
//! in a hierarchy does not force recomputation of every other primvar on
//! every descendant.

use std::sync::Arc;

use dashmap::DashMap;

use crate::data::{ContainerDataSource, ContainerHandle, DataSource};
use crate::locator::LocatorSet;
use crate::schema::{tokens, PrimvarsSchema};

/// Key-wise overlay of local primvars over the parent's composed primvars.
pub struct FlattenedPrimvarsDataSource {
    input: Option<ContainerHandle>,
    parent: Option<Arc<FlattenedPrimvarsDataSource>>,
    // Memoized per-key results; `None` records a confirmed absence.
    cached: DashMap<String, Option<DataSource>>,
}

impl FlattenedPrimvarsDataSource {
    /// Overlay `input` (the prim's own primvars) over `parent` (the parent's
    /// already-flattened primvars).
    pub fn new(
        input: Option<ContainerHandle>,
        parent: Option<Arc<FlattenedPrimvarsDataSource>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            input,
            parent,
            cached: DashMap::new(),
        })
    }

    fn uncached(&self, name: &str) -> Option<DataSource> {
        if let Some(input) = &self.input {
            if let Some(found) = input.get(name) {
                return Some(found);
            }
        }
        self.parent.as_ref().and_then(|parent| parent.get(name))
    }

    /// Drop the memoized entries named by `primvars/<name>` locators in
    /// `set`; returns whether any entry had been computed.
    pub fn invalidate(&self, set: &LocatorSet) -> bool {
        let mut any_dirtied = false;
        for locator in set.iter() {
            if locator.len() < 2 || locator.element(0) != Some(tokens::PRIMVARS) {
                continue;
            }
            if let Some(name) = locator.element(1) {
                if self.cached.remove(name).is_some() {
                    any_dirtied = true;
                }
            }
        }
        any_dirtied
    }

    /// Reduce an incoming dirty set to the primvars locators it affects.
    ///
    /// Locators naming a specific primvar are truncated to
    /// `primvars/<name>`; a locator at or above the whole `primvars`
    /// container collapses the result to just `primvars`, which callers
    /// treat as "drop the whole overlay".
    pub fn compute_dirty_locators(dirty: &LocatorSet) -> LocatorSet {
        let primvars = PrimvarsSchema::default_locator();
        let mut reduced = LocatorSet::new();
        for locator in dirty.iter() {
            if !locator.intersects(primvars) {
                continue;
            }
            if locator.len() >= 2 {
                reduced.insert(locator.truncated(2));
            } else {
                return LocatorSet::from_locator(primvars.clone());
            }
        }
        reduced
    }
}

impl ContainerDataSource for FlattenedPrimvarsDataSource {
    fn names(&self) -> Vec<String> {
        let mut names = match &self.input {
            Some(input) => input.names(),
            None => Vec::new(),
        };
        if let Some(parent) = &self.parent {
            for name in parent.names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    fn get(&self, name: &str) -> Option<DataSource> {
        if let Some(hit) = self.cached.get(name) {
            return hit.clone();
        }
        let computed = self.uncached(name);
        // A racing thread may have inserted meanwhile; both computed the same
        // pure result, keep whichever landed first.
        self.cached
            .entry(name.to_string())
            .or_insert(computed)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RetainedContainer;
    use crate::locator::Locator;

    fn primvars(entries: Vec<(&str, f64)>) -> ContainerHandle {
        RetainedContainer::new(
            entries
                .into_iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        DataSource::Value(crate::data::Value::Double(value)),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn test_local_wins_key_wise() {
        let parent = FlattenedPrimvarsDataSource::new(
            Some(primvars(vec![("width", 1.0), ("color", 2.0)])),
            None,
        );
        let child =
            FlattenedPrimvarsDataSource::new(Some(primvars(vec![("width", 9.0)])), Some(parent));

        let width = child.get("width").unwrap();
        assert_eq!(width.as_value(), Some(&crate::data::Value::Double(9.0)));
        let color = child.get("color").unwrap();
        assert_eq!(color.as_value(), Some(&crate::data::Value::Double(2.0)));
        assert!(child.get("missing").is_none());

        let mut names = child.names();
        names.sort();
        assert_eq!(names, ["color", "width"]);
    }

    #[test]
    fn test_invalidate_single_key() {
        let source = FlattenedPrimvarsDataSource::new(Some(primvars(vec![("width", 1.0)])), None);

        // Nothing computed yet, nothing to invalidate.
        let set = LocatorSet::from_locator(Locator::new(["primvars", "width"]));
        assert!(!source.invalidate(&set));

        source.get("width");
        source.get("color");
        assert!(source.invalidate(&set));
        // Second invalidation finds the key already cleared.
        assert!(!source.invalidate(&set));
        // "color" (a cached absence) is untouched.
        assert!(source.cached.contains_key("color"));
    }

    #[test]
    fn test_compute_dirty_locators_narrows() {
        let mut dirty = LocatorSet::new();
        dirty.insert(Locator::new(["primvars", "color", "value"]));
        dirty.insert(Locator::new(["xform"]));

        let reduced = FlattenedPrimvarsDataSource::compute_dirty_locators(&dirty);
        assert_eq!(
            reduced,
            LocatorSet::from_locator(Locator::new(["primvars", "color"]))
        );

        // A whole-container locator collapses the reduction.
        let dirty = LocatorSet::from_locator(Locator::new(["primvars"]));
        let reduced = FlattenedPrimvarsDataSource::compute_dirty_locators(&dirty);
        assert_eq!(
            reduced,
            LocatorSet::from_locator(Locator::new(["primvars"]))
        );

        // Unrelated locators reduce to nothing.
        let dirty = LocatorSet::from_locator(Locator::new(["visibility"]));
        assert!(FlattenedPrimvarsDataSource::compute_dirty_locators(&dirty).is_empty());
    }
}
