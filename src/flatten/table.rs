//! Ordered prim table keyed by path.
//!
//! The authoritative cache table of the flattening index. Paths order so that
//! a subtree is a contiguous key range; inserting a path also materializes
//! placeholder entries for its ancestors, so subtree walks starting at any
//! cached ancestor see the full chain.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use crate::sdf::Path;

use super::wrap::PrimWrapper;

/// A cached prim: its type plus the wrapper holding composed values.
///
/// `wrapper` is `None` for placeholder entries (ancestors materialized by
/// `insert`, or prims whose wrapper was discarded pending refetch).
#[derive(Clone, Default)]
pub struct TableEntry {
    pub prim_type: String,
    pub wrapper: Option<Arc<PrimWrapper>>,
}

/// Ordered map from path to cached prim with subtree range operations.
#[derive(Default)]
pub struct HierarchyTable {
    map: BTreeMap<Path, TableEntry>,
}

impl HierarchyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&TableEntry> {
        self.map.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut TableEntry> {
        self.map.get_mut(path)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Insert `entry` at `path`, materializing placeholder entries for any
    /// ancestors not yet present.
    pub fn insert(&mut self, path: Path, entry: TableEntry) {
        let mut ancestor = path.parent();
        while let Some(current) = ancestor {
            if self.map.contains_key(&current) {
                break;
            }
            ancestor = current.parent();
            self.map.insert(current, TableEntry::default());
        }
        self.map.insert(path, entry);
    }

    /// All cached paths in the subtree rooted at `prefix`, in path order,
    /// including `prefix` itself when cached.
    pub fn subtree_paths(&self, prefix: &Path) -> Vec<Path> {
        self.map
            .range::<Path, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(path, _)| path.has_prefix(prefix))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Erase the subtree rooted at `prefix`, returning the removed entries.
    pub fn remove_subtree(&mut self, prefix: &Path) -> Vec<TableEntry> {
        let doomed = self.subtree_paths(prefix);
        let mut removed = Vec::with_capacity(doomed.len());
        for path in doomed {
            if let Some(entry) = self.map.remove(&path) {
                removed.push(entry);
            }
        }
        removed
    }

    /// Take the whole underlying map, leaving the table empty.
    pub fn take_map(&mut self) -> BTreeMap<Path, TableEntry> {
        std::mem::take(&mut self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdf;

    #[test]
    fn test_insert_materializes_ancestors() {
        let mut table = HierarchyTable::new();
        table.insert(
            sdf::path("/a/b/c").unwrap(),
            TableEntry {
                prim_type: "Mesh".to_string(),
                wrapper: None,
            },
        );

        // /, /a and /a/b exist as placeholders.
        assert_eq!(table.len(), 4);
        assert!(table.get(&sdf::Path::abs_root()).is_some());
        let placeholder = table.get(&sdf::path("/a/b").unwrap()).unwrap();
        assert_eq!(placeholder.prim_type, "");
        assert!(placeholder.wrapper.is_none());
    }

    #[test]
    fn test_subtree_range_excludes_siblings() {
        let mut table = HierarchyTable::new();
        for path in ["/a", "/a/x", "/a/x/y", "/ab", "/b"] {
            table.insert(sdf::path(path).unwrap(), TableEntry::default());
        }

        let subtree = table.subtree_paths(&sdf::path("/a").unwrap());
        let rendered: Vec<String> = subtree.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, ["/a", "/a/x", "/a/x/y"]);
    }

    #[test]
    fn test_remove_subtree() {
        let mut table = HierarchyTable::new();
        for path in ["/a", "/a/x", "/b"] {
            table.insert(sdf::path(path).unwrap(), TableEntry::default());
        }

        let removed = table.remove_subtree(&sdf::path("/a").unwrap());
        assert_eq!(removed.len(), 2);
        assert!(table.get(&sdf::path("/a").unwrap()).is_none());
        assert!(table.get(&sdf::path("/b").unwrap()).is_some());
    }
}
