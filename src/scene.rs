//! Scene index traits, change notifications, and an eager in-memory source.
//!
//! A scene index hands out prims by path and enumerates children; sources
//! additionally emit add/remove/dirty notifications to registered observers.
//! Notification delivery is strictly serial: a source must never run two
//! notification batches concurrently.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::data::ContainerHandle;
use crate::locator::{Locator, LocatorSet};
use crate::sdf::Path;

/// A prim as returned by a scene index: its type plus attribute container.
#[derive(Clone)]
pub struct ScenePrim {
    pub prim_type: String,
    pub data_source: Option<ContainerHandle>,
}

impl ScenePrim {
    /// A typeless prim with no attributes, returned for absent paths.
    pub fn empty() -> Self {
        Self {
            prim_type: String::new(),
            data_source: None,
        }
    }
}

/// Notification entry for a newly added prim.
#[derive(Clone)]
pub struct AddedPrimEntry {
    pub prim_path: Path,
    pub prim_type: String,
}

/// Notification entry for a removed subtree root.
#[derive(Clone)]
pub struct RemovedPrimEntry {
    pub prim_path: Path,
}

/// Notification entry for dirtied attribute fields on a prim.
#[derive(Clone)]
pub struct DirtiedPrimEntry {
    pub prim_path: Path,
    pub dirty_locators: LocatorSet,
}

/// Read access to a scene hierarchy.
pub trait SceneIndex: Send + Sync {
    /// The prim at `path`; absent paths yield [`ScenePrim::empty`].
    fn get_prim(&self, path: &Path) -> ScenePrim;

    /// The immediate child paths of `path`, in path order.
    fn get_child_prim_paths(&self, path: &Path) -> Vec<Path>;
}

/// Receiver of scene change notifications.
pub trait SceneIndexObserver: Send + Sync {
    fn prims_added(&self, entries: &[AddedPrimEntry]);
    fn prims_removed(&self, entries: &[RemovedPrimEntry]);
    fn prims_dirtied(&self, entries: &[DirtiedPrimEntry]);
}

/// Weakly held observer list with fan-out helpers.
///
/// Observers are held weakly so a downstream consumer owning the index does
/// not form a reference cycle; dead observers are pruned on send.
#[derive(Default)]
pub struct ObserverList {
    observers: RwLock<Vec<Weak<dyn SceneIndexObserver>>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer.
    pub fn add(&self, observer: Weak<dyn SceneIndexObserver>) {
        self.observers.write().push(observer);
    }

    fn alive(&self) -> Vec<Arc<dyn SceneIndexObserver>> {
        let mut alive = Vec::new();
        let mut any_dead = false;
        {
            let observers = self.observers.read();
            for observer in observers.iter() {
                match observer.upgrade() {
                    Some(observer) => alive.push(observer),
                    None => any_dead = true,
                }
            }
        }
        if any_dead {
            self.observers
                .write()
                .retain(|observer| observer.strong_count() > 0);
        }
        alive
    }

    pub fn send_added(&self, entries: &[AddedPrimEntry]) {
        for observer in self.alive() {
            observer.prims_added(entries);
        }
    }

    pub fn send_removed(&self, entries: &[RemovedPrimEntry]) {
        for observer in self.alive() {
            observer.prims_removed(entries);
        }
    }

    pub fn send_dirtied(&self, entries: &[DirtiedPrimEntry]) {
        for observer in self.alive() {
            observer.prims_dirtied(entries);
        }
    }
}

/// A prim staged for insertion into a [`RetainedSceneIndex`].
pub struct AddedPrim {
    pub path: Path,
    pub prim_type: String,
    pub data_source: Option<ContainerHandle>,
}

struct RetainedEntry {
    prim_type: String,
    data_source: Option<ContainerHandle>,
}

/// An eager, mutable scene source.
///
/// Holds prims in an ordered map and notifies observers on every mutation.
/// This is the canonical source implementation used by tests and demos; any
/// `SceneIndex` with serial notification delivery works as a flattening
/// input.
#[derive(Default)]
pub struct RetainedSceneIndex {
    prims: RwLock<BTreeMap<Path, RetainedEntry>>,
    observers: ObserverList,
}

impl RetainedSceneIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a downstream observer.
    pub fn add_observer(&self, observer: Weak<dyn SceneIndexObserver>) {
        self.observers.add(observer);
    }

    /// Insert or replace prims, then notify observers of the additions.
    pub fn add_prims(&self, prims: Vec<AddedPrim>) {
        let mut entries = Vec::with_capacity(prims.len());
        {
            let mut table = self.prims.write();
            for prim in prims {
                entries.push(AddedPrimEntry {
                    prim_path: prim.path.clone(),
                    prim_type: prim.prim_type.clone(),
                });
                table.insert(
                    prim.path,
                    RetainedEntry {
                        prim_type: prim.prim_type,
                        data_source: prim.data_source,
                    },
                );
            }
        }
        self.observers.send_added(&entries);
    }

    /// Remove the subtrees rooted at `paths`, then notify observers.
    pub fn remove_prims(&self, paths: &[Path]) {
        let mut entries = Vec::with_capacity(paths.len());
        {
            let mut table = self.prims.write();
            for path in paths {
                let doomed: Vec<Path> = table
                    .range::<Path, _>((Bound::Included(path), Bound::Unbounded))
                    .take_while(|(held, _)| held.has_prefix(path))
                    .map(|(held, _)| held.clone())
                    .collect();
                for held in doomed {
                    table.remove(&held);
                }
                entries.push(RemovedPrimEntry {
                    prim_path: path.clone(),
                });
            }
        }
        self.observers.send_removed(&entries);
    }

    /// Replace a prim's attribute container wholesale.
    ///
    /// Replacing the container object invalidates anything downstream may
    /// have cached about the prim, so this notifies with the empty "whole
    /// prim" sentinel locator. In-place edits to a live container should use
    /// [`Self::dirty_prims`] with field locators instead.
    pub fn update_prim(&self, path: &Path, data_source: Option<ContainerHandle>) {
        {
            let mut table = self.prims.write();
            if let Some(entry) = table.get_mut(path) {
                entry.data_source = data_source;
            }
        }
        self.observers.send_dirtied(&[DirtiedPrimEntry {
            prim_path: path.clone(),
            dirty_locators: LocatorSet::from_locator(Locator::empty()),
        }]);
    }

    /// Forward dirty notifications without changing stored data.
    pub fn dirty_prims(&self, entries: Vec<DirtiedPrimEntry>) {
        self.observers.send_dirtied(&entries);
    }
}

impl SceneIndex for RetainedSceneIndex {
    fn get_prim(&self, path: &Path) -> ScenePrim {
        let table = self.prims.read();
        match table.get(path) {
            Some(entry) => ScenePrim {
                prim_type: entry.prim_type.clone(),
                data_source: entry.data_source.clone(),
            },
            None => ScenePrim::empty(),
        }
    }

    fn get_child_prim_paths(&self, path: &Path) -> Vec<Path> {
        let table = self.prims.read();
        table
            .range::<Path, _>((Bound::Excluded(path), Bound::Unbounded))
            .take_while(|(held, _)| held.has_prefix(path))
            .filter(|(held, _)| held.element_count() == path.element_count() + 1)
            .map(|(held, _)| held.clone())
            .collect()
    }
}
