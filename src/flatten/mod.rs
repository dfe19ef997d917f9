//! The flattening scene index.
//!
//! [`FlatteningSceneIndex`] sits between a scene source and its consumers,
//! lazily computing and caching composed (inherited) attribute values per
//! prim and forwarding the source's change notifications augmented with
//! synthesized dirty entries for affected descendants.
//!
//! Concurrency model: `get_prim` may be called from any number of reader
//! threads. First-time lookups land in a concurrent overflow table so
//! readers never serialize on the authoritative hierarchy table; the single
//! notification thread consolidates the overflow into the hierarchy table
//! before each invalidation walk. Notification handlers must be invoked
//! serially (the source's delivery is assumed single-threaded).

mod primvars;
mod table;
mod wrap;

use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::data::ContainerHandle;
use crate::gf::Matrix4d;
use crate::locator::{Locator, LocatorSet};
use crate::schema::{
    draw_mode_locator, tokens, CoordSysBindingSchema, MaterialBindingSchema, PrimvarsSchema,
    PurposeSchema, VisibilitySchema, XformSchema,
};
use crate::scene::{
    AddedPrimEntry, DirtiedPrimEntry, ObserverList, RemovedPrimEntry, ScenePrim, SceneIndex,
    SceneIndexObserver,
};
use crate::sdf::Path;

pub use primvars::FlattenedPrimvarsDataSource;
pub use wrap::PrimWrapper;

use table::{HierarchyTable, TableEntry};

/// Per-kind enablement, fixed at construction.
///
/// A disabled kind is passed through from the prim's own container
/// unmodified: no composition, no caching slot consulted.
#[derive(Debug, Clone, Copy)]
pub struct FlattenFlags {
    pub xform: bool,
    pub visibility: bool,
    pub purpose: bool,
    pub model: bool,
    pub material_bindings: bool,
    pub primvars: bool,
    pub coord_sys_binding: bool,
}

impl FlattenFlags {
    /// Flatten every tracked kind.
    pub fn all() -> Self {
        Self {
            xform: true,
            visibility: true,
            purpose: true,
            model: true,
            material_bindings: true,
            primvars: true,
            coord_sys_binding: true,
        }
    }

    /// Flatten nothing; the index becomes a pass-through.
    pub fn none() -> Self {
        Self {
            xform: false,
            visibility: false,
            purpose: false,
            model: false,
            material_bindings: false,
            primvars: false,
            coord_sys_binding: false,
        }
    }
}

impl Default for FlattenFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// The locators of every tracked kind, used to dirty descendants of newly
/// added prims.
fn tracked_locators() -> &'static LocatorSet {
    static LOCATORS: OnceLock<LocatorSet> = OnceLock::new();
    LOCATORS.get_or_init(|| {
        let mut set = LocatorSet::new();
        set.insert(XformSchema::default_locator().clone());
        set.insert(VisibilitySchema::default_locator().clone());
        set.insert(PurposeSchema::default_locator().clone());
        set.insert(draw_mode_locator().clone());
        set.insert(MaterialBindingSchema::default_locator().clone());
        set.insert(PrimvarsSchema::default_locator().clone());
        set.insert(CoordSysBindingSchema::default_locator().clone());
        set
    })
}

/// Caching scene index that resolves inherited attribute values.
pub struct FlatteningSceneIndex {
    self_ref: Weak<FlatteningSceneIndex>,
    input: Arc<dyn SceneIndex>,
    flags: FlattenFlags,
    tracked_names: Vec<String>,

    identity_xform: ContainerHandle,
    identity_vis: ContainerHandle,
    identity_purpose: ContainerHandle,

    // Authoritative cache, written only by the notification thread.
    prims: RwLock<HierarchyTable>,
    // Staging table absorbing concurrent first-time lookups.
    recent_prims: DashMap<Path, TableEntry>,

    observers: ObserverList,
}

impl FlatteningSceneIndex {
    /// Wrap `input`, flattening the kinds enabled in `flags`.
    ///
    /// The returned index must still be registered as an observer of the
    /// source for change notifications to flow.
    pub fn new(input: Arc<dyn SceneIndex>, flags: FlattenFlags) -> Arc<Self> {
        let mut tracked_names = Vec::new();
        if flags.xform {
            tracked_names.push(tokens::XFORM.to_string());
        }
        if flags.visibility {
            tracked_names.push(tokens::VISIBILITY.to_string());
        }
        if flags.purpose {
            tracked_names.push(tokens::PURPOSE.to_string());
        }
        if flags.model {
            tracked_names.push(tokens::MODEL.to_string());
        }
        if flags.material_bindings {
            tracked_names.push(tokens::MATERIAL_BINDINGS.to_string());
        }
        if flags.primvars {
            tracked_names.push(tokens::PRIMVARS.to_string());
        }
        if flags.coord_sys_binding {
            tracked_names.push(tokens::COORD_SYS_BINDING.to_string());
        }

        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            input,
            flags,
            tracked_names,
            identity_xform: XformSchema::build(Matrix4d::identity()),
            identity_vis: VisibilitySchema::build(true),
            identity_purpose: PurposeSchema::build(tokens::GEOMETRY),
            prims: RwLock::new(HierarchyTable::new()),
            recent_prims: DashMap::new(),
            observers: ObserverList::new(),
        })
    }

    /// Register a downstream observer for forwarded notifications.
    pub fn add_observer(&self, observer: Weak<dyn SceneIndexObserver>) {
        self.observers.add(observer);
    }

    pub(crate) fn flags(&self) -> &FlattenFlags {
        &self.flags
    }

    pub(crate) fn tracked_names(&self) -> &[String] {
        &self.tracked_names
    }

    pub(crate) fn identity_xform(&self) -> ContainerHandle {
        self.identity_xform.clone()
    }

    pub(crate) fn identity_vis(&self) -> ContainerHandle {
        self.identity_vis.clone()
    }

    pub(crate) fn identity_purpose(&self) -> ContainerHandle {
        self.identity_purpose.clone()
    }

    /// The cached wrapper for `path`, creating and staging one if absent.
    ///
    /// First-writer-wins: when two threads race to create the wrapper for a
    /// never-seen path, the loser discards its local wrapper and adopts the
    /// winner's. No partial work is observable since composition is pure.
    pub(crate) fn wrapper_for(&self, path: &Path) -> (String, Arc<PrimWrapper>) {
        {
            let prims = self.prims.read();
            if let Some(entry) = prims.get(path) {
                if let Some(wrapper) = &entry.wrapper {
                    return (entry.prim_type.clone(), wrapper.clone());
                }
            }
        }

        if let Some(entry) = self.recent_prims.get(path) {
            if let Some(wrapper) = &entry.wrapper {
                return (entry.prim_type.clone(), wrapper.clone());
            }
        }

        // No cache entry; query the source. The input container is wrapped
        // even when absent so composition can still inherit from ancestors
        // and dirtying can propagate through this path.
        let prim = self.input.get_prim(path);
        let wrapper = Arc::new(PrimWrapper::new(
            self.self_ref.clone(),
            path.clone(),
            prim.data_source,
        ));

        match self.recent_prims.entry(path.clone()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                let winner = occupied.get();
                if let Some(existing) = &winner.wrapper {
                    return (winner.prim_type.clone(), existing.clone());
                }
                tracing::warn!(path = %path, "overflow entry without wrapper; adopting fresh one");
                (prim.prim_type, wrapper)
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(TableEntry {
                    prim_type: prim.prim_type.clone(),
                    wrapper: Some(wrapper.clone()),
                });
                (prim.prim_type, wrapper)
            }
        }
    }

    /// Move every staged overflow entry into the hierarchy table.
    ///
    /// Runs only on the notification thread, before the corresponding
    /// invalidation walk. Entries are moved one key at a time under the
    /// table write lock. A reader racing a move may briefly miss the entry
    /// in both tables and re-stage a fresh wrapper; the restaged entry
    /// supersedes the moved one on the next batch. Entries staged after the
    /// snapshot likewise wait for the next batch.
    fn consolidate(&self, prims: &mut HierarchyTable) {
        let staged: Vec<Path> = self
            .recent_prims
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        if !staged.is_empty() {
            tracing::trace!(count = staged.len(), "consolidating overflow entries");
        }
        for path in staged {
            if let Some((path, entry)) = self.recent_prims.remove(&path) {
                prims.insert(path, entry);
            }
        }
    }

    /// Walk the cached subtree under `path`, invalidating intersecting slots
    /// and collecting synthesized dirty notifications.
    ///
    /// A prim whose invalidation cleared nothing never had a composed value
    /// consumed, so no descendant can depend on it; its entire subtree is
    /// skipped. This bounds the walk to previously materialized dependents.
    fn dirty_hierarchy(
        &self,
        prims: &HierarchyTable,
        path: &Path,
        dirty_locators: &LocatorSet,
        dirty_entries: &mut Vec<DirtiedPrimEntry>,
    ) {
        let subtree = prims.subtree_paths(path);
        let mut index = 0;
        while index < subtree.len() {
            let current = &subtree[index];
            let Some(entry) = prims.get(current) else {
                tracing::warn!(
                    path = %current,
                    "subtree walk visited a path absent from the hierarchy table"
                );
                index += 1;
                continue;
            };
            let Some(wrapper) = &entry.wrapper else {
                index += 1;
                continue;
            };
            if wrapper.prim_dirtied(dirty_locators) {
                if current != path {
                    dirty_entries.push(DirtiedPrimEntry {
                        prim_path: current.clone(),
                        dirty_locators: dirty_locators.clone(),
                    });
                }
                index += 1;
            } else {
                // Nothing was cached here; skip the whole subtree.
                let mut next = index + 1;
                while next < subtree.len() && subtree[next].has_prefix(current) {
                    next += 1;
                }
                index = next;
            }
        }
    }
}

impl SceneIndex for FlatteningSceneIndex {
    fn get_prim(&self, path: &Path) -> ScenePrim {
        let (prim_type, wrapper) = self.wrapper_for(path);
        let data_source: ContainerHandle = wrapper;
        ScenePrim {
            prim_type,
            data_source: Some(data_source),
        }
    }

    fn get_child_prim_paths(&self, path: &Path) -> Vec<Path> {
        // Topology is unchanged by flattening; dispatch to the input.
        self.input.get_child_prim_paths(path)
    }
}

impl SceneIndexObserver for FlatteningSceneIndex {
    fn prims_added(&self, entries: &[AddedPrimEntry]) {
        let mut dirty_entries = Vec::new();
        {
            let mut prims = self.prims.write();
            self.consolidate(&mut prims);

            // Any cached descendant of an added prim may now inherit
            // different values for every tracked kind.
            for entry in entries {
                self.dirty_hierarchy(
                    &prims,
                    &entry.prim_path,
                    tracked_locators(),
                    &mut dirty_entries,
                );
            }

            // Re-added prims keep their table entry but drop the cached
            // wrapper; the next get_prim refetches from the source.
            for entry in entries {
                if let Some(cached) = prims.get_mut(&entry.prim_path) {
                    cached.prim_type = entry.prim_type.clone();
                    if let Some(stale) = cached.wrapper.take() {
                        crate::dispose::defer_drop(stale);
                    }
                }
            }
        }

        self.observers.send_added(entries);
        if !dirty_entries.is_empty() {
            self.observers.send_dirtied(&dirty_entries);
        }
    }

    fn prims_removed(&self, entries: &[RemovedPrimEntry]) {
        {
            let mut prims = self.prims.write();
            self.consolidate(&mut prims);

            for entry in entries {
                if entry.prim_path.is_abs_root() {
                    // Whole-scene teardown, a common shutdown path; nothing
                    // downstream relies on per-path identity anymore, so the
                    // entries can be destroyed with maximal parallelism.
                    let map = prims.take_map();
                    map.into_par_iter().for_each(drop);
                } else {
                    let removed = prims.remove_subtree(&entry.prim_path);
                    if !removed.is_empty() {
                        // Teardown of a deep subtree (nested primvar
                        // overlays) must not block the notification thread.
                        crate::dispose::defer_drop(removed);
                    }
                }
            }
        }

        self.observers.send_removed(entries);
    }

    fn prims_dirtied(&self, entries: &[DirtiedPrimEntry]) {
        let mut dirty_entries = Vec::new();
        {
            let mut prims = self.prims.write();
            self.consolidate(&mut prims);

            for entry in entries {
                let mut locators = LocatorSet::new();
                if entry.dirty_locators.intersects(XformSchema::default_locator()) {
                    locators.insert(XformSchema::default_locator().clone());
                }
                if entry
                    .dirty_locators
                    .intersects(VisibilitySchema::default_locator())
                {
                    locators.insert(VisibilitySchema::default_locator().clone());
                }
                if entry
                    .dirty_locators
                    .intersects(PurposeSchema::default_locator())
                {
                    locators.insert(PurposeSchema::default_locator().clone());
                }
                if entry.dirty_locators.intersects(draw_mode_locator()) {
                    locators.insert(draw_mode_locator().clone());
                }
                if entry
                    .dirty_locators
                    .intersects(MaterialBindingSchema::default_locator())
                {
                    locators.insert(MaterialBindingSchema::default_locator().clone());
                }
                locators.insert_set(&FlattenedPrimvarsDataSource::compute_dirty_locators(
                    &entry.dirty_locators,
                ));
                if entry
                    .dirty_locators
                    .intersects(CoordSysBindingSchema::default_locator())
                {
                    locators.insert(CoordSysBindingSchema::default_locator().clone());
                }

                if !locators.is_empty() {
                    self.dirty_hierarchy(&prims, &entry.prim_path, &locators, &mut dirty_entries);
                }

                // The empty locator is the "whole prim invalidated" sentinel:
                // drop the wrapper so the next get_prim pulls the input data
                // source again. This happens after the subtree walk so the
                // propagation above still observed the prim's prior state.
                if entry.dirty_locators.contains(&Locator::empty()) {
                    if let Some(cached) = prims.get_mut(&entry.prim_path) {
                        if let Some(stale) = cached.wrapper.take() {
                            crate::dispose::defer_drop(stale);
                        }
                    }
                }
            }
        }

        self.observers.send_dirtied(entries);
        if !dirty_entries.is_empty() {
            self.observers.send_dirtied(&dirty_entries);
        }
    }
}
