//! Per-prim wrapper holding lazily computed composed attributes.
//!
//! A [`PrimWrapper`] wraps the input scene's container for one path and
//! resolves each tracked attribute kind to its fully composed value on first
//! access, caching the result in an independently invalidatable slot. Slots
//! are atomic swaps: two threads racing to fill a slot both compute the same
//! pure result, so whichever write lands is correct and the loser's work is
//! discarded harmlessly. Parent values are looked up through the owning
//! cache, so they are themselves already composed.

use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;

use crate::data::{
    ContainerDataSource, ContainerHandle, DataSource, OverlayContainer, RetainedContainer, Value,
};
use crate::locator::LocatorSet;
use crate::schema::{
    draw_mode_locator, tokens, CoordSysBindingSchema, MaterialBindingSchema, PrimvarsSchema,
    PurposeSchema, VisibilitySchema, XformSchema,
};
use crate::sdf::Path;

use super::primvars::FlattenedPrimvarsDataSource;
use super::FlatteningSceneIndex;

/// Stateful per-path holder of composed attribute values.
pub struct PrimWrapper {
    cache: Weak<FlatteningSceneIndex>,
    path: Path,
    input: Option<ContainerHandle>,

    computed_xform: ArcSwapOption<DataSource>,
    computed_vis: ArcSwapOption<DataSource>,
    computed_purpose: ArcSwapOption<DataSource>,
    computed_draw_mode: ArcSwapOption<DataSource>,
    computed_material_bindings: ArcSwapOption<DataSource>,
    computed_primvars: ArcSwapOption<FlattenedPrimvarsDataSource>,
    computed_coord_sys_binding: ArcSwapOption<DataSource>,
}

impl PrimWrapper {
    pub(crate) fn new(
        cache: Weak<FlatteningSceneIndex>,
        path: Path,
        input: Option<ContainerHandle>,
    ) -> Self {
        Self {
            cache,
            path,
            input,
            computed_xform: ArcSwapOption::empty(),
            computed_vis: ArcSwapOption::empty(),
            computed_purpose: ArcSwapOption::empty(),
            computed_draw_mode: ArcSwapOption::empty(),
            computed_material_bindings: ArcSwapOption::empty(),
            computed_primvars: ArcSwapOption::empty(),
            computed_coord_sys_binding: ArcSwapOption::empty(),
        }
    }

    /// Clear every slot whose kind intersects `set`; returns whether any
    /// slot actually held a computed value.
    ///
    /// A `false` return means no consumer ever pulled a composed value from
    /// this prim, so no descendant can depend on it; the dirtying walk uses
    /// that to skip whole subtrees.
    pub fn prim_dirtied(&self, set: &LocatorSet) -> bool {
        let mut any_dirtied = false;

        if set.intersects(XformSchema::default_locator()) {
            any_dirtied |= self.computed_xform.swap(None).is_some();
        }
        if set.intersects(VisibilitySchema::default_locator()) {
            any_dirtied |= self.computed_vis.swap(None).is_some();
        }
        if set.intersects(PurposeSchema::default_locator()) {
            any_dirtied |= self.computed_purpose.swap(None).is_some();
        }
        if set.intersects(draw_mode_locator()) {
            any_dirtied |= self.computed_draw_mode.swap(None).is_some();
        }
        if set.intersects(MaterialBindingSchema::default_locator()) {
            any_dirtied |= self.computed_material_bindings.swap(None).is_some();
        }
        if set.intersects(PrimvarsSchema::default_locator()) {
            if set.contains(PrimvarsSchema::default_locator()) {
                // The whole primvars container changed; drop the overlay.
                any_dirtied |= self.computed_primvars.swap(None).is_some();
            } else if let Some(primvars) = self.computed_primvars.load_full() {
                // Specific primvars changed; invalidate just those keys.
                any_dirtied |= primvars.invalidate(set);
            }
        }
        if set.intersects(CoordSysBindingSchema::default_locator()) {
            any_dirtied |= self.computed_coord_sys_binding.swap(None).is_some();
        }

        any_dirtied
    }

    /// The parent prim's wrapped container, or `None` at the absolute root.
    fn parent_data_source(&self, cache: &Arc<FlatteningSceneIndex>) -> Option<ContainerHandle> {
        let parent = self.path.parent()?;
        let (_, wrapper) = cache.wrapper_for(&parent);
        let handle: ContainerHandle = wrapper;
        Some(handle)
    }

    fn xform(&self, cache: &Arc<FlatteningSceneIndex>) -> DataSource {
        if let Some(computed) = self.computed_xform.load_full() {
            return (*computed).clone();
        }
        let computed = self.xform_uncached(cache);
        self.computed_xform.store(Some(Arc::new(computed.clone())));
        computed
    }

    fn xform_uncached(&self, cache: &Arc<FlatteningSceneIndex>) -> DataSource {
        let input_xform = XformSchema::from_parent(self.input.as_ref());

        // An explicit stack reset composes from the local matrix alone.
        if input_xform.reset_xform_stack() {
            if input_xform.matrix().is_some() {
                if let Some(container) = input_xform.container() {
                    return DataSource::Container(container);
                }
            }
            return DataSource::Container(cache.identity_xform());
        }

        let parent_xform = match self.parent_data_source(cache) {
            Some(parent) => XformSchema::from_parent(Some(&parent)),
            None => XformSchema::from_parent(None),
        };

        // The parent matrix came through the cache, so it is flattened
        // already; missing matrices are interpreted as identity, and a prim
        // with no local matrix reuses the parent's composed container.
        match (input_xform.matrix(), parent_xform.matrix()) {
            (Some(local), Some(parent)) => {
                DataSource::Container(XformSchema::build(local * parent))
            }
            (Some(_), None) => match input_xform.container() {
                Some(container) => DataSource::Container(container),
                None => DataSource::Container(cache.identity_xform()),
            },
            (None, Some(_)) => match parent_xform.container() {
                Some(container) => DataSource::Container(container),
                None => DataSource::Container(cache.identity_xform()),
            },
            (None, None) => DataSource::Container(cache.identity_xform()),
        }
    }

    fn visibility(&self, cache: &Arc<FlatteningSceneIndex>) -> DataSource {
        if let Some(computed) = self.computed_vis.load_full() {
            return (*computed).clone();
        }
        let computed = self.visibility_uncached(cache);
        self.computed_vis.store(Some(Arc::new(computed.clone())));
        computed
    }

    fn visibility_uncached(&self, cache: &Arc<FlatteningSceneIndex>) -> DataSource {
        let input_vis = VisibilitySchema::from_parent(self.input.as_ref());
        if input_vis.visibility().is_some() {
            if let Some(container) = input_vis.container() {
                return DataSource::Container(container);
            }
        }
        if let Some(parent) = self.parent_data_source(cache) {
            let parent_vis = VisibilitySchema::from_parent(Some(&parent));
            if parent_vis.visibility().is_some() {
                if let Some(container) = parent_vis.container() {
                    return DataSource::Container(container);
                }
            }
        }
        DataSource::Container(cache.identity_vis())
    }

    fn purpose(&self, cache: &Arc<FlatteningSceneIndex>) -> DataSource {
        if let Some(computed) = self.computed_purpose.load_full() {
            return (*computed).clone();
        }
        let computed = self.purpose_uncached(cache);
        self.computed_purpose.store(Some(Arc::new(computed.clone())));
        computed
    }

    fn purpose_uncached(&self, cache: &Arc<FlatteningSceneIndex>) -> DataSource {
        let input_purpose = PurposeSchema::from_parent(self.input.as_ref());
        if input_purpose.purpose().is_some() {
            if let Some(container) = input_purpose.container() {
                return DataSource::Container(container);
            }
        }
        if let Some(parent) = self.parent_data_source(cache) {
            let parent_purpose = PurposeSchema::from_parent(Some(&parent));
            if parent_purpose.purpose().is_some() {
                if let Some(container) = parent_purpose.container() {
                    return DataSource::Container(container);
                }
            }
        }
        DataSource::Container(cache.identity_purpose())
    }

    /// The `model` container with its `drawMode` field resolved.
    fn model(&self, cache: &Arc<FlatteningSceneIndex>) -> DataSource {
        let model_container = self
            .input
            .as_ref()
            .and_then(|input| input.get(tokens::MODEL))
            .and_then(DataSource::into_container);
        let draw_mode = self.draw_mode(cache, model_container.as_ref());
        let override_container = RetainedContainer::new(vec![(
            tokens::DRAW_MODE.to_string(),
            draw_mode,
        )]);
        match model_container {
            None => DataSource::Container(override_container),
            Some(model) => DataSource::Container(OverlayContainer::new(override_container, model)),
        }
    }

    fn draw_mode(
        &self,
        cache: &Arc<FlatteningSceneIndex>,
        model_container: Option<&ContainerHandle>,
    ) -> DataSource {
        if let Some(computed) = self.computed_draw_mode.load_full() {
            return (*computed).clone();
        }
        let computed = self.draw_mode_uncached(cache, model_container);
        self.computed_draw_mode
            .store(Some(Arc::new(computed.clone())));
        computed
    }

    fn draw_mode_uncached(
        &self,
        cache: &Arc<FlatteningSceneIndex>,
        model_container: Option<&ContainerHandle>,
    ) -> DataSource {
        // A local draw mode wins unless it is the "inherited" sentinel.
        if let Some(model) = model_container {
            if let Some(source) = model.get(tokens::DRAW_MODE) {
                if let Some(token) = source.as_token() {
                    if !token.is_empty() && token != tokens::INHERITED {
                        return source;
                    }
                }
            }
        }

        if self.path.is_abs_root() {
            return DataSource::token("");
        }

        if let Some(parent) = self.parent_data_source(cache) {
            if let Some(source) = crate::data::get_at(&parent, draw_mode_locator()) {
                if source.as_token().is_some() {
                    return source;
                }
            }
        }

        DataSource::token("")
    }

    fn material_bindings(&self, cache: &Arc<FlatteningSceneIndex>) -> Option<DataSource> {
        let computed = match self.computed_material_bindings.load_full() {
            Some(computed) => (*computed).clone(),
            None => {
                // Cache absence as a non-container marker so a missing
                // binding is not recomputed on every access.
                let computed = self
                    .material_bindings_uncached(cache)
                    .map(DataSource::Container)
                    .unwrap_or_else(|| DataSource::Value(Value::Bool(false)));
                self.computed_material_bindings
                    .store(Some(Arc::new(computed.clone())));
                computed
            }
        };
        match computed {
            DataSource::Container(_) => Some(computed),
            DataSource::Value(_) => None,
        }
    }

    fn material_bindings_uncached(
        &self,
        cache: &Arc<FlatteningSceneIndex>,
    ) -> Option<ContainerHandle> {
        let prim_bindings = self
            .input
            .as_ref()
            .and_then(|input| input.get(tokens::MATERIAL_BINDINGS))
            .and_then(DataSource::into_container);
        let parent_bindings = self
            .parent_data_source(cache)
            .and_then(|parent| parent.get(tokens::MATERIAL_BINDINGS))
            .and_then(DataSource::into_container);
        MaterialBindingsDataSource::use_or_create_new(prim_bindings, parent_bindings)
    }

    pub(crate) fn flattened_primvars(
        &self,
        cache: &Arc<FlatteningSceneIndex>,
    ) -> Arc<FlattenedPrimvarsDataSource> {
        if let Some(computed) = self.computed_primvars.load_full() {
            return computed;
        }
        let computed = self.flattened_primvars_uncached(cache);
        self.computed_primvars.store(Some(computed.clone()));
        computed
    }

    fn flattened_primvars_uncached(
        &self,
        cache: &Arc<FlatteningSceneIndex>,
    ) -> Arc<FlattenedPrimvarsDataSource> {
        let input_primvars = PrimvarsSchema::container_from_parent(self.input.as_ref());
        let parent_primvars = self.path.parent().map(|parent| {
            let (_, wrapper) = cache.wrapper_for(&parent);
            wrapper.flattened_primvars(cache)
        });
        FlattenedPrimvarsDataSource::new(input_primvars, parent_primvars)
    }

    fn coord_sys_binding(&self, cache: &Arc<FlatteningSceneIndex>) -> Option<DataSource> {
        let computed = match self.computed_coord_sys_binding.load_full() {
            Some(computed) => (*computed).clone(),
            None => {
                let computed = self
                    .coord_sys_binding_uncached(cache)
                    .map(DataSource::Container)
                    .unwrap_or_else(|| DataSource::Value(Value::Bool(false)));
                self.computed_coord_sys_binding
                    .store(Some(Arc::new(computed.clone())));
                computed
            }
        };
        match computed {
            DataSource::Container(_) => Some(computed),
            DataSource::Value(_) => None,
        }
    }

    fn coord_sys_binding_uncached(
        &self,
        cache: &Arc<FlatteningSceneIndex>,
    ) -> Option<ContainerHandle> {
        let input_bindings = CoordSysBindingSchema::container_from_parent(self.input.as_ref());
        let parent_bindings = self
            .parent_data_source(cache)
            .and_then(|parent| parent.get(tokens::COORD_SYS_BINDING))
            .and_then(DataSource::into_container);
        // Local and parent bindings may hold distinct names, so overlay;
        // a lone side is reused without an overlay allocation.
        OverlayContainer::use_or_create_new(input_bindings, parent_bindings)
    }
}

impl ContainerDataSource for PrimWrapper {
    fn names(&self) -> Vec<String> {
        let Some(cache) = self.cache.upgrade() else {
            return match &self.input {
                Some(input) => input.names(),
                None => Vec::new(),
            };
        };
        let mut names = match &self.input {
            Some(input) => input.names(),
            None => return cache.tracked_names().to_vec(),
        };
        for tracked in cache.tracked_names() {
            if !names.iter().any(|name| name == tracked) {
                names.push(tracked.clone());
            }
        }
        names
    }

    fn get(&self, name: &str) -> Option<DataSource> {
        // Without the cache (mid-teardown) fall back to the raw input.
        let Some(cache) = self.cache.upgrade() else {
            return self.input.as_ref().and_then(|input| input.get(name));
        };

        let flags = cache.flags();
        if flags.xform && name == tokens::XFORM {
            return Some(self.xform(&cache));
        }
        if flags.visibility && name == tokens::VISIBILITY {
            return Some(self.visibility(&cache));
        }
        if flags.purpose && name == tokens::PURPOSE {
            return Some(self.purpose(&cache));
        }
        if flags.model && name == tokens::MODEL {
            return Some(self.model(&cache));
        }
        if flags.material_bindings && name == tokens::MATERIAL_BINDINGS {
            return self.material_bindings(&cache);
        }
        if flags.primvars && name == tokens::PRIMVARS {
            return Some(DataSource::Container(self.flattened_primvars(&cache)));
        }
        if flags.coord_sys_binding && name == tokens::COORD_SYS_BINDING {
            return self.coord_sys_binding(&cache);
        }

        self.input.as_ref().and_then(|input| input.get(name))
    }
}

/// Overlay of local material bindings over the parent's composed bindings,
/// resolved per key by the parent's binding strength.
struct MaterialBindingsDataSource {
    prim_bindings: ContainerHandle,
    parent_bindings: ContainerHandle,
}

impl MaterialBindingsDataSource {
    /// Compose two optional binding containers, reusing a lone side directly.
    fn use_or_create_new(
        prim_bindings: Option<ContainerHandle>,
        parent_bindings: Option<ContainerHandle>,
    ) -> Option<ContainerHandle> {
        match (prim_bindings, parent_bindings) {
            (Some(prim_bindings), Some(parent_bindings)) => Some(Arc::new(Self {
                prim_bindings,
                parent_bindings,
            })),
            (Some(prim_bindings), None) => Some(prim_bindings),
            (None, parent_bindings) => parent_bindings,
        }
    }
}

impl ContainerDataSource for MaterialBindingsDataSource {
    fn names(&self) -> Vec<String> {
        let mut names = self.prim_bindings.names();
        for name in self.parent_bindings.names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    fn get(&self, name: &str) -> Option<DataSource> {
        let parent_binding = self
            .parent_bindings
            .get(name)
            .and_then(DataSource::into_container);
        if let Some(parent) = &parent_binding {
            let strength = MaterialBindingSchema::new(Some(parent.clone())).binding_strength();
            if strength.as_deref() == Some(tokens::STRONGER_THAN_DESCENDANTS) {
                return Some(DataSource::Container(parent.clone()));
            }
        }
        if let Some(local) = self.prim_bindings.get(name) {
            return Some(local);
        }
        parent_binding.map(DataSource::Container)
    }
}
