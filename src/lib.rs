//! `usd-flatten` is a flattening cache for USD-style scene hierarchies.
//!
//! It sits between a tree-shaped scene source and its consumers, lazily
//! resolving inherited (composed) attribute values per prim: transforms
//! accumulate down the hierarchy, visibility and purpose inherit with
//! override, material and coordinate-system bindings overlay with per-key
//! strength resolution, and primvars overlay with fine-grained per-key
//! invalidation. Change notifications from the source are forwarded with
//! synthesized dirty entries for every cached descendant the change affects.
//!
//! # Modules
//!
//! - `sdf` - scene paths
//! - `gf` - matrix math for composed transforms
//! - `locator` - data source locators and locator sets
//! - `data` - attribute containers and values
//! - `schema` - typed accessors for the tracked attribute kinds
//! - `scene` - scene index traits, notifications, and a retained source
//! - `flatten` - the flattening scene index itself

pub mod data;
mod dispose;
pub mod flatten;
pub mod gf;
pub mod locator;
pub mod scene;
pub mod schema;
pub mod sdf;
