//! Configuration loading and merging
//!
//! Layers are applied in order default < env < algorithm < `--set` overrides,
//! with nested mappings merged key by key.

pub mod loader;
pub mod merge;
pub mod overrides;

pub use loader::{load_layered, load_yaml, ConfigLayout};
pub use merge::recursive_update;
pub use overrides::{
    apply_override, ensure_seed, parse_assignment, propagate_seed, resolve_map_name, Override,
};

/// A string-keyed configuration mapping as parsed from YAML.
pub type ConfigMap = serde_yaml::Mapping;
