//! Config file loading

use super::{recursive_update, ConfigMap};
use crate::error::ConfigError;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory layout of the YAML config tree.
///
/// ```text
/// <root>/default.yaml
/// <root>/envs/<name>.yaml
/// <root>/algs/<name>.yaml
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLayout {
    root: PathBuf,
}

impl ConfigLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn default_path(&self) -> PathBuf {
        self.root.join("default.yaml")
    }

    pub fn env_path(&self, name: &str) -> PathBuf {
        self.root.join("envs").join(format!("{name}.yaml"))
    }

    pub fn alg_path(&self, name: &str) -> PathBuf {
        self.root.join("algs").join(format!("{name}.yaml"))
    }
}

/// Load a single YAML document as a mapping. An empty document yields an
/// empty mapping.
pub fn load_yaml(path: &Path) -> Result<ConfigMap, ConfigError> {
    let content = fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

    let mut raw: Value = serde_yaml::from_str(&content)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    // Resolve `<<: *anchor` merge keys before layering.
    raw.apply_merge()
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

    match raw {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(ConfigMap::new()),
        _ => Err(ConfigError::NotAMapping { path: path.to_path_buf() }),
    }
}

/// Load `default.yaml`, then merge the env config, then the algorithm config.
pub fn load_layered(
    layout: &ConfigLayout,
    env_config: &str,
    alg_config: &str,
) -> Result<ConfigMap, ConfigError> {
    let mut config = load_yaml(&layout.default_path())?;
    tracing::debug!("Loaded defaults from {}", layout.default_path().display());

    let env = load_named(&layout.env_path(env_config), env_config)?;
    recursive_update(&mut config, &env);
    tracing::debug!("Merged env config '{}'", env_config);

    let alg = load_named(&layout.alg_path(alg_config), alg_config)?;
    recursive_update(&mut config, &alg);
    tracing::debug!("Merged algorithm config '{}'", alg_config);

    Ok(config)
}

fn load_named(path: &Path, name: &str) -> Result<ConfigMap, ConfigError> {
    if !path.exists() {
        let available = path.parent().map(available_configs).unwrap_or_default();
        return Err(ConfigError::NotFound {
            name: name.to_string(),
            path: path.to_path_buf(),
            available,
        });
    }
    load_yaml(path)
}

/// Names of the `.yaml` files in `dir`, sorted.
pub fn available_configs(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("yaml"))
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect();
    names.sort();
    names
}
