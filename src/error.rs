//! Error types for config loading and resolution

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config '{name}' not found at {} (available: {})", .path.display(), format_available(.available))]
    NotFound { name: String, path: PathBuf, available: Vec<String> },

    #[error("{} error: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{}: top-level YAML value must be a mapping", .path.display())]
    NotAMapping { path: PathBuf },

    #[error("missing config key '{0}'")]
    MissingKey(String),

    #[error("config key '{key}' must be {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("invalid override '{0}': expected KEY=VALUE with a dotted key")]
    InvalidOverride(String),
}

fn format_available(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
