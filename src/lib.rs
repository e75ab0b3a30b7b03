//! marl-launch: layered-config launcher for multi-agent RL experiments
//!
//! Loads default, environment and algorithm YAML configs, merges them, records
//! the run with a file-based observer and hands the result to a trainer.

pub mod cli;
pub mod config;
pub mod error;
pub mod run;

pub use config::ConfigMap;
pub use error::ConfigError;
