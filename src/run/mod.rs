//! Experiment tracking and the hand-off to the trainer

pub mod experiment;
pub mod observer;
pub mod token;
pub mod trainer;

pub use experiment::{Experiment, RunContext};
pub use observer::{filter_captured_output, FileStorageObserver, RunObserver, RunStart};
pub use token::{experiment_name, observer_dir, unique_token};
pub use trainer::{CommandTrainer, Trainer};
