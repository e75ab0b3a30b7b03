//! Command-line interface for marl-launch
//!
//! A single launch command: load the layered config, resolve the map, record
//! the run and hand it to the trainer.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod launch;

pub use launch::LaunchArgs;

/// Launch multi-agent reinforcement-learning experiments from layered YAML configs
#[derive(Parser)]
#[command(name = "marl-launch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    launch: LaunchArgs,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long)]
    verbose: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG in the environment always takes precedence; --verbose falls back to DEBUG.
    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    launch::run(cli.launch)
}
