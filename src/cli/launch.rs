//! Launch command implementation

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use std::path::PathBuf;

use crate::config::{
    apply_override, ensure_seed, load_layered, parse_assignment, propagate_seed, resolve_map_name,
    ConfigLayout, ConfigMap,
};
use crate::run::{
    experiment_name, observer_dir, unique_token, CommandTrainer, Experiment, FileStorageObserver,
};

/// Name the run is recorded under by the observer.
const EXPERIMENT_NAME: &str = "pymarl";

#[derive(Args, Debug)]
pub struct LaunchArgs {
    /// Environment config (loaded from <CONFIG_DIR>/envs/<NAME>.yaml)
    #[arg(long, value_name = "NAME", default_value = "sc2")]
    pub env_config: String,

    /// Algorithm config (loaded from <CONFIG_DIR>/algs/<NAME>.yaml)
    #[arg(long, value_name = "NAME", default_value = "liir_smac")]
    pub config: String,

    /// Map name; empty means use env_args.map_name from the config
    #[arg(long, value_name = "NAME", default_value = "")]
    pub map: String,

    /// Root of the config tree
    #[arg(long, value_name = "DIR", env = "MARL_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Directory results are written under
    #[arg(long, value_name = "DIR", env = "MARL_RESULTS_DIR", default_value = "results")]
    pub results_dir: PathBuf,

    /// Override a config value (repeatable), e.g. --set env_args.difficulty=7
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Print the merged config and run token without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Training command; overrides the `runner` config key
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// A fully merged and resolved configuration, ready to run.
#[derive(Debug)]
pub struct Prepared {
    pub config: ConfigMap,
    pub map_name: String,
    pub token: String,
}

/// Load, merge and resolve the config for `args`.
pub fn prepare(args: &LaunchArgs) -> Result<Prepared> {
    let layout = ConfigLayout::new(&args.config_dir);
    let mut config = load_layered(&layout, &args.env_config, &args.config)?;

    for raw in &args.overrides {
        let item = parse_assignment(raw)?;
        tracing::debug!("Applying override {}", raw);
        apply_override(&mut config, &item);
    }

    let map_name = resolve_map_name(&mut config, &args.map)?;
    ensure_seed(&mut config, &mut rand::thread_rng())?;
    propagate_seed(&mut config)?;

    let name = experiment_name(&config)?;
    let token = unique_token(&name, &map_name, &Local::now());

    Ok(Prepared { config, map_name, token })
}

pub fn run(args: LaunchArgs) -> Result<()> {
    let prepared = prepare(&args)?;

    let obs_dir = observer_dir(&args.results_dir, &prepared.token);
    tracing::info!("Saving to FileStorageObserver in {}/.", obs_dir.display());

    if args.dry_run {
        let yaml = serde_yaml::to_string(&prepared.config).context("Failed rendering config")?;
        println!("{}", yaml.trim_end());
        println!("# unique_token: {}", prepared.token);
        return Ok(());
    }

    let mut trainer = if args.command.is_empty() {
        CommandTrainer::from_config(&prepared.config)?.context(
            "No training command: pass one after `--` or set `runner` in the config",
        )?
    } else {
        CommandTrainer::new(args.command.clone())?
    };

    let observer = FileStorageObserver::create(obs_dir)?;

    let mut experiment = Experiment::new(EXPERIMENT_NAME, &prepared.token, prepared.config);
    experiment.observe(Box::new(observer));
    experiment.run(&mut trainer)
}
