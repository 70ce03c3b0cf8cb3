//! Configuration loading: TOML file first, command-line overrides on top.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use urltrack_common::Config;
use urltrack_common::Tier;
use urltrack_common::config::{CollectionKind, StoreBackend, SweepStrategy};

use crate::{Args, Commands};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum BackendArg {
    Memory,
    Redb,
}

impl From<BackendArg> for StoreBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Memory => Self::Memory,
            BackendArg::Redb => Self::Redb,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CollectionArg {
    Ordered,
    Unordered,
}

impl From<CollectionArg> for CollectionKind {
    fn from(arg: CollectionArg) -> Self {
        match arg {
            CollectionArg::Ordered => Self::Ordered,
            CollectionArg::Unordered => Self::Unordered,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StrategyArg {
    Client,
    Remote,
}

impl From<StrategyArg> for SweepStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Client => Self::Client,
            StrategyArg::Remote => Self::Remote,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TierArg {
    Base,
    Cache,
}

impl From<TierArg> for Tier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Base => Self::Base,
            TierArg::Cache => Self::Cache,
        }
    }
}

/// Read a config file. A missing file yields the defaults.
pub fn read_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Build the effective configuration (CLI takes precedence)
pub fn load(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => read_file(path)?,
        None => Config::default(),
    };

    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(backend) = args.backend {
        config.store.backend = backend.into();
    }
    if let Some(path) = &args.db_path {
        config.store.path.clone_from(path);
    }
    if let Some(collection) = args.collection {
        config.store.collection = collection.into();
    }
    if let Some(strategy) = args.strategy {
        config.sweep.strategy = strategy.into();
    }

    if let Commands::Emulate {
        writers,
        tps,
        run_secs,
        customers,
        users,
        ..
    } = &args.command
    {
        let workload = &mut config.workload;
        workload.writers = writers.unwrap_or(workload.writers);
        workload.tps_per_writer = tps.unwrap_or(workload.tps_per_writer);
        workload.run_secs = run_secs.unwrap_or(workload.run_secs);
        workload.customers = customers.unwrap_or(workload.customers);
        workload.users = users.unwrap_or(workload.users);
    }

    Ok(config)
}
