//! UrlTrack - visit-tracking harness
//!
//! Loads synthetic customers and users, drives concurrent visit writers and
//! expiration sweepers against the configured store, and runs one-shot
//! queries, sweeps, audits and JSON command files.

mod commands;
mod launcher;
mod services;
mod settings;
mod workload;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use urltrack_common::{OwnerKey, Tier};

use crate::services::Services;
use crate::settings::{BackendArg, CollectionArg, StrategyArg, TierArg};

#[derive(Parser, Debug)]
#[command(name = "urltrack")]
#[command(about = "UrlTrack visit-tracking harness")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "URLTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Store backend
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Database file for the redb backend
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Collection variant
    #[arg(long, value_enum)]
    collection: Option<CollectionArg>,

    /// Expiration sweep strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write customer and user profile records
    Load,
    /// Load profiles, then run visit writers and expiration sweepers
    Emulate {
        /// Number of writer tasks
        #[arg(long)]
        writers: Option<u32>,
        /// Target visits per second per writer
        #[arg(long)]
        tps: Option<u32>,
        /// Writer run time in seconds
        #[arg(long)]
        run_secs: Option<u64>,
        /// Number of customers
        #[arg(long)]
        customers: Option<u64>,
        /// Users per customer
        #[arg(long)]
        users: Option<u64>,
        /// Skip the profile load phase
        #[arg(long)]
        no_load: bool,
    },
    /// Show a user's base and cache collections
    Query {
        /// Customer number
        #[arg(long)]
        customer: u64,
        /// User name, e.g. "UserName(3)"
        #[arg(long)]
        user: String,
    },
    /// Sweep a customer's partitions once
    Clean {
        /// Customer number
        #[arg(long)]
        customer: u64,
        /// Only sweep this tier
        #[arg(long, value_enum)]
        tier: Option<TierArg>,
    },
    /// Audit a user's base and cache collections
    Audit {
        /// Customer number
        #[arg(long)]
        customer: u64,
        /// User name, e.g. "UserName(3)"
        #[arg(long)]
        user: String,
    },
    /// Process a JSON command file
    Commands {
        /// Command file path
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = settings::load(&args)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate().context("invalid configuration")?;
    info!("Starting UrlTrack");
    info!(
        "Store: {:?} ({:?} collections), sweep strategy: {:?}",
        config.store.backend, config.store.collection, config.sweep.strategy
    );

    let services = Services::open(config)?;

    match args.command {
        Commands::Load => {
            let written = workload::load_profiles(&services)?;
            info!("Loaded {} profile records", written);
        }
        Commands::Emulate { no_load, .. } => {
            launcher::emulate(services, !no_load).await?;
        }
        Commands::Query { customer, user } => {
            services.query_user(customer, &OwnerKey::new(user))?;
        }
        Commands::Clean { customer, tier } => {
            let tiers = tier.map_or_else(|| vec![Tier::Base, Tier::Cache], |t| vec![t.into()]);
            for tier in tiers {
                let report = services.sweep_now(tier, customer)?;
                info!(
                    "Swept {} partition of customer {}: {} owners, {} removed, {} failed",
                    tier, customer, report.owners, report.removed, report.failed
                );
            }
        }
        Commands::Audit { customer, user } => {
            let owner = OwnerKey::new(user);
            for tier in [Tier::Base, Tier::Cache] {
                let partition = services.partition(tier, customer);
                let result = services.auditor.audit(&owner, &partition)?;
                info!(
                    "Audit {} {}: scanned {}, reported {}, match {}",
                    partition, owner, result.scanned_count, result.reported_size, result.matched
                );
            }
        }
        Commands::Commands { file } => {
            let summary = commands::process_file(&services, &file)?;
            info!(
                "Processed {} commands from {} ({} failed)",
                summary.processed,
                file.display(),
                summary.failed
            );
        }
    }

    Ok(())
}
