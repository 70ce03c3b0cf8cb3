//! Configuration types for UrlTrack
//!
//! This module defines configuration structures used across components.
//! Every section has defaults, so an empty TOML file is a valid config.

use crate::error::{Error, Result};
use crate::types::{Partition, Tier};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for UrlTrack
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store backend configuration
    pub store: StoreConfig,
    /// Base/cache partition configuration
    pub partitions: PartitionConfig,
    /// Write path configuration
    pub write: WriteConfig,
    /// Expiration sweep configuration
    pub sweep: SweepConfig,
    /// Load generation configuration
    pub workload: WorkloadConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.write.max_attempts == 0 {
            return Err(Error::configuration("write.max_attempts must be at least 1"));
        }
        if self.partitions.base_namespace == self.partitions.cache_namespace {
            return Err(Error::configuration(
                "partitions.base_namespace and partitions.cache_namespace must differ",
            ));
        }
        if self.partitions.cache_ttl() >= self.write.entry_ttl() {
            return Err(Error::configuration(format!(
                "partitions.cache_ttl_secs ({}) must be shorter than write.entry_ttl_secs ({})",
                self.partitions.cache_ttl_secs, self.write.entry_ttl_secs
            )));
        }
        if self.sweep.base_interval_secs == 0 || self.sweep.cache_interval_secs == 0 {
            return Err(Error::configuration("sweep intervals must be non-zero"));
        }
        if self.workload.customers == 0 || self.workload.users == 0 {
            return Err(Error::configuration(
                "workload.customers and workload.users must be non-zero",
            ));
        }
        if self.workload.writers == 0 || self.workload.tps_per_writer == 0 {
            return Err(Error::configuration(
                "workload.writers and workload.tps_per_writer must be non-zero",
            ));
        }
        if self.store.backend == StoreBackend::Redb
            && self.store.collection == CollectionKind::Unordered
        {
            return Err(Error::configuration(
                "the redb backend only provides ordered collections",
            ));
        }
        Ok(())
    }
}

/// Which store implementation backs the collections and records
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on exit
    #[default]
    Memory,
    /// redb database file
    Redb,
}

/// Collection variant, chosen once at startup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Keys kept sorted; range delete is a bounded range scan
    #[default]
    Ordered,
    /// Unique keys with equality lookup only; range delete scans everything
    Unordered,
}

/// Store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend implementation
    pub backend: StoreBackend,
    /// Database file for the redb backend
    pub path: PathBuf,
    /// Collection variant
    pub collection: CollectionKind,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: PathBuf::from("./urltrack-data/visits.redb"),
            collection: CollectionKind::Ordered,
        }
    }
}

/// Base and cache partition naming
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Namespace holding durable visit data
    pub base_namespace: String,
    /// Namespace holding the TTL-bound mirror
    pub cache_namespace: String,
    /// Lifetime of an owner's presence in the cache partition (seconds)
    pub cache_ttl_secs: u64,
}

impl PartitionConfig {
    /// Base partition for a customer
    #[must_use]
    pub fn base(&self, group: &str) -> Partition {
        Partition::new(self.base_namespace.as_str(), group)
    }

    /// Cache partition for a customer
    #[must_use]
    pub fn cache(&self, group: &str) -> Partition {
        Partition::new(self.cache_namespace.as_str(), group)
    }

    /// Partition of the given tier for a customer
    #[must_use]
    pub fn partition(&self, tier: Tier, group: &str) -> Partition {
        match tier {
            Tier::Base => self.base(group),
            Tier::Cache => self.cache(group),
        }
    }

    /// Cache TTL as a duration
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            base_namespace: "base".to_string(),
            cache_namespace: "cache".to_string(),
            cache_ttl_secs: 24 * 60 * 60, // one day
        }
    }
}

/// Write path configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConfig {
    /// Insert attempts before giving up on collisions
    pub max_attempts: u32,
    /// Delay between collision retries (milliseconds)
    pub collision_backoff_ms: u64,
    /// Lifetime of a visit entry (seconds)
    pub entry_ttl_secs: u64,
    /// Tick of the timestamp clock (microseconds)
    pub clock_resolution_us: u64,
}

impl WriteConfig {
    /// Collision backoff as a duration
    #[must_use]
    pub const fn collision_backoff(&self) -> Duration {
        Duration::from_millis(self.collision_backoff_ms)
    }

    /// Entry TTL as a duration
    #[must_use]
    pub const fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs)
    }

    /// Clock tick as a duration
    #[must_use]
    pub const fn clock_resolution(&self) -> Duration {
        Duration::from_micros(self.clock_resolution_us)
    }
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            collision_backoff_ms: 10,
            entry_ttl_secs: 7 * 24 * 60 * 60, // seven days
            clock_resolution_us: 1,
        }
    }
}

/// How expired entries are purged
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepStrategy {
    /// List owners, then range-delete each collection from the caller
    #[default]
    Client,
    /// One store-side composite operation per partition
    Remote,
}

/// Expiration sweep configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Sweep strategy
    pub strategy: SweepStrategy,
    /// Sleep between sweeps of base partitions (seconds)
    pub base_interval_secs: u64,
    /// Sleep between sweeps of cache partitions (seconds)
    pub cache_interval_secs: u64,
    /// Sweeper lifetime (seconds)
    pub run_duration_secs: u64,
    /// Per-sweeper start offset, multiplied by the sweeper number (milliseconds)
    pub stagger_ms: u64,
}

impl SweepConfig {
    /// Sleep between sweeps for a tier
    #[must_use]
    pub const fn interval(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Base => Duration::from_secs(self.base_interval_secs),
            Tier::Cache => Duration::from_secs(self.cache_interval_secs),
        }
    }

    /// Sweeper lifetime as a duration
    #[must_use]
    pub const fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_duration_secs)
    }

    /// Start offset for the n-th sweeper
    #[must_use]
    pub fn stagger(&self, sweeper_number: u32) -> Duration {
        Duration::from_millis(self.stagger_ms.saturating_mul(u64::from(sweeper_number)))
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            strategy: SweepStrategy::Client,
            base_interval_secs: 60,
            cache_interval_secs: 10,
            run_duration_secs: 300,
            stagger_ms: 1000,
        }
    }
}

/// Load generation configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of customers (partition groups)
    pub customers: u64,
    /// Users per customer
    pub users: u64,
    /// Writer tasks
    pub writers: u32,
    /// Target visits per second per writer
    pub tps_per_writer: u32,
    /// Writer run time (seconds)
    pub run_secs: u64,
    /// Audit both tiers every N operations
    pub audit_every: u64,
    /// Progress log every N operations
    pub log_every: u64,
    /// Number of hot users per customer
    pub hot_users: u64,
    /// How much likelier a hot user is to be picked
    pub hot_multiplier: u64,
    /// Extra wait beyond the run time before abandoning writers (seconds)
    pub shutdown_grace_secs: u64,
}

impl WorkloadConfig {
    /// Writer run time as a duration
    #[must_use]
    pub const fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }

    /// Upper bound on waiting for writers to finish
    #[must_use]
    pub const fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.run_secs + self.shutdown_grace_secs)
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            customers: 10,
            users: 100,
            writers: 4,
            tps_per_writer: 50,
            run_secs: 60,
            audit_every: 2000,
            log_every: 1000,
            hot_users: 10,
            hot_multiplier: 4,
            shutdown_grace_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
