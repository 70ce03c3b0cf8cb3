//! Store and write-path wiring shared by every subcommand.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use urltrack_common::config::StoreBackend;
use urltrack_common::{Clock, Config, CustomerProfile, OwnerKey, Partition, SystemClock, Tier};
use urltrack_core::{
    CacheCoordinator, ConsistencyAuditor, ExpirationSweeper, SweepReport, VisitWriter,
    WriteRetryPolicy,
};
use urltrack_store::{CollectionStore, MemoryStore, RecordStore, RedbStore};

pub struct Services {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub collections: Arc<dyn CollectionStore>,
    pub records: Arc<dyn RecordStore>,
    pub writer: Arc<VisitWriter>,
    pub sweeper: Arc<ExpirationSweeper>,
    pub auditor: ConsistencyAuditor,
}

impl Services {
    /// Open the configured store with the system clock
    pub fn open(config: Config) -> Result<Arc<Self>> {
        let clock = Arc::new(SystemClock::with_resolution(config.write.clock_resolution()));
        Self::with_clock(config, clock)
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Arc<Self>> {
        let (collections, records): (Arc<dyn CollectionStore>, Arc<dyn RecordStore>) =
            match config.store.backend {
                StoreBackend::Memory => {
                    let store = Arc::new(MemoryStore::new(config.store.collection, clock.clone()));
                    let collections: Arc<dyn CollectionStore> = store.clone();
                    let records: Arc<dyn RecordStore> = store;
                    (collections, records)
                }
                StoreBackend::Redb => {
                    let store = Arc::new(
                        RedbStore::open(&config.store.path, clock.clone()).with_context(|| {
                            format!("failed to open store at {}", config.store.path.display())
                        })?,
                    );
                    info!("Opened redb store at {}", config.store.path.display());
                    let collections: Arc<dyn CollectionStore> = store.clone();
                    let records: Arc<dyn RecordStore> = store;
                    (collections, records)
                }
            };

        let coordinator = Arc::new(CacheCoordinator::new(
            collections.clone(),
            records.clone(),
            clock.clone(),
            config.partitions.cache_ttl(),
        ));
        let writer = Arc::new(VisitWriter::new(
            collections.clone(),
            coordinator,
            clock.clone(),
            WriteRetryPolicy::from_config(&config.write),
            config.workload.audit_every,
        ));
        let sweeper = Arc::new(ExpirationSweeper::new(
            collections.clone(),
            config.sweep.strategy,
        ));
        let auditor = ConsistencyAuditor::new(collections.clone());

        Ok(Arc::new(Self {
            config,
            clock,
            collections,
            records,
            writer,
            sweeper,
            auditor,
        }))
    }

    /// Partition of `tier` for customer number `customer`
    pub fn partition(&self, tier: Tier, customer: u64) -> Partition {
        self.config
            .partitions
            .partition(tier, &CustomerProfile::id_for(customer))
    }

    /// Base partition for a customer group name
    pub fn base_named(&self, group: &str) -> Partition {
        self.config.partitions.base(group)
    }

    /// Sweep one partition now, with the current time as cutoff
    pub fn sweep_now(&self, tier: Tier, customer: u64) -> Result<SweepReport> {
        let partition = self.partition(tier, customer);
        Ok(self.sweeper.sweep_once(&partition, self.clock.now())?)
    }

    /// Log a user's base and cache collections with their sizes
    pub fn query_user(&self, customer: u64, owner: &OwnerKey) -> Result<()> {
        for tier in [Tier::Base, Tier::Cache] {
            let partition = self.partition(tier, customer);
            self.log_collection(&partition, owner)?;
        }
        Ok(())
    }

    pub fn log_collection(&self, partition: &Partition, owner: &OwnerKey) -> Result<()> {
        let entries = self.collections.scan(partition, owner)?;
        let size = self.collections.size(partition, owner)?;
        info!(
            "{} {}: {} entries scanned, reported size {}",
            partition,
            owner,
            entries.len(),
            size
        );
        for entry in &entries {
            info!(
                "  expire={} created={} url={} referrer={} title={}",
                entry.expire_at, entry.created_at, entry.url, entry.referrer, entry.page_title
            );
        }
        Ok(())
    }
}
