//! Expiration sweeps over base and cache partitions.
//!
//! A sweep removes every entry whose key is below the cutoff from every
//! collection in one partition. The client strategy lists the owners and
//! range-deletes each collection separately, tolerating per-owner failures.
//! The remote strategy hands the whole partition to the store in one call
//! and transfers no entry data.
//!
//! Base and cache partitions are swept by separate tasks on separate
//! schedules; neither assumes the other has run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use urltrack_common::config::SweepStrategy;
use urltrack_common::{Clock, Partition, Result, Timestamp};
use urltrack_store::CollectionStore;

/// Counts from one or more sweeps
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sweeps performed
    pub cycles: usize,
    /// Collections swept successfully
    pub owners: usize,
    /// Entries removed
    pub removed: usize,
    /// Collections whose sweep failed
    pub failed: usize,
}

impl SweepReport {
    /// Fold another report into this one
    pub fn merge(&mut self, other: &Self) {
        self.cycles += other.cycles;
        self.owners += other.owners;
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

/// Removes expired entries from a partition using one strategy
pub struct ExpirationSweeper {
    store: Arc<dyn CollectionStore>,
    strategy: SweepStrategy,
}

impl ExpirationSweeper {
    pub fn new(store: Arc<dyn CollectionStore>, strategy: SweepStrategy) -> Self {
        Self { store, strategy }
    }

    #[must_use]
    pub const fn strategy(&self) -> SweepStrategy {
        self.strategy
    }

    /// Sweep `partition` once, removing entries with keys below `cutoff`.
    ///
    /// Fails only if the partition itself cannot be listed or swept; a
    /// client-side failure on one owner is counted and the sweep moves on.
    pub fn sweep_once(&self, partition: &Partition, cutoff: Timestamp) -> Result<SweepReport> {
        match self.strategy {
            SweepStrategy::Client => self.sweep_client(partition, cutoff),
            SweepStrategy::Remote => self.sweep_remote(partition, cutoff),
        }
    }

    fn sweep_client(&self, partition: &Partition, cutoff: Timestamp) -> Result<SweepReport> {
        let mut report = SweepReport {
            cycles: 1,
            ..SweepReport::default()
        };
        for owner in self.store.list_owners(partition)? {
            match self.store.range_delete(partition, &owner, cutoff) {
                Ok(removed) => {
                    report.owners += 1;
                    report.removed += removed;
                }
                Err(e) => {
                    warn!(%partition, %owner, "range delete failed: {e}");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    fn sweep_remote(&self, partition: &Partition, cutoff: Timestamp) -> Result<SweepReport> {
        let expired = self.store.expire_partition(partition, cutoff)?;
        Ok(SweepReport {
            cycles: 1,
            owners: expired.owners,
            removed: expired.removed,
            failed: 0,
        })
    }
}

/// Lifecycle of a [`SweeperTask`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweeperState {
    Sleeping,
    Sweeping,
    Stopped,
}

/// Periodic sweeper for one partition with a bounded lifetime.
///
/// The deadline is checked once per cycle, after the sleep; a sweep that
/// has started always runs to completion.
pub struct SweeperTask {
    sweeper: Arc<ExpirationSweeper>,
    clock: Arc<dyn Clock>,
    partition: Partition,
    interval: Duration,
    run_duration: Duration,
    stagger: Duration,
    state: watch::Sender<SweeperState>,
}

impl SweeperTask {
    pub fn new(
        sweeper: Arc<ExpirationSweeper>,
        clock: Arc<dyn Clock>,
        partition: Partition,
        interval: Duration,
        run_duration: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SweeperState::Sleeping);
        Self {
            sweeper,
            clock,
            partition,
            interval,
            run_duration,
            stagger: Duration::ZERO,
            state,
        }
    }

    /// Delay the first cycle by `stagger`
    #[must_use]
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Watch the task's state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SweeperState> {
        self.state.subscribe()
    }

    /// Run until the run duration has elapsed. Returns the accumulated report.
    pub async fn run(self) -> SweepReport {
        let start = Instant::now();
        let mut total = SweepReport::default();
        let partition = &self.partition;

        if !self.stagger.is_zero() {
            tokio::time::sleep(self.stagger).await;
        }
        info!(
            %partition,
            strategy = ?self.sweeper.strategy(),
            interval_secs = self.interval.as_secs(),
            "sweeper started"
        );

        loop {
            self.state.send_replace(SweeperState::Sleeping);
            tokio::time::sleep(self.interval).await;
            if start.elapsed() > self.run_duration {
                break;
            }

            self.state.send_replace(SweeperState::Sweeping);
            let cutoff = self.clock.now();
            match self.sweeper.sweep_once(partition, cutoff) {
                Ok(report) => {
                    if report.removed > 0 || report.failed > 0 {
                        info!(
                            %partition,
                            owners = report.owners,
                            removed = report.removed,
                            failed = report.failed,
                            "sweep complete"
                        );
                    } else {
                        debug!(%partition, owners = report.owners, "sweep found nothing to remove");
                    }
                    total.merge(&report);
                }
                Err(e) => {
                    warn!(%partition, "sweep failed: {e}");
                    total.cycles += 1;
                }
            }
        }

        self.state.send_replace(SweeperState::Stopped);
        info!(
            %partition,
            cycles = total.cycles,
            removed = total.removed,
            failed = total.failed,
            "sweeper stopped"
        );
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urltrack_common::config::CollectionKind;
    use urltrack_common::{Error, ManualClock, OwnerKey, VisitEntry, VisitTemplate};
    use urltrack_store::{ExpireReport, MemoryStore};

    fn fill(store: &MemoryStore, partition: &Partition, owner: &str, created: &[u64]) {
        let owner = OwnerKey::new(owner);
        for &at in created {
            let entry = VisitTemplate::generated(owner.clone(), at, Duration::from_nanos(100))
                .build(Timestamp::from_nanos(at));
            store.insert_unique(partition, &owner, &entry).unwrap();
        }
    }

    fn keys(store: &MemoryStore, partition: &Partition, owner: &str) -> Vec<u64> {
        let mut keys: Vec<u64> = store
            .scan(partition, &OwnerKey::new(owner))
            .unwrap()
            .iter()
            .map(|e| e.key().as_nanos())
            .collect();
        keys.sort_unstable();
        keys
    }

    fn memory(kind: CollectionKind) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new(
            kind,
            Arc::new(ManualClock::new(Timestamp::ZERO)),
        ))
    }

    #[test]
    fn test_cutoff_is_exclusive_for_both_strategies() {
        for strategy in [SweepStrategy::Client, SweepStrategy::Remote] {
            for kind in [CollectionKind::Ordered, CollectionKind::Unordered] {
                let store = memory(kind);
                let p = Partition::new("base", "c");
                // keys 100, 150, 200
                fill(&store, &p, "a", &[0, 50, 100]);
                fill(&store, &p, "b", &[0, 50, 100]);

                let sweeper = ExpirationSweeper::new(store.clone(), strategy);
                let report = sweeper
                    .sweep_once(&p, Timestamp::from_nanos(150))
                    .unwrap();
                assert_eq!(report.removed, 2, "{strategy:?} {kind:?}");
                assert_eq!(report.owners, 2);
                assert_eq!(keys(&store, &p, "a"), vec![150, 200]);
                assert_eq!(store.size(&p, &OwnerKey::new("b")).unwrap(), 2);
            }
        }
    }

    #[test]
    fn test_sweep_leaves_other_partitions() {
        let store = memory(CollectionKind::Ordered);
        let base = Partition::new("base", "c");
        let cache = Partition::new("cache", "c");
        fill(&store, &base, "a", &[0]);
        fill(&store, &cache, "a", &[0]);

        let sweeper = ExpirationSweeper::new(store.clone(), SweepStrategy::Client);
        sweeper.sweep_once(&cache, Timestamp::MAX).unwrap();
        assert!(keys(&store, &cache, "a").is_empty());
        assert_eq!(keys(&store, &base, "a"), vec![100]);
    }

    /// Store whose range deletes fail for one owner
    struct FlakyOwner {
        inner: Arc<MemoryStore>,
        broken: OwnerKey,
    }

    impl CollectionStore for FlakyOwner {
        fn kind(&self) -> CollectionKind {
            self.inner.kind()
        }
        fn insert_unique(&self, p: &Partition, o: &OwnerKey, e: &VisitEntry) -> Result<()> {
            self.inner.insert_unique(p, o, e)
        }
        fn bulk_load(&self, p: &Partition, o: &OwnerKey, e: &[VisitEntry]) -> Result<usize> {
            self.inner.bulk_load(p, o, e)
        }
        fn range_delete(&self, p: &Partition, o: &OwnerKey, b: Timestamp) -> Result<usize> {
            if *o == self.broken {
                return Err(Error::Timeout);
            }
            self.inner.range_delete(p, o, b)
        }
        fn scan(&self, p: &Partition, o: &OwnerKey) -> Result<Vec<VisitEntry>> {
            self.inner.scan(p, o)
        }
        fn size(&self, p: &Partition, o: &OwnerKey) -> Result<usize> {
            self.inner.size(p, o)
        }
        fn list_owners(&self, p: &Partition) -> Result<Vec<OwnerKey>> {
            self.inner.list_owners(p)
        }
        fn expire_partition(&self, p: &Partition, c: Timestamp) -> Result<ExpireReport> {
            self.inner.expire_partition(p, c)
        }
        fn remove_collection(&self, p: &Partition, o: &OwnerKey) -> Result<usize> {
            self.inner.remove_collection(p, o)
        }
        fn remove_partition(&self, p: &Partition) -> Result<usize> {
            self.inner.remove_partition(p)
        }
    }

    #[test]
    fn test_client_sweep_continues_past_failed_owner() {
        let store = memory(CollectionKind::Ordered);
        let p = Partition::new("base", "c");
        for owner in ["a", "b", "c"] {
            fill(&store, &p, owner, &[0]);
        }
        let flaky = Arc::new(FlakyOwner {
            inner: store.clone(),
            broken: OwnerKey::new("b"),
        });

        let sweeper = ExpirationSweeper::new(flaky, SweepStrategy::Client);
        let report = sweeper.sweep_once(&p, Timestamp::MAX).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.owners, 2);
        assert_eq!(report.removed, 2);
        assert!(keys(&store, &p, "c").is_empty());
        assert_eq!(keys(&store, &p, "b"), vec![100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_stops_after_run_duration() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_nanos(120)));
        let store = Arc::new(MemoryStore::new(CollectionKind::Ordered, clock.clone()));
        let p = Partition::new("cache", "c");
        fill(&store, &p, "a", &[0, 50]);

        let sweeper = Arc::new(ExpirationSweeper::new(store.clone(), SweepStrategy::Remote));
        let task = SweeperTask::new(
            sweeper,
            clock,
            p.clone(),
            Duration::from_secs(10),
            Duration::from_secs(35),
        )
        .with_stagger(Duration::from_secs(1));
        let state = task.subscribe();
        assert_eq!(*state.borrow(), SweeperState::Sleeping);

        let report = task.run().await;
        // Sweeps at 11s, 21s and 31s; the wake-up at 41s stops the task
        assert_eq!(report.cycles, 3);
        assert_eq!(report.removed, 1);
        assert_eq!(keys(&store, &p, "a"), vec![150]);
        assert_eq!(*state.borrow(), SweeperState::Stopped);
    }
}
