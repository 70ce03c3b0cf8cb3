//! Bounded retry of timestamp-keyed inserts.
//!
//! Entry keys come from a coarse clock, so concurrent writers stamping in the
//! same tick collide. A collision is retried with a freshly built entry after
//! a short backoff; any other failure aborts the write at once.

use std::time::Duration;

use tracing::{debug, warn};
use urltrack_common::config::WriteConfig;
use urltrack_common::{Error, OwnerKey, Partition, VisitEntry};
use urltrack_store::CollectionStore;

/// A write that exhausted its attempts or hit a store failure
#[derive(Debug, thiserror::Error)]
#[error("write failed after {attempts} attempt(s): {last_error}")]
pub struct WriteFailure {
    pub attempts: u32,
    pub last_error: Error,
}

/// A successful write
#[derive(Clone, Debug)]
pub struct WriteOutcome {
    /// The entry that was stored
    pub entry: VisitEntry,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Collision retry policy for single-entry inserts
#[derive(Clone, Copy, Debug)]
pub struct WriteRetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for WriteRetryPolicy {
    fn default() -> Self {
        Self::from_config(&WriteConfig::default())
    }
}

impl WriteRetryPolicy {
    /// Create a policy; zero attempts is treated as one
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    #[must_use]
    pub fn from_config(config: &WriteConfig) -> Self {
        Self::new(config.max_attempts, config.collision_backoff())
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Insert an entry produced by `build` into the owner's collection.
    ///
    /// `build` is called once per attempt and must stamp a new key each time.
    pub async fn write<F>(
        &self,
        store: &dyn CollectionStore,
        partition: &Partition,
        owner: &OwnerKey,
        mut build: F,
    ) -> Result<WriteOutcome, WriteFailure>
    where
        F: FnMut() -> VisitEntry + Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let entry = build();
            match store.insert_unique(partition, owner, &entry) {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(%partition, %owner, attempt, "write succeeded after collision");
                    }
                    return Ok(WriteOutcome {
                        entry,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_collision() && attempt < self.max_attempts => {
                    debug!(%partition, %owner, attempt, "key collision, retrying: {e}");
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => {
                    warn!(%partition, %owner, attempt, "write failed: {e}");
                    return Err(WriteFailure {
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use urltrack_common::config::CollectionKind;
    use urltrack_common::{ManualClock, Result, Timestamp, VisitTemplate};
    use urltrack_store::{ExpireReport, MemoryStore};

    fn template() -> VisitTemplate {
        VisitTemplate::generated(OwnerKey::new("u"), 1, Duration::from_nanos(100))
    }

    fn memory() -> MemoryStore {
        MemoryStore::new(
            CollectionKind::Ordered,
            Arc::new(ManualClock::new(Timestamp::ZERO)),
        )
    }

    #[tokio::test]
    async fn test_collision_then_unique_key() {
        let store = memory();
        let p = Partition::new("base", "c");
        let owner = OwnerKey::new("u");
        store
            .insert_unique(&p, &owner, &template().build(Timestamp::from_nanos(10)))
            .unwrap();

        // Same key twice, then a fresh one
        let stamps = [10, 10, 11];
        let mut calls = 0;
        let policy = WriteRetryPolicy::new(5, Duration::from_millis(1));
        let outcome = policy
            .write(&store, &p, &owner, || {
                let at = stamps[calls];
                calls += 1;
                template().build(Timestamp::from_nanos(at))
            })
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.entry.key(), Timestamp::from_nanos(111));
        assert_eq!(store.size(&p, &owner).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_attempts() {
        let store = memory();
        let p = Partition::new("base", "c");
        let owner = OwnerKey::new("u");
        let entry = template().build(Timestamp::from_nanos(10));
        store.insert_unique(&p, &owner, &entry).unwrap();

        let policy = WriteRetryPolicy::new(4, Duration::from_millis(1));
        let failure = policy
            .write(&store, &p, &owner, || entry.clone())
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 4);
        assert!(failure.last_error.is_collision());
    }

    /// Store whose inserts always fail with a store error
    struct FailingStore {
        inserts: AtomicU32,
    }

    impl CollectionStore for FailingStore {
        fn kind(&self) -> CollectionKind {
            CollectionKind::Ordered
        }
        fn insert_unique(&self, _: &Partition, _: &OwnerKey, _: &VisitEntry) -> Result<()> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Err(Error::Timeout)
        }
        fn bulk_load(&self, _: &Partition, _: &OwnerKey, _: &[VisitEntry]) -> Result<usize> {
            Err(Error::Timeout)
        }
        fn range_delete(&self, _: &Partition, _: &OwnerKey, _: Timestamp) -> Result<usize> {
            Err(Error::Timeout)
        }
        fn scan(&self, _: &Partition, _: &OwnerKey) -> Result<Vec<VisitEntry>> {
            Err(Error::Timeout)
        }
        fn size(&self, _: &Partition, _: &OwnerKey) -> Result<usize> {
            Err(Error::Timeout)
        }
        fn list_owners(&self, _: &Partition) -> Result<Vec<OwnerKey>> {
            Err(Error::Timeout)
        }
        fn expire_partition(&self, _: &Partition, _: Timestamp) -> Result<ExpireReport> {
            Err(Error::Timeout)
        }
        fn remove_collection(&self, _: &Partition, _: &OwnerKey) -> Result<usize> {
            Err(Error::Timeout)
        }
        fn remove_partition(&self, _: &Partition) -> Result<usize> {
            Err(Error::Timeout)
        }
    }

    #[tokio::test]
    async fn test_store_error_aborts_without_retry() {
        let store = FailingStore {
            inserts: AtomicU32::new(0),
        };
        let policy = WriteRetryPolicy::default();
        let failure = policy
            .write(&store, &Partition::new("base", "c"), &OwnerKey::new("u"), || {
                template().build(Timestamp::from_nanos(1))
            })
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert!(failure.last_error.is_store_failure());
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
    }
}
