//! The per-visit write pipeline.
//!
//! One recorded visit goes through: a retried insert into the base
//! partition, cache coordination for the owner, a direct mirror into the
//! cache collection when the owner was already cached, and on every
//! `audit_every`-th operation an audit of both collections.

use std::sync::Arc;

use tracing::{debug, warn};
use urltrack_common::{Clock, Error, OwnerKey, Partition, VisitEntry, VisitTemplate};
use urltrack_store::CollectionStore;

use crate::auditor::{AuditResult, ConsistencyAuditor};
use crate::coordinator::{CacheCoordinator, CacheOutcome};
use crate::retry::{WriteFailure, WriteRetryPolicy};

/// Failure of one recorded visit
#[derive(Debug, thiserror::Error)]
pub enum VisitError {
    /// The base write did not happen
    #[error(transparent)]
    Write(#[from] WriteFailure),
    /// The base write happened; keeping the cache in step failed
    #[error("cache update failed after base write: {0}")]
    Cache(Error),
}

/// What happened to one recorded visit
#[derive(Clone, Debug)]
pub struct VisitReport {
    /// The entry written to the base partition
    pub entry: VisitEntry,
    /// Insert attempts used in the base partition
    pub attempts: u32,
    /// Cache coordination outcome
    pub cache: CacheOutcome,
    /// Whether the entry was inserted into the cache collection directly
    pub mirrored: bool,
    /// Base and cache audits, when this operation was an audit milestone
    pub audits: Option<(AuditResult, AuditResult)>,
}

/// Writes visits to the base partition and keeps the cache partition in step
pub struct VisitWriter {
    collections: Arc<dyn CollectionStore>,
    coordinator: Arc<CacheCoordinator>,
    auditor: ConsistencyAuditor,
    clock: Arc<dyn Clock>,
    retry: WriteRetryPolicy,
    audit_every: u64,
}

impl VisitWriter {
    pub fn new(
        collections: Arc<dyn CollectionStore>,
        coordinator: Arc<CacheCoordinator>,
        clock: Arc<dyn Clock>,
        retry: WriteRetryPolicy,
        audit_every: u64,
    ) -> Self {
        Self {
            auditor: ConsistencyAuditor::new(collections.clone()),
            collections,
            coordinator,
            clock,
            retry,
            audit_every,
        }
    }

    #[must_use]
    pub fn coordinator(&self) -> &CacheCoordinator {
        &self.coordinator
    }

    /// Record one visit described by `template`.
    ///
    /// `op_num` only selects audit milestones.
    pub async fn record(
        &self,
        template: &VisitTemplate,
        base: &Partition,
        cache: &Partition,
        op_num: u64,
    ) -> Result<VisitReport, VisitError> {
        let owner = &template.owner;
        let written = self
            .retry
            .write(self.collections.as_ref(), base, owner, || {
                template.build(self.clock.now())
            })
            .await?;

        let outcome = self
            .coordinator
            .ensure_cached(owner, base, cache)
            .map_err(VisitError::Cache)?;

        let mirrored = if outcome == CacheOutcome::AlreadyPresent {
            match self.collections.insert_unique(cache, owner, &written.entry) {
                Ok(()) => true,
                Err(e) if e.is_collision() => {
                    // A concurrent reload copied it already
                    debug!(%owner, %cache, "mirror skipped, entry already cached");
                    false
                }
                Err(e) => return Err(VisitError::Cache(e)),
            }
        } else {
            false
        };

        let audits = (self.audit_every > 0 && op_num % self.audit_every == 0)
            .then(|| self.audit_both(owner, base, cache))
            .flatten();

        Ok(VisitReport {
            entry: written.entry,
            attempts: written.attempts,
            cache: outcome,
            mirrored,
            audits,
        })
    }

    fn audit_both(
        &self,
        owner: &OwnerKey,
        base: &Partition,
        cache: &Partition,
    ) -> Option<(AuditResult, AuditResult)> {
        let audit = |partition: &Partition| match self.auditor.audit(owner, partition) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(%owner, %partition, "audit failed: {e}");
                None
            }
        };
        Some((audit(base)?, audit(cache)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use urltrack_common::config::CollectionKind;
    use urltrack_common::{ManualClock, Timestamp};
    use urltrack_store::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        writer: VisitWriter,
        base: Partition,
        cache: Partition,
    }

    fn harness(audit_every: u64) -> Harness {
        let clock = Arc::new(ManualClock::new(Timestamp::from_nanos(1_000)));
        let store = Arc::new(MemoryStore::new(CollectionKind::Ordered, clock.clone()));
        let coordinator = Arc::new(CacheCoordinator::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            Duration::from_secs(60),
        ));
        let writer = VisitWriter::new(
            store.clone(),
            coordinator,
            clock.clone(),
            WriteRetryPolicy::new(5, Duration::from_millis(1)),
            audit_every,
        );
        Harness {
            store,
            clock,
            writer,
            base: Partition::new("base", "CustID(1)"),
            cache: Partition::new("cache", "CustID(1)"),
        }
    }

    fn template(seed: u64) -> VisitTemplate {
        VisitTemplate::generated(OwnerKey::new("UserName(1)"), seed, Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_round_trip_through_base_and_cache() {
        let h = harness(0);
        let owner = OwnerKey::new("UserName(1)");

        let first = h.writer.record(&template(1), &h.base, &h.cache, 1).await.unwrap();
        assert_eq!(first.attempts, 1);
        assert_eq!(first.cache, CacheOutcome::Reloaded { loaded: 1 });
        assert!(!first.mirrored);

        h.clock.advance(Duration::from_micros(1));
        let second = h.writer.record(&template(2), &h.base, &h.cache, 2).await.unwrap();
        assert_eq!(second.cache, CacheOutcome::AlreadyPresent);
        assert!(second.mirrored);

        let base = h.store.scan(&h.base, &owner).unwrap();
        assert!(base.iter().any(|e| e.same_visit(&first.entry)));
        assert!(base.iter().any(|e| e.same_visit(&second.entry)));
        assert_eq!(h.store.scan(&h.cache, &owner).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_same_tick_writes_retry() {
        let h = harness(0);
        h.writer.record(&template(1), &h.base, &h.cache, 1).await.unwrap();

        // Frozen clock: every attempt stamps the same key
        let err = h
            .writer
            .record(&template(2), &h.base, &h.cache, 2)
            .await
            .unwrap_err();
        match err {
            VisitError::Write(failure) => {
                assert_eq!(failure.attempts, 5);
                assert!(failure.last_error.is_collision());
            }
            VisitError::Cache(e) => panic!("unexpected cache error: {e}"),
        }
    }

    #[tokio::test]
    async fn test_audit_on_milestone() {
        let h = harness(2);
        let report = h.writer.record(&template(1), &h.base, &h.cache, 1).await.unwrap();
        assert!(report.audits.is_none());

        h.clock.advance(Duration::from_micros(1));
        let report = h.writer.record(&template(2), &h.base, &h.cache, 2).await.unwrap();
        let (base, cache) = report.audits.unwrap();
        assert!(base.matched && cache.matched);
        assert_eq!(base.scanned_count, 2);
        assert_eq!(cache.reported_size, 2);
        assert_eq!(h.writer.coordinator().stats().hits, 1);
    }
}
