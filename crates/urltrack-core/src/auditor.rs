//! Scan-count versus reported-size checks.

use std::sync::Arc;

use tracing::{debug, error};
use urltrack_common::{Error, OwnerKey, Partition, Result};
use urltrack_store::CollectionStore;

/// Outcome of one audit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuditResult {
    pub scanned_count: usize,
    pub reported_size: usize,
    pub matched: bool,
}

impl AuditResult {
    /// The mismatch as an error value, for callers that collect them
    #[must_use]
    pub fn mismatch(&self, partition: &Partition, owner: &OwnerKey) -> Option<Error> {
        (!self.matched).then(|| Error::ConsistencyMismatch {
            partition: partition.clone(),
            owner: owner.clone(),
            scanned: self.scanned_count,
            reported: self.reported_size,
        })
    }
}

/// Read-only consistency checker. A mismatch is logged, never raised.
#[derive(Clone)]
pub struct ConsistencyAuditor {
    store: Arc<dyn CollectionStore>,
}

impl ConsistencyAuditor {
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self { store }
    }

    /// Compare a full scan of the owner's collection with its reported size.
    ///
    /// Only store failures are returned as errors.
    pub fn audit(&self, owner: &OwnerKey, partition: &Partition) -> Result<AuditResult> {
        let scanned_count = self.store.scan(partition, owner)?.len();
        let reported_size = self.store.size(partition, owner)?;
        let result = AuditResult {
            scanned_count,
            reported_size,
            matched: scanned_count == reported_size,
        };
        if result.matched {
            debug!(%owner, %partition, size = reported_size, "audit ok");
        } else {
            error!(
                %owner, %partition,
                scanned = scanned_count,
                reported = reported_size,
                "audit found size mismatch"
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use urltrack_common::config::CollectionKind;
    use urltrack_common::{ManualClock, Timestamp, VisitTemplate};
    use urltrack_store::MemoryStore;

    #[test]
    fn test_audit_detects_divergence() {
        let store = Arc::new(MemoryStore::new(
            CollectionKind::Ordered,
            Arc::new(ManualClock::new(Timestamp::ZERO)),
        ));
        let auditor = ConsistencyAuditor::new(store.clone());
        let p = Partition::new("base", "c");
        let owner = OwnerKey::new("u");
        let template = VisitTemplate::generated(owner.clone(), 1, Duration::from_secs(1));
        for at in 1..=3 {
            store
                .insert_unique(&p, &owner, &template.build(Timestamp::from_nanos(at)))
                .unwrap();
        }

        let clean = auditor.audit(&owner, &p).unwrap();
        assert_eq!(
            clean,
            AuditResult {
                scanned_count: 3,
                reported_size: 3,
                matched: true
            }
        );
        assert!(clean.mismatch(&p, &owner).is_none());

        store.inject_unaccounted(&p, &owner, template.build(Timestamp::from_nanos(10)));
        let dirty = auditor.audit(&owner, &p).unwrap();
        assert!(!dirty.matched);
        assert_eq!(dirty.scanned_count, 4);
        assert_eq!(dirty.reported_size, 3);
        assert!(matches!(
            dirty.mismatch(&p, &owner),
            Some(Error::ConsistencyMismatch { scanned: 4, reported: 3, .. })
        ));
    }

    #[test]
    fn test_audit_missing_collection() {
        let store = Arc::new(MemoryStore::new(
            CollectionKind::Unordered,
            Arc::new(ManualClock::new(Timestamp::ZERO)),
        ));
        let auditor = ConsistencyAuditor::new(store);
        let result = auditor
            .audit(&OwnerKey::new("nobody"), &Partition::new("cache", "c"))
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.scanned_count, 0);
    }
}
