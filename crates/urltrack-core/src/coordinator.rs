//! Cache partition population on miss.
//!
//! An owner is present in the cache partition while its summary record is
//! live there; the summary carries the cache TTL. On a miss the coordinator
//! writes the summary record first, so concurrent writers see the owner as
//! present, drops whatever collection the previous cache lifetime left
//! behind, and then copies the whole base collection across. Two writers can
//! still both miss and both reload; each reload copies the full base
//! collection, so the cache converges to it.
//!
//! Any failure after the summary is written releases it again, so the next
//! write retries the reload instead of mirroring into a partial copy.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use urltrack_common::{
    CacheSummary, Clock, Error, OwnerKey, Partition, ProfileRecord, Result,
};
use urltrack_store::{CollectionStore, RecordStore};

/// Result of [`CacheCoordinator::ensure_cached`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The owner was already present; the caller mirrors its write directly
    AlreadyPresent,
    /// The base collection was copied into the cache partition
    Reloaded {
        /// Entries actually added to the cache collection
        loaded: usize,
    },
    /// The base collection was empty; nothing to copy
    ReloadSkipped,
}

/// Cache coordination counters
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Owner already present in the cache partition
    pub hits: AtomicU64,
    /// Base collection copied into the cache partition
    pub reloads: AtomicU64,
    /// Miss on an owner with an empty base collection
    pub skipped: AtomicU64,
    /// Reloads whose scan count disagreed with the reported size
    pub mismatches: AtomicU64,
    /// Reloads that failed after the summary record was written
    pub reload_failures: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub reloads: u64,
    pub skipped: u64,
    pub mismatches: u64,
    pub reload_failures: u64,
}

impl CacheStats {
    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            mismatches: self.mismatches.load(Ordering::Relaxed),
            reload_failures: self.reload_failures.load(Ordering::Relaxed),
        }
    }
}

/// Decides whether an owner exists in the cache partition and reloads it
/// from the base partition when it does not.
pub struct CacheCoordinator {
    collections: Arc<dyn CollectionStore>,
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    cache_ttl: Duration,
    stats: CacheStats,
}

impl CacheCoordinator {
    pub fn new(
        collections: Arc<dyn CollectionStore>,
        records: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            collections,
            records,
            clock,
            cache_ttl,
            stats: CacheStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Make sure `owner` is present in `cache`, reloading from `base` on a miss.
    pub fn ensure_cached(
        &self,
        owner: &OwnerKey,
        base: &Partition,
        cache: &Partition,
    ) -> Result<CacheOutcome> {
        if self.records.get_record(cache, owner)?.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheOutcome::AlreadyPresent);
        }

        // Claim the owner before reading the base collection
        let now = self.clock.now();
        let summary = ProfileRecord::CacheSummary(CacheSummary {
            owner: owner.clone(),
            cached_at: now,
        });
        self.records
            .put_record(cache, owner, &summary, Some(now.saturating_add(self.cache_ttl)))?;

        self.reload(owner, base, cache).map_err(|e| {
            self.stats.reload_failures.fetch_add(1, Ordering::Relaxed);
            // Release the claim so a later write retries the reload
            if let Err(del) = self.records.delete_record(cache, owner) {
                error!(%owner, %cache, "failed to release cache summary: {del}");
            }
            Error::ReloadFailure {
                partition: cache.clone(),
                owner: owner.clone(),
                reason: e.to_string(),
            }
        })
    }

    fn reload(
        &self,
        owner: &OwnerKey,
        base: &Partition,
        cache: &Partition,
    ) -> Result<CacheOutcome> {
        let stale = self.collections.remove_collection(cache, owner)?;
        if stale > 0 {
            debug!(%owner, %cache, stale, "dropped expired cache collection");
        }

        let reported = self.collections.size(base, owner)?;
        if reported == 0 {
            debug!(%owner, %cache, "base collection empty, reload skipped");
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheOutcome::ReloadSkipped);
        }

        let entries = self.collections.scan(base, owner)?;
        if entries.len() != reported {
            warn!(
                %owner, %base,
                scanned = entries.len(),
                reported,
                "consistency mismatch during cache reload"
            );
            self.stats.mismatches.fetch_add(1, Ordering::Relaxed);
        }

        let loaded = self.collections.bulk_load(cache, owner, &entries)?;
        info!(%owner, %cache, loaded, scanned = entries.len(), "cache reloaded");
        self.stats.reloads.fetch_add(1, Ordering::Relaxed);
        Ok(CacheOutcome::Reloaded { loaded })
    }
}
