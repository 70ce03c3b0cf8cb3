//! The keyed visit collection capability set.
//!
//! Every collection belongs to one `(partition, owner)` pair and is keyed by
//! [`VisitEntry::key`]. Each collection carries a store-reported size that
//! is maintained separately from the entries themselves; the two must agree,
//! and the consistency auditor checks that they do.

use urltrack_common::config::CollectionKind;
use urltrack_common::{OwnerKey, Partition, Result, Timestamp, VisitEntry};

/// Outcome of a store-side partition sweep
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpireReport {
    /// Collections visited
    pub owners: usize,
    /// Entries removed across all collections
    pub removed: usize,
}

/// Per-owner keyed collections of visit entries.
///
/// Every call is a blocking round trip to the store. Implementations are
/// shared between writer and sweeper tasks and must be internally
/// synchronized; callers hold no locks.
pub trait CollectionStore: Send + Sync {
    /// Collection variant provided by this store
    fn kind(&self) -> CollectionKind;

    /// Add `entry` to the owner's collection, creating it if needed.
    ///
    /// Fails with [`urltrack_common::Error::Collision`] if an entry with the
    /// same key already exists.
    fn insert_unique(&self, partition: &Partition, owner: &OwnerKey, entry: &VisitEntry)
    -> Result<()>;

    /// Add many entries as one operation, skipping keys already present.
    ///
    /// Returns the number of entries actually inserted.
    fn bulk_load(
        &self,
        partition: &Partition,
        owner: &OwnerKey,
        entries: &[VisitEntry],
    ) -> Result<usize>;

    /// Remove every entry whose key is strictly below `bound`.
    ///
    /// Ordered stores do a bounded range scan; unordered stores scan and
    /// filter the whole collection.
    fn range_delete(&self, partition: &Partition, owner: &OwnerKey, bound: Timestamp)
    -> Result<usize>;

    /// All current entries. A missing collection scans as empty.
    fn scan(&self, partition: &Partition, owner: &OwnerKey) -> Result<Vec<VisitEntry>>;

    /// Store-reported entry count. A missing collection has size zero.
    fn size(&self, partition: &Partition, owner: &OwnerKey) -> Result<usize>;

    /// Owners with a collection in `partition`
    fn list_owners(&self, partition: &Partition) -> Result<Vec<OwnerKey>>;

    /// Remove entries below `cutoff` from every collection in `partition`
    /// inside the store, without returning entry data to the caller.
    fn expire_partition(&self, partition: &Partition, cutoff: Timestamp) -> Result<ExpireReport>;

    /// Drop one owner's collection. Returns the number of entries dropped.
    fn remove_collection(&self, partition: &Partition, owner: &OwnerKey) -> Result<usize>;

    /// Drop every collection in `partition`. Returns the number of entries dropped.
    fn remove_partition(&self, partition: &Partition) -> Result<usize>;
}

/// Collision error for `entry` in the given collection
pub(crate) fn collision(
    partition: &Partition,
    owner: &OwnerKey,
    entry: &VisitEntry,
) -> urltrack_common::Error {
    urltrack_common::Error::Collision {
        partition: partition.clone(),
        owner: owner.clone(),
        key: entry.key(),
    }
}
