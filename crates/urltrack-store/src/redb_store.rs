//! Durable ordered store backed by redb.
//!
//! Each trait operation runs in one redb transaction, so a single-collection
//! operation and a partition sweep are each atomic. Collection sizes live in
//! their own table and are updated in the same transaction as the entries.

use crate::collection::{CollectionStore, ExpireReport, collision};
use crate::error::StoreResult;
use crate::records::{RecordStore, StoredRecord};
use crate::tables;
use redb::{Database, ReadableTable};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};
use urltrack_common::config::CollectionKind;
use urltrack_common::{Clock, OwnerKey, Partition, ProfileRecord, Result, Timestamp, VisitEntry};

/// Ordered collection and record store persisted in a redb file.
pub struct RedbStore {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl RedbStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::VISIT_ENTRIES)?;
            let _t = write_txn.open_table(tables::COLLECTION_SIZES)?;
            let _t = write_txn.open_table(tables::PROFILE_RECORDS)?;
        }
        write_txn.commit()?;
        debug!("Opened redb store at {}", path.display());

        Ok(Self { db, clock })
    }

    // ---- Collections ----

    /// Insert entries, skipping present keys. Returns how many were inserted.
    fn insert_entries(&self, collection: &str, entries: &[VisitEntry]) -> StoreResult<usize> {
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(tables::VISIT_ENTRIES)?;
            let mut sizes = write_txn.open_table(tables::COLLECTION_SIZES)?;
            let mut inserted = 0usize;
            for entry in entries {
                let key = tables::entry_key(collection, entry.key());
                if table.get(key.as_str())?.is_some() {
                    continue;
                }
                let bytes = bincode::serialize(entry)?;
                table.insert(key.as_str(), bytes.as_slice())?;
                inserted += 1;
            }
            let current = sizes.get(collection)?.map_or(0, |v| v.value());
            sizes.insert(collection, current + inserted as u64)?;
            inserted
        };
        write_txn.commit()?;
        Ok(inserted)
    }

    /// Delete entries of `collection` with keys below `bound` inside an open txn
    fn delete_below(
        write_txn: &redb::WriteTransaction,
        collection: &str,
        bound: Option<Timestamp>,
    ) -> StoreResult<usize> {
        let mut table = write_txn.open_table(tables::VISIT_ENTRIES)?;
        let mut sizes = write_txn.open_table(tables::COLLECTION_SIZES)?;
        let (lo, full_hi) = tables::entry_range(collection);
        let hi = bound.map_or(full_hi, |b| tables::entry_key(collection, b));

        // Collect keys first, then remove
        let doomed: Vec<String> = {
            let mut keys = Vec::new();
            for entry in table.range(lo.as_str()..hi.as_str())? {
                let entry = entry?;
                keys.push(entry.0.value().to_string());
            }
            keys
        };
        for key in &doomed {
            table.remove(key.as_str())?;
        }
        if !doomed.is_empty() {
            let current = sizes.get(collection)?.map_or(0, |v| v.value());
            sizes.insert(collection, current.saturating_sub(doomed.len() as u64))?;
        }
        Ok(doomed.len())
    }

    fn range_delete_inner(&self, collection: &str, bound: Timestamp) -> StoreResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = Self::delete_below(&write_txn, collection, Some(bound))?;
        write_txn.commit()?;
        Ok(removed)
    }

    fn scan_inner(&self, collection: &str) -> StoreResult<Vec<VisitEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::VISIT_ENTRIES)?;
        let (lo, hi) = tables::entry_range(collection);
        let mut result = Vec::new();
        for entry in table.range(lo.as_str()..hi.as_str())? {
            let entry = entry?;
            match bincode::deserialize::<VisitEntry>(entry.1.value()) {
                Ok(visit) => result.push(visit),
                Err(e) => error!("Failed to decode visit entry '{:?}': {}", entry.0.value(), e),
            }
        }
        Ok(result)
    }

    fn size_inner(&self, collection: &str) -> StoreResult<usize> {
        let read_txn = self.db.begin_read()?;
        let sizes = read_txn.open_table(tables::COLLECTION_SIZES)?;
        let size = sizes.get(collection)?.map_or(0, |v| v.value());
        Ok(usize::try_from(size).unwrap_or(usize::MAX))
    }

    /// Collection keys under a partition prefix
    fn collections_in<V: redb::Value + 'static>(
        table: &impl ReadableTable<&'static str, V>,
        prefix: &str,
    ) -> StoreResult<Vec<String>> {
        let end = tables::prefix_end(prefix);
        let mut result = Vec::new();
        for entry in table.range(prefix..end.as_str())? {
            let entry = entry?;
            result.push(entry.0.value().to_string());
        }
        Ok(result)
    }

    fn list_owners_inner(&self, prefix: &str) -> StoreResult<Vec<OwnerKey>> {
        let read_txn = self.db.begin_read()?;
        let sizes = read_txn.open_table(tables::COLLECTION_SIZES)?;
        Ok(Self::collections_in(&sizes, prefix)?
            .into_iter()
            .map(|key| OwnerKey::new(&key[prefix.len()..]))
            .collect())
    }

    fn expire_partition_inner(&self, prefix: &str, cutoff: Timestamp) -> StoreResult<ExpireReport> {
        let write_txn = self.db.begin_write()?;
        let collections = {
            let sizes = write_txn.open_table(tables::COLLECTION_SIZES)?;
            Self::collections_in(&sizes, prefix)?
        };
        let mut report = ExpireReport::default();
        for collection in &collections {
            report.owners += 1;
            report.removed += Self::delete_below(&write_txn, collection, Some(cutoff))?;
        }
        write_txn.commit()?;
        Ok(report)
    }

    fn remove_collections(&self, collections: &[String]) -> StoreResult<usize> {
        let write_txn = self.db.begin_write()?;
        let mut removed = 0;
        for collection in collections {
            removed += Self::delete_below(&write_txn, collection, None)?;
            write_txn
                .open_table(tables::COLLECTION_SIZES)?
                .remove(collection.as_str())?;
        }
        write_txn.commit()?;
        Ok(removed)
    }

    fn remove_partition_inner(&self, prefix: &str) -> StoreResult<usize> {
        let collections = {
            let read_txn = self.db.begin_read()?;
            let sizes = read_txn.open_table(tables::COLLECTION_SIZES)?;
            Self::collections_in(&sizes, prefix)?
        };
        self.remove_collections(&collections)
    }

    // ---- Records (bincode) ----

    fn put_record_inner(&self, key: &str, stored: &StoredRecord) -> StoreResult<()> {
        let bytes = bincode::serialize(stored)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(tables::PROFILE_RECORDS)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_record_inner(&self, key: &str) -> StoreResult<Option<StoredRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::PROFILE_RECORDS)?;
        match table.get(key)? {
            Some(val) => Ok(Some(bincode::deserialize(val.value())?)),
            None => Ok(None),
        }
    }

    fn delete_record_inner(&self, key: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(tables::PROFILE_RECORDS)?;
            table.remove(key)?.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    fn record_owners_inner(&self, prefix: &str, now: Timestamp) -> StoreResult<Vec<OwnerKey>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::PROFILE_RECORDS)?;
        let end = tables::prefix_end(prefix);
        let mut result = Vec::new();
        for entry in table.range(prefix..end.as_str())? {
            let entry = entry?;
            let key = entry.0.value();
            match bincode::deserialize::<StoredRecord>(entry.1.value()) {
                Ok(stored) if !stored.is_expired(now) => {
                    result.push(OwnerKey::new(&key[prefix.len()..]));
                }
                Ok(_) => {}
                Err(e) => error!("Failed to decode record '{:?}': {}", key, e),
            }
        }
        Ok(result)
    }
}

impl CollectionStore for RedbStore {
    fn kind(&self) -> CollectionKind {
        CollectionKind::Ordered
    }

    fn insert_unique(
        &self,
        partition: &Partition,
        owner: &OwnerKey,
        entry: &VisitEntry,
    ) -> Result<()> {
        let collection = tables::collection_key(partition, owner)?;
        if self.insert_entries(&collection, std::slice::from_ref(entry))? == 0 {
            return Err(collision(partition, owner, entry));
        }
        Ok(())
    }

    fn bulk_load(
        &self,
        partition: &Partition,
        owner: &OwnerKey,
        entries: &[VisitEntry],
    ) -> Result<usize> {
        let collection = tables::collection_key(partition, owner)?;
        Ok(self.insert_entries(&collection, entries)?)
    }

    fn range_delete(
        &self,
        partition: &Partition,
        owner: &OwnerKey,
        bound: Timestamp,
    ) -> Result<usize> {
        let collection = tables::collection_key(partition, owner)?;
        Ok(self.range_delete_inner(&collection, bound)?)
    }

    fn scan(&self, partition: &Partition, owner: &OwnerKey) -> Result<Vec<VisitEntry>> {
        let collection = tables::collection_key(partition, owner)?;
        Ok(self.scan_inner(&collection)?)
    }

    fn size(&self, partition: &Partition, owner: &OwnerKey) -> Result<usize> {
        let collection = tables::collection_key(partition, owner)?;
        Ok(self.size_inner(&collection)?)
    }

    fn list_owners(&self, partition: &Partition) -> Result<Vec<OwnerKey>> {
        let prefix = tables::partition_prefix(partition)?;
        Ok(self.list_owners_inner(&prefix)?)
    }

    fn expire_partition(&self, partition: &Partition, cutoff: Timestamp) -> Result<ExpireReport> {
        let prefix = tables::partition_prefix(partition)?;
        Ok(self.expire_partition_inner(&prefix, cutoff)?)
    }

    fn remove_collection(&self, partition: &Partition, owner: &OwnerKey) -> Result<usize> {
        let collection = tables::collection_key(partition, owner)?;
        Ok(self.remove_collections(&[collection])?)
    }

    fn remove_partition(&self, partition: &Partition) -> Result<usize> {
        let prefix = tables::partition_prefix(partition)?;
        Ok(self.remove_partition_inner(&prefix)?)
    }
}

impl RecordStore for RedbStore {
    fn put_record(
        &self,
        partition: &Partition,
        owner: &OwnerKey,
        record: &ProfileRecord,
        expires_at: Option<Timestamp>,
    ) -> Result<()> {
        let key = tables::collection_key(partition, owner)?;
        let stored = StoredRecord {
            record: record.clone(),
            expires_at,
        };
        Ok(self.put_record_inner(&key, &stored)?)
    }

    fn get_record(&self, partition: &Partition, owner: &OwnerKey) -> Result<Option<ProfileRecord>> {
        let key = tables::collection_key(partition, owner)?;
        let now = self.clock.now();
        Ok(self
            .get_record_inner(&key)?
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.record))
    }

    fn delete_record(&self, partition: &Partition, owner: &OwnerKey) -> Result<bool> {
        let key = tables::collection_key(partition, owner)?;
        Ok(self.delete_record_inner(&key)?)
    }

    fn record_owners(&self, partition: &Partition) -> Result<Vec<OwnerKey>> {
        let prefix = tables::partition_prefix(partition)?;
        Ok(self.record_owners_inner(&prefix, self.clock.now())?)
    }
}
