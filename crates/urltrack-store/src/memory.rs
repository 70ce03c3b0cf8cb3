//! Process-local store providing both collection variants.

use crate::collection::{CollectionStore, ExpireReport, collision};
use crate::records::{RecordStore, StoredRecord};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use urltrack_common::config::CollectionKind;
use urltrack_common::{Clock, OwnerKey, Partition, ProfileRecord, Result, Timestamp, VisitEntry};

enum Entries {
    Ordered(BTreeMap<Timestamp, VisitEntry>),
    Unordered(HashMap<Timestamp, VisitEntry>),
}

/// One owner's collection plus its reported size
struct Collection {
    entries: Entries,
    reported_size: usize,
}

impl Collection {
    fn new(kind: CollectionKind) -> Self {
        let entries = match kind {
            CollectionKind::Ordered => Entries::Ordered(BTreeMap::new()),
            CollectionKind::Unordered => Entries::Unordered(HashMap::new()),
        };
        Self {
            entries,
            reported_size: 0,
        }
    }

    /// Insert without touching the reported size. Returns false on collision.
    fn put(&mut self, entry: VisitEntry) -> bool {
        let key = entry.key();
        match &mut self.entries {
            Entries::Ordered(map) => {
                if map.contains_key(&key) {
                    return false;
                }
                map.insert(key, entry);
            }
            Entries::Unordered(map) => {
                if map.contains_key(&key) {
                    return false;
                }
                map.insert(key, entry);
            }
        }
        true
    }

    fn insert(&mut self, entry: VisitEntry) -> bool {
        let inserted = self.put(entry);
        if inserted {
            self.reported_size += 1;
        }
        inserted
    }

    fn remove_below(&mut self, bound: Timestamp) -> usize {
        let removed = match &mut self.entries {
            Entries::Ordered(map) => {
                let kept = map.split_off(&bound);
                let removed = map.len();
                *map = kept;
                removed
            }
            Entries::Unordered(map) => {
                let before = map.len();
                map.retain(|key, _| *key >= bound);
                before - map.len()
            }
        };
        self.reported_size = self.reported_size.saturating_sub(removed);
        removed
    }

    fn len(&self) -> usize {
        match &self.entries {
            Entries::Ordered(map) => map.len(),
            Entries::Unordered(map) => map.len(),
        }
    }

    fn entries(&self) -> Vec<VisitEntry> {
        match &self.entries {
            Entries::Ordered(map) => map.values().cloned().collect(),
            Entries::Unordered(map) => map.values().cloned().collect(),
        }
    }
}

type Collections = HashMap<Partition, BTreeMap<OwnerKey, Collection>>;
type Records = HashMap<Partition, BTreeMap<OwnerKey, StoredRecord>>;

/// In-memory collection and record store.
///
/// Each operation takes the store lock once, so every single-collection
/// operation and every partition sweep is atomic.
pub struct MemoryStore {
    kind: CollectionKind,
    clock: Arc<dyn Clock>,
    collections: RwLock<Collections>,
    records: RwLock<Records>,
}

impl MemoryStore {
    /// Create an empty store of the given collection variant
    #[must_use]
    pub fn new(kind: CollectionKind, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            clock,
            collections: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Add an entry without counting it in the reported size.
    ///
    /// Simulates the store-side divergence the consistency auditor exists
    /// to detect. Returns false if the key was already present.
    pub fn inject_unaccounted(
        &self,
        partition: &Partition,
        owner: &OwnerKey,
        entry: VisitEntry,
    ) -> bool {
        let mut collections = self.collections.write();
        collections
            .entry(partition.clone())
            .or_default()
            .entry(owner.clone())
            .or_insert_with(|| Collection::new(self.kind))
            .put(entry)
    }
}

impl CollectionStore for MemoryStore {
    fn kind(&self) -> CollectionKind {
        self.kind
    }

    fn insert_unique(
        &self,
        partition: &Partition,
        owner: &OwnerKey,
        entry: &VisitEntry,
    ) -> Result<()> {
        let mut collections = self.collections.write();
        let collection = collections
            .entry(partition.clone())
            .or_default()
            .entry(owner.clone())
            .or_insert_with(|| Collection::new(self.kind));
        if collection.insert(entry.clone()) {
            Ok(())
        } else {
            Err(collision(partition, owner, entry))
        }
    }

    fn bulk_load(
        &self,
        partition: &Partition,
        owner: &OwnerKey,
        entries: &[VisitEntry],
    ) -> Result<usize> {
        let mut collections = self.collections.write();
        let collection = collections
            .entry(partition.clone())
            .or_default()
            .entry(owner.clone())
            .or_insert_with(|| Collection::new(self.kind));
        Ok(entries
            .iter()
            .filter(|entry| collection.insert((*entry).clone()))
            .count())
    }

    fn range_delete(
        &self,
        partition: &Partition,
        owner: &OwnerKey,
        bound: Timestamp,
    ) -> Result<usize> {
        let mut collections = self.collections.write();
        Ok(collections
            .get_mut(partition)
            .and_then(|owners| owners.get_mut(owner))
            .map_or(0, |collection| collection.remove_below(bound)))
    }

    fn scan(&self, partition: &Partition, owner: &OwnerKey) -> Result<Vec<VisitEntry>> {
        let collections = self.collections.read();
        Ok(collections
            .get(partition)
            .and_then(|owners| owners.get(owner))
            .map(Collection::entries)
            .unwrap_or_default())
    }

    fn size(&self, partition: &Partition, owner: &OwnerKey) -> Result<usize> {
        let collections = self.collections.read();
        Ok(collections
            .get(partition)
            .and_then(|owners| owners.get(owner))
            .map_or(0, |collection| collection.reported_size))
    }

    fn list_owners(&self, partition: &Partition) -> Result<Vec<OwnerKey>> {
        let collections = self.collections.read();
        Ok(collections
            .get(partition)
            .map(|owners| owners.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn expire_partition(&self, partition: &Partition, cutoff: Timestamp) -> Result<ExpireReport> {
        let mut collections = self.collections.write();
        let mut report = ExpireReport::default();
        if let Some(owners) = collections.get_mut(partition) {
            for collection in owners.values_mut() {
                report.owners += 1;
                report.removed += collection.remove_below(cutoff);
            }
        }
        Ok(report)
    }

    fn remove_collection(&self, partition: &Partition, owner: &OwnerKey) -> Result<usize> {
        let mut collections = self.collections.write();
        Ok(collections
            .get_mut(partition)
            .and_then(|owners| owners.remove(owner))
            .map_or(0, |collection| collection.len()))
    }

    fn remove_partition(&self, partition: &Partition) -> Result<usize> {
        let mut collections = self.collections.write();
        Ok(collections
            .remove(partition)
            .map_or(0, |owners| owners.values().map(Collection::len).sum()))
    }
}

impl RecordStore for MemoryStore {
    fn put_record(
        &self,
        partition: &Partition,
        owner: &OwnerKey,
        record: &ProfileRecord,
        expires_at: Option<Timestamp>,
    ) -> Result<()> {
        self.records.write().entry(partition.clone()).or_default().insert(
            owner.clone(),
            StoredRecord {
                record: record.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    fn get_record(&self, partition: &Partition, owner: &OwnerKey) -> Result<Option<ProfileRecord>> {
        let now = self.clock.now();
        let records = self.records.read();
        Ok(records
            .get(partition)
            .and_then(|owners| owners.get(owner))
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.record.clone()))
    }

    fn delete_record(&self, partition: &Partition, owner: &OwnerKey) -> Result<bool> {
        let mut records = self.records.write();
        Ok(records
            .get_mut(partition)
            .and_then(|owners| owners.remove(owner))
            .is_some())
    }

    fn record_owners(&self, partition: &Partition) -> Result<Vec<OwnerKey>> {
        let now = self.clock.now();
        let records = self.records.read();
        Ok(records
            .get(partition)
            .map(|owners| {
                owners
                    .iter()
                    .filter(|(_, stored)| !stored.is_expired(now))
                    .map(|(owner, _)| owner.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
