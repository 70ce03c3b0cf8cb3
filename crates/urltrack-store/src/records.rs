//! Plain key-value records kept beside visit collections.

use serde::{Deserialize, Serialize};
use urltrack_common::{OwnerKey, Partition, ProfileRecord, Result, Timestamp};

/// A record plus its optional expiry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub record: ProfileRecord,
    /// Absent records never expire
    pub expires_at: Option<Timestamp>,
}

impl StoredRecord {
    /// True if the record is no longer visible at `now`
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Last-write-wins records keyed by `(partition, owner)`.
///
/// Expired records read as absent.
pub trait RecordStore: Send + Sync {
    /// Write or overwrite a record, optionally expiring at `expires_at`
    fn put_record(
        &self,
        partition: &Partition,
        owner: &OwnerKey,
        record: &ProfileRecord,
        expires_at: Option<Timestamp>,
    ) -> Result<()>;

    /// Read a record if present and unexpired
    fn get_record(&self, partition: &Partition, owner: &OwnerKey) -> Result<Option<ProfileRecord>>;

    /// Delete a record. Returns whether one existed.
    fn delete_record(&self, partition: &Partition, owner: &OwnerKey) -> Result<bool>;

    /// Owners with an unexpired record in `partition`
    fn record_owners(&self, partition: &Partition) -> Result<Vec<OwnerKey>>;
}
