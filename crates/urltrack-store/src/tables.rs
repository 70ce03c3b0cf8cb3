//! Redb table definitions and composite key layout.
//!
//! Keys are NUL-separated so that one partition, or one owner's collection,
//! occupies a contiguous key range: `"{namespace}\0{group}\0{owner}"` names a
//! collection and `"{collection}\0{key:016x}"` names one entry in it. The
//! fixed-width hex suffix makes lexicographic order equal to key order.

use redb::TableDefinition;
use urltrack_common::{Error, OwnerKey, Partition, Result, Timestamp};

// Key: "{collection}\0{key:016x}", Value: bincode-encoded VisitEntry
pub const VISIT_ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("visit_entries");
// Key: "{collection}", Value: store-reported entry count
pub const COLLECTION_SIZES: TableDefinition<&str, u64> = TableDefinition::new("collection_sizes");
// Key: "{collection}", Value: bincode-encoded StoredRecord
pub const PROFILE_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("profile_records");

fn check_segment(what: &str, value: &str) -> Result<()> {
    if value.contains('\0') {
        return Err(Error::invalid_argument(format!(
            "{what} must not contain NUL: {value:?}"
        )));
    }
    Ok(())
}

/// Key prefix shared by every collection in `partition`
pub fn partition_prefix(partition: &Partition) -> Result<String> {
    check_segment("namespace", partition.namespace())?;
    check_segment("group", partition.group())?;
    Ok(format!("{}\0{}\0", partition.namespace(), partition.group()))
}

/// Key naming one owner's collection
pub fn collection_key(partition: &Partition, owner: &OwnerKey) -> Result<String> {
    check_segment("owner", owner.as_str())?;
    Ok(format!("{}{}", partition_prefix(partition)?, owner.as_str()))
}

/// Key naming one entry in a collection
pub fn entry_key(collection: &str, key: Timestamp) -> String {
    format!("{collection}\0{:016x}", key.as_nanos())
}

/// Half-open key range covering every entry of a collection
pub fn entry_range(collection: &str) -> (String, String) {
    (format!("{collection}\0"), format!("{collection}\u{1}"))
}

/// Exclusive upper bound for keys starting with `prefix`, which must end in NUL.
/// Only the final separator is replaced, so an empty group keeps its own range.
pub fn prefix_end(prefix: &str) -> String {
    let mut end = prefix.strip_suffix('\0').unwrap_or(prefix).to_string();
    end.push('\u{1}');
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_keys_sort_by_timestamp() {
        let c = collection_key(&Partition::new("base", "c"), &OwnerKey::new("u")).unwrap();
        let a = entry_key(&c, Timestamp::from_nanos(0xff));
        let b = entry_key(&c, Timestamp::from_nanos(0x100));
        assert!(a < b);

        let (lo, hi) = entry_range(&c);
        assert!(lo.as_str() <= a.as_str() && b.as_str() < hi.as_str());
    }

    #[test]
    fn test_owner_prefix_does_not_leak() {
        let p = Partition::new("base", "c");
        let short = collection_key(&p, &OwnerKey::new("u1")).unwrap();
        let long = collection_key(&p, &OwnerKey::new("u10")).unwrap();
        let (lo, hi) = entry_range(&short);
        let foreign = entry_key(&long, Timestamp::ZERO);
        assert!(!(lo.as_str() <= foreign.as_str() && foreign.as_str() < hi.as_str()));
    }

    #[test]
    fn test_nul_rejected() {
        let p = Partition::new("base", "c");
        assert!(collection_key(&p, &OwnerKey::new("a\0b")).is_err());
        assert!(partition_prefix(&Partition::new("ba\0se", "c")).is_err());
    }

    #[test]
    fn test_prefix_end() {
        let prefix = partition_prefix(&Partition::new("base", "c")).unwrap();
        assert_eq!(prefix_end(&prefix), "base\0c\u{1}");
    }

    #[test]
    fn test_empty_group_range_excludes_other_groups() {
        let empty = partition_prefix(&Partition::new("base", "")).unwrap();
        let end = prefix_end(&empty);
        assert_eq!(end, "base\0\u{1}");

        let other_partition = Partition::new("base", "CustID(1)");
        let other = collection_key(&other_partition, &OwnerKey::new("u")).unwrap();
        let foreign = entry_key(&other, Timestamp::ZERO);
        assert!(!(empty.as_str() <= foreign.as_str() && foreign.as_str() < end.as_str()));
    }
}
