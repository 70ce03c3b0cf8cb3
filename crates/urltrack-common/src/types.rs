//! Core type definitions for UrlTrack
//!
//! This module defines the visit data model: owner and partition
//! identifiers, the timestamp that doubles as the collection key, the
//! immutable visit entry and the profile records kept beside collections.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Nanosecond timestamp.
///
/// A visit entry's expiration timestamp is also its collection key, so
/// ordering on `Timestamp` is ordering on the collection.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Display,
)]
#[display("{_0}")]
pub struct Timestamp(u64);

impl Timestamp {
    /// The earliest representable timestamp
    pub const ZERO: Self = Self(0);
    /// The latest representable timestamp
    pub const MAX: Self = Self(u64::MAX);

    /// Create from raw nanoseconds
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Raw nanoseconds
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Add a duration, clamping at `Timestamp::MAX`
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Subtract a duration, clamping at `Timestamp::ZERO`
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_sub(nanos))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Identity of the owner of a visit collection (one user)
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Display)]
#[display("{_0}")]
pub struct OwnerKey(String);

impl OwnerKey {
    /// Create a new owner key
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the owner key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Debug for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerKey({:?})", self.0)
    }
}

/// Which side of the base/cache split a partition belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Durable, primary visit data
    #[display("base")]
    Base,
    /// Short-lived, TTL-bound mirror of recent visit data
    #[display("cache")]
    Cache,
}

/// A named namespace plus owner group (one customer).
///
/// The same customer has one base partition and one cache partition; they
/// differ only in namespace.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{namespace}/{group}")]
pub struct Partition {
    namespace: String,
    group: String,
}

impl Partition {
    /// Create a partition identifier
    #[must_use]
    pub fn new(namespace: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
        }
    }

    /// Namespace name (e.g. "base" or "cache")
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Owner group (customer identifier)
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Partition({}/{})", self.namespace, self.group)
    }
}

/// One recorded site visit.
///
/// Immutable once written. `expire_at` is the collection key in every
/// store variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitEntry {
    /// Owner of the collection this entry belongs to
    pub owner: OwnerKey,
    /// Visited URL
    pub url: String,
    /// Referrer URL
    pub referrer: String,
    /// Title of the visited page
    pub page_title: String,
    /// When the visit was recorded
    pub created_at: Timestamp,
    /// `created_at + ttl`; the collection key
    pub expire_at: Timestamp,
    /// Writer-assigned sequence number
    pub ordinal: u64,
}

impl VisitEntry {
    /// The collection key of this entry
    #[must_use]
    pub const fn key(&self) -> Timestamp {
        self.expire_at
    }

    /// True if a sweep with the given cutoff removes this entry
    #[must_use]
    pub fn is_expired(&self, cutoff: Timestamp) -> bool {
        self.expire_at < cutoff
    }

    /// True if both entries describe the same visit, ignoring ordinal
    #[must_use]
    pub fn same_visit(&self, other: &Self) -> bool {
        self.url == other.url
            && self.referrer == other.referrer
            && self.page_title == other.page_title
            && self.created_at == other.created_at
    }
}

/// Everything about a visit except its timestamps.
///
/// Writers keep the template and stamp a fresh [`VisitEntry`] for every
/// insert attempt, so a retried write never reuses a colliding key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitTemplate {
    pub owner: OwnerKey,
    pub url: String,
    pub referrer: String,
    pub page_title: String,
    pub ordinal: u64,
    /// Lifetime of the entry in the base partition
    pub ttl: Duration,
}

impl VisitTemplate {
    /// Template with synthetic page data derived from `seed`
    #[must_use]
    pub fn generated(owner: OwnerKey, seed: u64, ttl: Duration) -> Self {
        Self {
            owner,
            url: format!("url({seed})"),
            referrer: format!("Referrer({seed})"),
            page_title: format!("PageTitle({seed})"),
            ordinal: seed,
            ttl,
        }
    }

    /// Stamp an entry created at `now`
    #[must_use]
    pub fn build(&self, now: Timestamp) -> VisitEntry {
        VisitEntry {
            owner: self.owner.clone(),
            url: self.url.clone(),
            referrer: self.referrer.clone(),
            page_title: self.page_title.clone(),
            created_at: now,
            expire_at: now.saturating_add(self.ttl),
            ordinal: self.ordinal,
        }
    }
}

/// Customer (owner group) profile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer_id: String,
    pub name: String,
    pub contact: String,
    pub index: u64,
}

impl CustomerProfile {
    /// Synthetic customer derived from `seed`
    #[must_use]
    pub fn generated(seed: u64) -> Self {
        Self {
            customer_id: Self::id_for(seed),
            name: format!("CustName({seed})"),
            contact: format!("Contact({seed})"),
            index: seed,
        }
    }

    /// Customer identifier for a seed; also the partition group name
    #[must_use]
    pub fn id_for(seed: u64) -> String {
        format!("CustID({seed})")
    }
}

/// User profile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: OwnerKey,
    pub customer_id: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub company: String,
    pub index: u64,
}

impl UserProfile {
    /// Synthetic user of `customer_id` derived from `seed`
    #[must_use]
    pub fn generated(customer_id: impl Into<String>, seed: u64) -> Self {
        Self {
            user_id: Self::id_for(seed),
            customer_id: customer_id.into(),
            email: format!("Email({seed})"),
            phone: format!("Phone({seed:08})"),
            address: format!("Address({seed})"),
            company: format!("Company({seed})"),
            index: seed,
        }
    }

    /// Owner key for a seed
    #[must_use]
    pub fn id_for(seed: u64) -> OwnerKey {
        OwnerKey::new(format!("UserName({seed})"))
    }
}

/// Marker written into a cache partition when an owner's collection has
/// been (or is being) populated there.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSummary {
    pub owner: OwnerKey,
    pub cached_at: Timestamp,
}

/// A plain key-value record stored beside an owner's collection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileRecord {
    Customer(CustomerProfile),
    User(UserProfile),
    CacheSummary(CacheSummary),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_saturating() {
        let t = Timestamp::from_nanos(u64::MAX - 5);
        assert_eq!(t.saturating_add(Duration::from_secs(1)), Timestamp::MAX);
        assert_eq!(
            Timestamp::from_nanos(3).saturating_sub(Duration::from_nanos(10)),
            Timestamp::ZERO
        );
        assert_eq!(
            Timestamp::from_nanos(10).saturating_add(Duration::from_nanos(5)),
            Timestamp::from_nanos(15)
        );
    }

    #[test]
    fn test_template_build_derives_key_from_ttl() {
        let template = VisitTemplate::generated(
            OwnerKey::new("UserName(1)"),
            7,
            Duration::from_nanos(100),
        );
        let entry = template.build(Timestamp::from_nanos(1_000));
        assert_eq!(entry.created_at, Timestamp::from_nanos(1_000));
        assert_eq!(entry.key(), Timestamp::from_nanos(1_100));
        assert_eq!(entry.url, "url(7)");
        assert_eq!(entry.ordinal, 7);

        let again = template.build(Timestamp::from_nanos(1_001));
        assert_ne!(entry.key(), again.key());
        assert!(!entry.same_visit(&again));
    }

    #[test]
    fn test_expiry_is_exclusive_of_cutoff() {
        let template =
            VisitTemplate::generated(OwnerKey::new("u"), 1, Duration::from_nanos(10));
        let entry = template.build(Timestamp::from_nanos(90));
        assert!(!entry.is_expired(Timestamp::from_nanos(100)));
        assert!(entry.is_expired(Timestamp::from_nanos(101)));
    }

    #[test]
    fn test_partition_display() {
        let p = Partition::new("cache", CustomerProfile::id_for(3));
        assert_eq!(p.to_string(), "cache/CustID(3)");
        assert_eq!(p.namespace(), "cache");
        assert_eq!(p.group(), "CustID(3)");
    }

    #[test]
    fn test_generated_profiles() {
        let user = UserProfile::generated("CustID(2)", 42);
        assert_eq!(user.user_id.as_str(), "UserName(42)");
        assert_eq!(user.phone, "Phone(00000042)");
        assert_eq!(CustomerProfile::generated(2).customer_id, "CustID(2)");
    }
}
