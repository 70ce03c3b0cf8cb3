//! Error types for UrlTrack
//!
//! This module defines the common error taxonomy used throughout the system.
//! Collisions are the only failure the write layer retries; everything else
//! surfaces to the caller, which logs it and moves on to the next owner or
//! sweep cycle.

use crate::types::{OwnerKey, Partition, Timestamp};
use thiserror::Error;

/// Common result type for UrlTrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for UrlTrack
#[derive(Debug, Error)]
pub enum Error {
    // Write-path errors
    #[error("key collision in {partition} for {owner}: {key}")]
    Collision {
        partition: Partition,
        owner: OwnerKey,
        key: Timestamp,
    },

    // Store errors
    #[error("store error: {0}")]
    Store(String),

    /// Store I/O that timed out
    #[error("request timeout")]
    Timeout,

    /// Store I/O failure or a database held by another process
    #[error("store unavailable: {0}")]
    Unavailable(String),

    // Cache errors
    #[error("cache reload failed for {owner} in {partition}: {reason}")]
    ReloadFailure {
        partition: Partition,
        owner: OwnerKey,
        reason: String,
    },

    // Audit signal
    #[error("consistency mismatch for {owner} in {partition}: scanned {scanned}, reported {reported}")]
    ConsistencyMismatch {
        partition: Partition,
        owner: OwnerKey,
        scanned: usize,
        reported: usize,
    },

    // Caller errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a key collision (benign, retryable)
    #[must_use]
    pub const fn is_collision(&self) -> bool {
        matches!(self, Self::Collision { .. })
    }

    /// Check if this is a store-level failure (network, timeout, backend)
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Timeout | Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_collision() {
        let err = Error::Collision {
            partition: Partition::new("base", "c"),
            owner: OwnerKey::new("u"),
            key: Timestamp::from_nanos(5),
        };
        assert!(err.is_collision());
        assert!(!err.is_store_failure());
        assert_eq!(err.to_string(), "key collision in base/c for u: 5");
    }

    #[test]
    fn test_error_store_failure() {
        assert!(Error::Timeout.is_store_failure());
        assert!(Error::store("disk").is_store_failure());
        assert!(Error::Unavailable("down".into()).is_store_failure());
        assert!(!Error::invalid_argument("x").is_store_failure());
        assert!(!Error::Timeout.is_collision());
    }
}
