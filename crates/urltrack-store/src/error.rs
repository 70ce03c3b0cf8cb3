//! Backend error type for store operations

/// Error type for backend store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

fn io_failure(e: &std::io::Error) -> urltrack_common::Error {
    if e.kind() == std::io::ErrorKind::TimedOut {
        urltrack_common::Error::Timeout
    } else {
        urltrack_common::Error::Unavailable(e.to_string())
    }
}

impl From<StoreError> for urltrack_common::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Bincode(e) => Self::Serialization(e.to_string()),
            StoreError::Io(e) | StoreError::Storage(redb::StorageError::Io(e)) => io_failure(&e),
            StoreError::Redb(redb::DatabaseError::DatabaseAlreadyOpen) => {
                Self::Unavailable("database is open in another process".into())
            }
            other => Self::Store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use urltrack_common::Error;

    #[test]
    fn test_io_errors_map_to_store_failures() {
        let slow = io::Error::new(io::ErrorKind::TimedOut, "slow");
        let timeout: Error = StoreError::Io(slow).into();
        assert!(matches!(timeout, Error::Timeout));

        let storage = StoreError::Storage(redb::StorageError::Io(io::Error::other("disk gone")));
        let unavailable: Error = storage.into();
        assert!(matches!(unavailable, Error::Unavailable(_)));
        assert!(unavailable.is_store_failure());

        let locked: Error = StoreError::Redb(redb::DatabaseError::DatabaseAlreadyOpen).into();
        assert!(matches!(locked, Error::Unavailable(_)));
    }

    #[test]
    fn test_decode_errors_map_to_serialization() {
        let bad = bincode::deserialize::<String>(&[0xff]).unwrap_err();
        let err: Error = StoreError::Bincode(bad).into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(!err.is_store_failure());
    }
}
