//! UrlTrack Store - keyed visit collections and profile records
//!
//! This crate defines the two store capabilities the write path consumes:
//!
//! - [`CollectionStore`]: per-owner collections of visit entries keyed by
//!   expiration timestamp (insert-unique, bulk load, range delete, scan,
//!   size), in an ordered or an unordered-unique variant
//! - [`RecordStore`]: plain last-write-wins profile and summary records
//!
//! and two backends implementing both: [`MemoryStore`] (process-local, both
//! collection variants) and [`RedbStore`] (durable, ordered).

pub mod collection;
pub mod error;
pub mod memory;
pub mod records;
pub mod redb_store;
pub mod tables;

// Re-exports
pub use collection::{CollectionStore, ExpireReport};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use records::{RecordStore, StoredRecord};
pub use redb_store::RedbStore;
