//! UrlTrack Core - the visit write path
//!
//! This crate keeps a durable per-owner visit log (the base partition) and a
//! TTL-bound mirror of it (the cache partition) consistent under concurrent
//! writers:
//!
//! - [`WriteRetryPolicy`]: bounded retry of timestamp-keyed inserts on collision
//! - [`CacheCoordinator`]: population of the cache partition on miss
//! - [`ExpirationSweeper`] / [`SweeperTask`]: purging of expired entries
//! - [`ConsistencyAuditor`]: scan-count versus reported-size checks
//! - [`VisitWriter`]: the per-visit pipeline tying them together

pub mod auditor;
pub mod coordinator;
pub mod retry;
pub mod sweeper;
pub mod writer;

// Re-exports
pub use auditor::{AuditResult, ConsistencyAuditor};
pub use coordinator::{CacheCoordinator, CacheOutcome, CacheStats, CacheStatsSnapshot};
pub use retry::{WriteFailure, WriteOutcome, WriteRetryPolicy};
pub use sweeper::{ExpirationSweeper, SweepReport, SweeperState, SweeperTask};
pub use writer::{VisitError, VisitReport, VisitWriter};
