//! UrlTrack Common - Shared types and utilities
//!
//! This crate provides the visit data model, the error taxonomy, the
//! configuration tree and the clocks used across all UrlTrack components.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
