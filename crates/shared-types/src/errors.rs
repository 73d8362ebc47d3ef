//! # Error Types
//!
//! Errors shared across crates.

use thiserror::Error;

/// The station that owned an inbox is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Station inbox closed")]
pub struct InboxClosed;
