// src/utils/errors.rs
//! Error types for the governor subsystem
//!
//! Most failures in this crate are absorbed rather than surfaced: browser
//! handles failing to close, cache files failing to read or write, and
//! snapshot writes are logged and swallowed so they never break the
//! operation they accompany. `GovernorError` covers the remaining paths
//! that callers genuinely need to handle.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, GovernorError>;

/// Errors surfaced by the governor components
#[derive(Debug, Error)]
pub enum GovernorError {
    /// A configuration value failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The resource factory failed to construct a handle
    #[error("failed to create {kind} handle: {reason}")]
    HandleCreationFailed { kind: &'static str, reason: String },

    /// The resource factory failed to close a handle
    #[error("failed to close {kind} handle: {reason}")]
    HandleCloseFailed { kind: &'static str, reason: String },

    /// The pool was shut down while the call was in flight
    #[error("resource pool is shut down")]
    PoolShutdown,

    /// Cache backing storage could not be initialized
    #[error("cache storage failed: {0}")]
    CacheStorageFailed(String),
}
