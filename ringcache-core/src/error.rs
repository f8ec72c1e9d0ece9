//! Error types for the sans-IO core.

use thiserror::Error;

/// Outcome of a [`crate::cache::Cache::set`] call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// `len(key) + len(value)` exceeds the configured `MAX_SIZE`.
    #[error("entry too big for cache")]
    TooBig,
}

/// Failure to parse a wire-format frame sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer frames than the op requires.
    #[error("malformed message: {0}")]
    Malformed(String),
    /// Recognized version, but `op` does not name a known operation.
    #[error("unknown operation: {0}")]
    UnknownOp(String),
    /// The frame version byte did not match the version this node speaks.
    #[error("unsupported protocol version: {0}")]
    VersionMismatch(String),
    /// A frame that should be UTF-8 was not.
    #[error("invalid utf-8 in frame")]
    InvalidUtf8,
    /// A timestamp frame did not parse as `Y:M:D:H:M:S`.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
