//! Error types for the fault protocol.
//!
//! Protocol-level rejections of inbound votes are not errors; see
//! [`crate::message::Rejection`]. These variants cover startup validation
//! and wire decoding only.

use thiserror::Error;

/// Fault protocol errors.
#[derive(Error, Debug)]
pub enum Error {
    /// A strategy value other than `local` or `quorum`.
    #[error("invalid removal strategy: {0} (expected \"local\" or \"quorum\")")]
    InvalidStrategy(String),

    /// A fault reason name that is not recognised.
    #[error("unknown fault reason: {0}")]
    UnknownReason(String),

    /// A cluster that cannot form any quorum.
    #[error("invalid cluster size: {0} (must be >= 1)")]
    InvalidClusterSize(usize),

    /// Wire message could not be encoded or decoded.
    #[error("BackupInstanceFaulty codec error: {0}")]
    Codec(#[from] postcard::Error),
}

/// Result type for fault protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
