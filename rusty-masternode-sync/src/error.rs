//! Error types for masternode sync.

use thiserror::Error;

use crate::masternode_sync::SyncPhase;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The state machine was asked to advance from a phase that has no
    /// successor. Never happens in correct operation.
    #[error("Can't switch to next asset from {0:?}, should use reset() first")]
    InvalidTransition(SyncPhase),

    #[error("Invalid sync configuration: {0}")]
    Config(String),

    #[error("Configuration store error: {0}")]
    ConfigStore(#[from] confy::ConfyError),

    #[error("Message decoding error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for SyncError {
    fn from(err: bincode::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}

/// A specialized `Result` type for sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;
