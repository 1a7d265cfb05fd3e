//! Error types for Quarry
//!
//! This module defines the common error types used throughout the system.

use crate::types::ShardId;
use thiserror::Error;

/// Common result type for Quarry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Quarry
#[derive(Debug, Error)]
pub enum Error {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected:016x}, got {actual:016x}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    // Merge errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("exchange transport error: {0}")]
    Transport(String),

    #[error("page serialization error: {0}")]
    Serialization(String),

    #[error("page deserialization error: {0}")]
    Deserialization(String),

    // Recovery errors
    #[error("shard not found in catalog: {shard_id}")]
    ShardUnknown { shard_id: ShardId },

    #[error("no backup copy exists for shard {shard_id}")]
    BackupNotFound { shard_id: ShardId },

    #[error("restored shard {shard_id} failed integrity verification")]
    BackupCorruption { shard_id: ShardId },

    #[error("recovery error: {0}")]
    Recovery(String),

    // Catalog errors
    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new recovery error
    pub fn recovery(msg: impl Into<String>) -> Self {
        Self::Recovery(msg.into())
    }

    /// Create a new catalog error
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ShardUnknown { .. } | Self::BackupNotFound { .. }
        )
    }

    /// Check if this error indicates corrupted data
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::BackupCorruption { .. } | Self::ChecksumMismatch { .. }
        )
    }
}
