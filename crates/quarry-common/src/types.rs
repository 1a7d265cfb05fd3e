//! Core type definitions for Quarry
//!
//! This module defines the fundamental types used throughout the system
//! including identifiers and shard metadata structures.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Unique identifier for a shard of table data
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Into)]
pub struct ShardId(Uuid);

impl ShardId {
    /// Generate a new random shard ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ShardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShardId({})", self.0)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a storage node
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Generate a new random node ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a remote task producing exchange data
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct TaskId(String);

impl TaskId {
    /// Create a new task ID
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the task ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

/// Authoritative description of a shard, as recorded in the catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMetadata {
    /// Shard identifier
    pub shard_id: ShardId,
    /// Expected byte length of the shard file
    pub size_bytes: u64,
    /// Expected xxHash64 of the shard file, when the catalog recorded one
    pub xxhash64: Option<u64>,
}

impl ShardMetadata {
    /// Create new shard metadata
    #[must_use]
    pub const fn new(shard_id: ShardId, size_bytes: u64, xxhash64: Option<u64>) -> Self {
        Self {
            shard_id,
            size_bytes,
            xxhash64,
        }
    }
}

/// One unit of recovery work: a shard that should exist locally but
/// does not (or exists with the wrong content).
///
/// Equality and hashing consider only `(shard_id, active)`. Two requests
/// for the same shard at the same priority collapse to one queue entry,
/// while a background request and an active request for the same shard
/// stay distinct.
#[derive(Clone, Copy, Debug)]
pub struct MissingShard {
    /// Shard identifier
    pub shard_id: ShardId,
    /// Expected byte length of the shard file
    pub size_bytes: u64,
    /// Expected xxHash64 of the shard file, when known
    pub xxhash64: Option<u64>,
    /// Active recoveries are serviced before background ones
    pub active: bool,
}

impl MissingShard {
    /// Create a background-priority recovery request
    #[must_use]
    pub const fn background(metadata: ShardMetadata) -> Self {
        Self {
            shard_id: metadata.shard_id,
            size_bytes: metadata.size_bytes,
            xxhash64: metadata.xxhash64,
            active: false,
        }
    }

    /// Create an active-priority recovery request
    #[must_use]
    pub const fn active(metadata: ShardMetadata) -> Self {
        Self {
            shard_id: metadata.shard_id,
            size_bytes: metadata.size_bytes,
            xxhash64: metadata.xxhash64,
            active: true,
        }
    }

    /// Catalog metadata carried by this request
    #[must_use]
    pub const fn metadata(&self) -> ShardMetadata {
        ShardMetadata::new(self.shard_id, self.size_bytes, self.xxhash64)
    }
}

impl PartialEq for MissingShard {
    fn eq(&self, other: &Self) -> bool {
        self.shard_id == other.shard_id && self.active == other.active
    }
}

impl Eq for MissingShard {}

impl Hash for MissingShard {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shard_id.hash(state);
        self.active.hash(state);
    }
}
