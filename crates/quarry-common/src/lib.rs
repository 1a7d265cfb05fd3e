//! Quarry Common - Shared types and utilities
//!
//! This crate provides common types, error definitions, and utilities
//! used across all Quarry components.

pub mod checksum;
pub mod config;
pub mod error;
pub mod types;

pub use config::{MergeConfig, RecoveryConfig};
pub use error::{Error, Result};
pub use types::*;
