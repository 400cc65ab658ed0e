//! Storage uniquing engine.
//!
//! - `class_id`: stable identity for a family of storage types
//! - `storage`: the contract a uniqued storage type implements
//! - `memory`: bump arena, allocator handed to constructors, compact maps, stats
//! - `uniquer`: the sharded get-or-create / erase registry
//! - `config`: tuning knobs for the registry

pub mod class_id;
pub mod config;
pub mod error;
pub mod memory;
pub mod storage;
pub mod uniquer;

pub use class_id::*;
pub use config::*;
pub use error::*;
pub use memory::{ClassStats, CompactHashMap, StatsSnapshot, StorageAllocator, StorageStats};
pub use storage::*;
pub use uniquer::*;
