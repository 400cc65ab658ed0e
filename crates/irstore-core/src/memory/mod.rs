//! Memory subsystem for uniqued storage.
//!
//! Components:
//! - `arena`: bump arena owned by a uniquer shard, and the allocator lent to
//!   storage constructors
//! - `compact_map`: HashMap alternative using hashbrown + Fx hasher
//! - `stats`: per-class creation/erase/byte counters

pub mod arena;
pub mod compact_map;
pub mod stats;

pub use arena::*;
pub use compact_map::*;
pub use stats::*;
