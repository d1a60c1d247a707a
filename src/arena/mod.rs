//! Buddy arena module
//!
//! This module provides the complete buddy system over one owned arena:
//! - In-band block headers with magic tags
//! - Circular, address-sorted free list threaded through header offsets
//! - Split/coalesce with buddy arithmetic
//! - Read-only introspection and statistics

pub mod buddy_arena;
mod free_list;
pub mod header;
pub mod stats;

pub use buddy_arena::{Blocks, BuddyArena, FreeBlocks};
pub use header::{BlockInfo, BlockTag, HEADER_SIZE};
#[cfg(feature = "tracking")]
pub use stats::ArenaCounters;
pub use stats::ArenaStats;
