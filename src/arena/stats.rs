//! Statistics and failure reporting for the buddy arena
//!
//! Summaries are computed on demand by walking the arena; nothing here
//! mutates allocator state.

#[cfg(feature = "log")]
use log::error;

use crate::AllocResult;

use super::buddy_arena::BuddyArena;
use super::header::BlockTag;

/// Arena summary produced by one address-order walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub total_bytes: u32,
    pub free_bytes: u32,
    pub used_bytes: u32,
    pub free_blocks: usize,
    pub allocated_blocks: usize,
    pub largest_free_block: u32,
}

impl ArenaStats {
    pub(crate) fn collect(arena: &BuddyArena) -> AllocResult<Self> {
        let mut stats = ArenaStats {
            total_bytes: arena.size(),
            free_bytes: 0,
            used_bytes: 0,
            free_blocks: 0,
            allocated_blocks: 0,
            largest_free_block: 0,
        };

        for block in arena.blocks() {
            let (_, info) = block?;
            match info.tag {
                BlockTag::Free => {
                    stats.free_blocks += 1;
                    stats.free_bytes += info.size;
                    stats.largest_free_block = stats.largest_free_block.max(info.size);
                }
                BlockTag::Allocated => {
                    stats.allocated_blocks += 1;
                    stats.used_bytes += info.size;
                }
            }
        }

        Ok(stats)
    }
}

/// Cumulative operation counters.
#[cfg(feature = "tracking")]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArenaCounters {
    pub total_allocations: usize,
    pub total_deallocations: usize,
    pub failed_allocations: usize,
}

/// Log the free-block table when an allocation cannot be satisfied.
#[allow(unused_variables)]
pub(crate) fn log_alloc_failure(arena: &BuddyArena, requested: u32) {
    error!(
        "buddy arena: allocation failure: {} bytes requested, arena size {}",
        requested,
        arena.size()
    );
    for (_offset, _info) in arena.free_blocks() {
        error!("  free block at {:#x}: {} bytes", _offset, _info.size);
    }
}
