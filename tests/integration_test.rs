//! Integration tests for the buddy arena allocator
//!
//! Exercises the complete allocator through the public surface,
//! focusing on cross-module scenarios: allocation patterns, coalescing,
//! conservation, and the introspection walk.

#![no_std]

extern crate alloc;
extern crate buddy_arena_allocator;

use alloc::vec::Vec;
use buddy_arena_allocator::{
    AllocError, BlockTag, BuddyArena, GlobalArena, HEADER_SIZE, MIN_ARENA_SIZE,
};

#[test]
fn test_arena_size_rounding() {
    assert_eq!(BuddyArena::new(0).size(), MIN_ARENA_SIZE);
    assert_eq!(BuddyArena::new(MIN_ARENA_SIZE).size(), MIN_ARENA_SIZE);
    assert_eq!(BuddyArena::new(MIN_ARENA_SIZE + 1).size(), MIN_ARENA_SIZE * 2);
    assert_eq!(BuddyArena::new(1 << 20).size(), 1 << 20);
    assert_eq!(BuddyArena::new((1 << 20) + 3).size(), 1 << 21);
}

#[test]
fn test_live_allocations_do_not_overlap() {
    let mut arena = BuddyArena::new(8192);
    let mut live: Vec<(u32, u32)> = Vec::new();

    for n in [24u32, 100, 7, 300, 48, 1000, 12, 60] {
        let payload = arena.allocate(n).unwrap();
        let block = arena.block_at(payload - HEADER_SIZE).unwrap();
        live.push((payload - HEADER_SIZE, block.size));
    }

    for (i, &(start_a, size_a)) in live.iter().enumerate() {
        for &(start_b, size_b) in live.iter().skip(i + 1) {
            let disjoint = start_a + size_a <= start_b || start_b + size_b <= start_a;
            assert!(
                disjoint,
                "blocks at {:#x} and {:#x} overlap",
                start_a, start_b
            );
        }
    }

    arena.verify().unwrap();
}

#[test]
fn test_conservation_after_every_operation() {
    let mut arena = BuddyArena::new(4096);
    let mut live = Vec::new();

    for round in 0..4u32 {
        for n in [16u32, 90, 250, 33] {
            if let Ok(payload) = arena.allocate(n + round) {
                live.push(payload);
            }
            let stats = arena.stats().unwrap();
            assert_eq!(stats.free_bytes + stats.used_bytes, stats.total_bytes);
            arena.verify().unwrap();
        }

        while let Some(payload) = live.pop() {
            arena.free(payload).unwrap();
            let stats = arena.stats().unwrap();
            assert_eq!(stats.free_bytes + stats.used_bytes, stats.total_bytes);
            arena.verify().unwrap();
        }

        // Everything was returned, so the arena must have coalesced back
        // into a single block.
        let stats = arena.stats().unwrap();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.largest_free_block, 4096);
    }
}

#[test]
fn test_fragmentation_then_coalesce() {
    let mut arena = BuddyArena::new(4096);

    let mut payloads = Vec::new();
    for _ in 0..8 {
        payloads.push(arena.allocate(100).unwrap());
    }

    // Free every other allocation: no pair of freed blocks are buddies,
    // so the count of free fragments grows.
    for payload in payloads.iter().step_by(2) {
        arena.free(*payload).unwrap();
    }
    let fragmented = arena.stats().unwrap();
    assert!(fragmented.free_blocks > 1);
    arena.verify().unwrap();

    // Freeing the rest lets every buddy pair merge back.
    for payload in payloads.iter().skip(1).step_by(2) {
        arena.free(*payload).unwrap();
    }
    let stats = arena.stats().unwrap();
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.largest_free_block, 4096);
}

#[test]
fn test_introspection_walk_covers_arena() {
    let mut arena = BuddyArena::new(2048);
    let a = arena.allocate(40).unwrap();
    let b = arena.allocate(500).unwrap();
    arena.free(a).unwrap();

    // Walk all blocks by offset, the way an external reporter renders the
    // arena: every header decodes, blocks tile the arena exactly.
    let mut pos = 0;
    let mut free_seen = 0;
    let mut allocated_seen = 0;
    while pos < arena.size() {
        let info = arena.block_at(pos).unwrap();
        assert!(info.size.is_power_of_two());
        assert_eq!(pos % info.size, 0);
        match info.tag {
            BlockTag::Free => free_seen += 1,
            BlockTag::Allocated => allocated_seen += 1,
        }
        pos += info.size;
    }
    assert_eq!(pos, arena.size());
    assert_eq!(allocated_seen, 1);

    let stats = arena.stats().unwrap();
    assert_eq!(stats.free_blocks, free_seen);
    assert_eq!(stats.allocated_blocks, allocated_seen);

    arena.free(b).unwrap();
}

#[test]
fn test_blocks_iterator_matches_manual_walk() {
    let mut arena = BuddyArena::new(1024);
    let payload = arena.allocate(10).unwrap();

    let collected: Vec<_> = arena
        .blocks()
        .map(|block| block.unwrap())
        .map(|(offset, info)| (offset, info.tag, info.size))
        .collect();
    assert_eq!(
        collected,
        [
            (0, BlockTag::Allocated, 32),
            (32, BlockTag::Free, 32),
            (64, BlockTag::Free, 64),
            (128, BlockTag::Free, 128),
            (256, BlockTag::Free, 256),
            (512, BlockTag::Free, 512),
        ]
    );

    arena.free(payload).unwrap();
}

#[test]
fn test_global_arena_stress() {
    let arena = GlobalArena::new();
    arena.init(1 << 16).unwrap();

    for _round in 0..5 {
        let mut allocations = Vec::new();

        for i in 0..50 {
            let n = match i % 5 {
                0 => 8,
                1 => 32,
                2 => 128,
                3 => 512,
                _ => 2048,
            };
            if let Ok(ptr) = arena.allocate(n) {
                allocations.push(ptr);
            }
        }
        assert!(!allocations.is_empty());

        // Deallocate in reverse order.
        while let Some(ptr) = allocations.pop() {
            arena.free(ptr).unwrap();
        }

        // Check that we can still allocate after each round.
        let ptr = arena.allocate(64).unwrap();
        arena.free(ptr).unwrap();

        let stats = arena.stats().unwrap();
        assert_eq!(stats.used_bytes, 0);
        assert_eq!(stats.free_blocks, 1);
    }
}

#[test]
fn test_global_arena_pointer_identity() {
    let arena = GlobalArena::new();
    arena.init(4096).unwrap();

    let base = arena.base_ptr().unwrap() as usize;
    let ptr = arena.allocate(100).unwrap();
    let offset = arena.offset_of(ptr).unwrap();

    // Payload pointer is always header address + header size.
    assert_eq!(ptr.as_ptr() as usize, base + offset as usize);
    assert_eq!(offset, HEADER_SIZE);
    let header = arena.block_at(offset - HEADER_SIZE).unwrap();
    assert_eq!(header.tag, BlockTag::Allocated);

    arena.free(ptr).unwrap();
}

#[test]
fn test_error_conditions() {
    let mut arena = BuddyArena::new(512);

    assert_eq!(arena.allocate(0), Err(AllocError::InvalidParam));
    assert_eq!(arena.allocate(u32::MAX), Err(AllocError::NoMemory));
    assert_eq!(arena.free(0), Err(AllocError::InvalidParam));
    assert_eq!(arena.free(HEADER_SIZE), Err(AllocError::NotAllocated));
    assert_eq!(arena.block_at(1024), Err(AllocError::InvalidParam));
}
