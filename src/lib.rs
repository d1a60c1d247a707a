//! Buddy Arena Allocator
//!
//! This crate implements a self-contained buddy-system allocator over a
//! single owned arena of bytes, featuring:
//! - Power-of-two arena with an enforced 512-byte floor
//! - Block headers stored in-band, inside the memory they describe
//! - Circular doubly-linked free list threaded through header offsets
//! - First-fit search with block halving and buddy coalescing
//! - A lock-guarded process-wide front end (`GlobalArena`)
//!
//! All free-list bookkeeping uses `u32` offsets into the arena rather than
//! native pointers, so every header access is bounds-checked and the arena
//! stays relocatable between `end`/`init` cycles.

#![no_std]

extern crate alloc;

// Logging support - conditionally import log crate
#[cfg(feature = "log")]
extern crate log;

// Stub macros when log is disabled - these become no-ops
#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// Smallest arena the allocator will manage. Requested sizes below this
/// are rounded up to it.
pub const MIN_ARENA_SIZE: u32 = 512;

/// The error type used for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Invalid request (zero-size allocation, out-of-range offset or
    /// pointer).
    InvalidParam,
    /// No free block large enough, or the request would consume the last
    /// remaining free block.
    NoMemory,
    /// `free` was given a block whose header is not marked allocated
    /// (double free or wild pointer).
    NotAllocated,
    /// The arena has not been initialized, or `end` has been called.
    Uninitialized,
    /// Introspection met a header with an unrecognized magic value.
    Corrupted,
}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

/// Checks whether `offset` is a multiple of `size`.
///
/// Equivalent to `offset % size == 0`, but the size must be a power of two.
#[inline]
pub(crate) const fn is_aligned(offset: u32, size: u32) -> bool {
    offset & (size - 1) == 0
}

pub mod arena;
#[cfg(feature = "tracking")]
pub use arena::ArenaCounters;
pub use arena::{ArenaStats, BlockInfo, BlockTag, BuddyArena, HEADER_SIZE};

pub mod global_arena;
pub use global_arena::GlobalArena;
