//! Process-wide arena front end.
//!
//! Wraps the core [`BuddyArena`] behind a spinlock with an explicit
//! initialized flag, exposing the `init`/`allocate`/`free`/`end` surface
//! on shared state (usable as a `static`). The core deals exclusively in
//! offsets; payload pointers exist only at this boundary.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use kspin::SpinNoIrq;

#[cfg(feature = "log")]
use log::{error, info, warn};

#[cfg(feature = "tracking")]
use crate::arena::ArenaCounters;
use crate::arena::{ArenaStats, BlockInfo, BuddyArena, HEADER_SIZE};
use crate::{AllocError, AllocResult};

/// The allocator's process-wide face: one arena at a time, guarded by a
/// spinlock, with idempotent `init` and a hard uninitialized-access guard.
pub struct GlobalArena {
    arena: SpinNoIrq<Option<BuddyArena>>,
    initialized: AtomicBool,
}

impl GlobalArena {
    pub const fn new() -> Self {
        Self {
            arena: SpinNoIrq::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Initialize the arena with at least `size` bytes (rounded up to a
    /// power of two, 512-byte floor).
    ///
    /// Idempotent: a second call warns and keeps the existing arena,
    /// whatever size it was created with.
    pub fn init(&self, size: u32) -> AllocResult<()> {
        let mut arena = self.arena.lock();
        if arena.is_some() {
            warn!("global arena: already initialised, ignoring init({})", size);
            return Ok(());
        }

        let fresh = BuddyArena::new(size);
        info!("global arena: initialised with {} bytes", fresh.size());
        *arena = Some(fresh);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Release the arena's backing buffer.
    ///
    /// Every allocator call is rejected with `Uninitialized` until the
    /// next `init`.
    pub fn end(&self) {
        let mut arena = self.arena.lock();
        if arena.take().is_none() {
            warn!("global arena: end called before init");
        }
        self.initialized.store(false, Ordering::SeqCst);
    }

    /// Allocate `n` usable bytes and return the payload pointer.
    pub fn allocate(&self, n: u32) -> AllocResult<NonNull<u8>> {
        if !self.initialized.load(Ordering::SeqCst) {
            error!("global arena: allocate before init");
            return Err(AllocError::Uninitialized);
        }

        let mut guard = self.arena.lock();
        let arena = guard.as_mut().ok_or(AllocError::Uninitialized)?;
        let payload = arena.allocate(n)?;
        let ptr = unsafe { arena.base_mut_ptr().add(payload as usize) };
        Ok(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Free a payload pointer previously returned by [`allocate`].
    ///
    /// Pointers outside the arena are rejected with `InvalidParam`;
    /// pointers whose header is not marked allocated with `NotAllocated`.
    ///
    /// [`allocate`]: GlobalArena::allocate
    pub fn free(&self, ptr: NonNull<u8>) -> AllocResult<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            error!("global arena: free before init");
            return Err(AllocError::Uninitialized);
        }

        let mut guard = self.arena.lock();
        let arena = guard.as_mut().ok_or(AllocError::Uninitialized)?;
        let payload = payload_offset(arena, ptr)?;
        arena.free(payload)
    }

    /// Translate a payload pointer back to its arena offset.
    pub fn offset_of(&self, ptr: NonNull<u8>) -> AllocResult<u32> {
        let guard = self.arena.lock();
        let arena = guard.as_ref().ok_or(AllocError::Uninitialized)?;
        payload_offset(arena, ptr)
    }

    /// Total arena size in bytes.
    pub fn size(&self) -> AllocResult<u32> {
        let guard = self.arena.lock();
        Ok(guard.as_ref().ok_or(AllocError::Uninitialized)?.size())
    }

    /// Base address of the arena buffer.
    pub fn base_ptr(&self) -> AllocResult<*const u8> {
        let guard = self.arena.lock();
        Ok(guard.as_ref().ok_or(AllocError::Uninitialized)?.base_ptr())
    }

    /// Read the block header at `offset`; see [`BuddyArena::block_at`].
    pub fn block_at(&self, offset: u32) -> AllocResult<BlockInfo> {
        let guard = self.arena.lock();
        guard
            .as_ref()
            .ok_or(AllocError::Uninitialized)?
            .block_at(offset)
    }

    /// Summarize the arena; see [`BuddyArena::stats`].
    pub fn stats(&self) -> AllocResult<ArenaStats> {
        let guard = self.arena.lock();
        guard.as_ref().ok_or(AllocError::Uninitialized)?.stats()
    }

    /// Cumulative operation counters.
    #[cfg(feature = "tracking")]
    pub fn counters(&self) -> AllocResult<ArenaCounters> {
        let guard = self.arena.lock();
        Ok(guard.as_ref().ok_or(AllocError::Uninitialized)?.counters())
    }
}

impl Default for GlobalArena {
    fn default() -> Self {
        Self::new()
    }
}

fn payload_offset(arena: &BuddyArena, ptr: NonNull<u8>) -> AllocResult<u32> {
    let base = arena.base_ptr() as usize;
    let addr = ptr.as_ptr() as usize;
    if addr < base + HEADER_SIZE as usize || addr >= base + arena.size() as usize {
        error!("global arena: pointer {:#x} is not an arena payload", addr);
        return Err(AllocError::InvalidParam);
    }
    Ok((addr - base) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::BlockTag;

    #[test]
    fn test_calls_before_init_are_rejected() {
        let arena = GlobalArena::new();

        assert_eq!(arena.allocate(16), Err(AllocError::Uninitialized));
        assert_eq!(arena.free(NonNull::dangling()), Err(AllocError::Uninitialized));
        assert_eq!(arena.size(), Err(AllocError::Uninitialized));
        assert_eq!(arena.stats(), Err(AllocError::Uninitialized));
    }

    #[test]
    fn test_double_init_keeps_arena() {
        let arena = GlobalArena::new();

        arena.init(512).unwrap();
        arena.init(4096).unwrap();
        assert_eq!(arena.size(), Ok(512));
    }

    #[test]
    fn test_payload_round_trip() {
        let arena = GlobalArena::new();
        arena.init(1024).unwrap();

        let ptr = arena.allocate(64).unwrap();
        assert_eq!(arena.offset_of(ptr), Ok(HEADER_SIZE));

        // The payload is caller-owned between allocate and free.
        unsafe {
            for i in 0..64 {
                ptr.as_ptr().add(i).write(i as u8);
            }
            assert_eq!(ptr.as_ptr().add(63).read(), 63);
        }

        let info = arena.block_at(0).unwrap();
        assert_eq!(info.tag, BlockTag::Allocated);

        arena.free(ptr).unwrap();
        assert_eq!(arena.block_at(0).unwrap().tag, BlockTag::Free);
        assert_eq!(arena.free(ptr), Err(AllocError::NotAllocated));
    }

    #[test]
    fn test_end_then_reinit() {
        let arena = GlobalArena::new();

        arena.init(512).unwrap();
        let ptr = arena.allocate(64).unwrap();
        arena.free(ptr).unwrap();

        arena.end();
        assert_eq!(arena.allocate(64), Err(AllocError::Uninitialized));

        arena.init(2048).unwrap();
        assert_eq!(arena.size(), Ok(2048));
        assert!(arena.allocate(64).is_ok());
    }

    #[test]
    fn test_foreign_pointer_rejected() {
        let arena = GlobalArena::new();
        arena.init(512).unwrap();

        let mut outside = 0u8;
        let ptr = NonNull::from(&mut outside);
        assert_eq!(arena.free(ptr), Err(AllocError::InvalidParam));
    }
}
