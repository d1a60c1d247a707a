//! Core buddy arena
//!
//! Implements the buddy system over a single owned byte buffer: first-fit
//! search over the circular free list, block halving on allocation, and
//! buddy coalescing on free. All metadata lives in-band as block headers
//! inside the buffer being managed.

use alloc::boxed::Box;
use alloc::vec;

#[cfg(feature = "log")]
use log::{debug, error, warn};

use crate::{is_aligned, AllocError, AllocResult, MIN_ARENA_SIZE};

use super::free_list::{check_free, FreeList, FreeListIter};
use super::header::{
    buddy_of, magic_at, next_at, prev_at, set_magic, set_size, size_at, BlockInfo, BlockTag,
    RawHeader, ALLOC_MAGIC, FREE_MAGIC, HEADER_SIZE,
};
#[cfg(feature = "tracking")]
use super::stats::ArenaCounters;
use super::stats::ArenaStats;

/// A buddy-system allocator over one contiguous arena.
///
/// The arena size is a power of two with a [`MIN_ARENA_SIZE`] floor. Every
/// block's offset is a multiple of its own size, which makes the buddy of
/// any block computable as `offset ^ size`. The public interface deals in
/// `u32` payload offsets; pointer conversion happens in the
/// [`GlobalArena`](crate::GlobalArena) front end.
pub struct BuddyArena {
    memory: Box<[u8]>,
    free_list: FreeList,
    #[cfg(feature = "tracking")]
    counters: ArenaCounters,
}

impl BuddyArena {
    /// Create an arena of at least `requested` bytes and install a single
    /// free block spanning all of it.
    ///
    /// The size is rounded up to the next power of two, floored at
    /// [`MIN_ARENA_SIZE`]. Buffer acquisition failure is fatal: the arena
    /// cannot exist without its backing store.
    pub fn new(requested: u32) -> Self {
        let size = match requested.max(MIN_ARENA_SIZE).checked_next_power_of_two() {
            Some(size) => size,
            None => panic!(
                "arena of {} bytes cannot be rounded to a power of two",
                requested
            ),
        };

        let mut memory = vec![0u8; size as usize].into_boxed_slice();
        RawHeader {
            magic: FREE_MAGIC,
            size,
            next: 0,
            prev: 0,
        }
        .write(&mut memory, 0);

        Self {
            memory,
            free_list: FreeList::with_sole_block(0),
            #[cfg(feature = "tracking")]
            counters: ArenaCounters::default(),
        }
    }

    /// Total arena size in bytes.
    pub fn size(&self) -> u32 {
        self.memory.len() as u32
    }

    /// Base address of the arena buffer, for payload pointer conversion.
    pub fn base_ptr(&self) -> *const u8 {
        self.memory.as_ptr()
    }

    pub(crate) fn base_mut_ptr(&mut self) -> *mut u8 {
        self.memory.as_mut_ptr()
    }

    /// Allocate `n` usable bytes.
    ///
    /// Returns the payload offset (the first byte after the block header)
    /// of a block spanning at least `n + HEADER_SIZE` bytes, or `NoMemory`
    /// if no free block is large enough or the request would consume the
    /// last remaining free block.
    pub fn allocate(&mut self, n: u32) -> AllocResult<u32> {
        if n == 0 {
            warn!("buddy arena: refusing zero-size allocation");
            return Err(AllocError::InvalidParam);
        }
        let need = match n.checked_add(HEADER_SIZE) {
            Some(need) => need,
            None => return Err(self.exhausted(n)),
        };

        let chosen = match self.free_list.first_fit(&self.memory, need) {
            Some(offset) => offset,
            None => return Err(self.exhausted(n)),
        };

        self.split_to_fit(chosen, need);

        // Conservative admission control: the sole remaining free block is
        // never handed out, so the free list cannot empty through
        // allocation and the head stays dereferenceable.
        if self.free_list.len() == 1 && chosen == self.free_list.head() {
            warn!(
                "buddy arena: refusing to allocate the last free block at {:#x}",
                chosen
            );
            return Err(self.exhausted(n));
        }

        self.free_list.remove(&mut self.memory, chosen);
        set_magic(&mut self.memory, chosen, ALLOC_MAGIC);

        #[cfg(feature = "tracking")]
        {
            self.counters.total_allocations += 1;
        }

        debug!(
            "buddy arena: allocated {} bytes in a {} byte block at {:#x}",
            n,
            size_at(&self.memory, chosen),
            chosen
        );
        Ok(chosen + HEADER_SIZE)
    }

    /// Return the block owning `payload` to the free list and coalesce.
    ///
    /// `payload` must be an offset previously returned by [`allocate`]
    /// and not yet freed. A block whose header is not marked allocated is
    /// rejected with `NotAllocated` and the arena is left untouched.
    ///
    /// [`allocate`]: BuddyArena::allocate
    pub fn free(&mut self, payload: u32) -> AllocResult<()> {
        if payload < HEADER_SIZE || payload >= self.size() {
            error!("buddy arena: free of out-of-range offset {:#x}", payload);
            return Err(AllocError::InvalidParam);
        }
        let offset = payload - HEADER_SIZE;

        let header = RawHeader::read(&self.memory, offset);
        if header.tag() != Some(BlockTag::Allocated) {
            error!(
                "buddy arena: attempt to free non-allocated memory at offset {:#x} (magic {:#x})",
                offset, header.magic
            );
            return Err(AllocError::NotAllocated);
        }

        set_magic(&mut self.memory, offset, FREE_MAGIC);
        self.free_list.insert_sorted(&mut self.memory, offset);
        self.coalesce(offset);

        #[cfg(feature = "tracking")]
        {
            self.counters.total_deallocations += 1;
        }
        Ok(())
    }

    /// Halve the block at `offset` until further halving would leave it
    /// too small for `need`, linking each upper half into the free list.
    fn split_to_fit(&mut self, offset: u32, need: u32) {
        loop {
            let half = size_at(&self.memory, offset) / 2;
            if half < need {
                return;
            }

            let upper = offset + half;
            RawHeader {
                magic: FREE_MAGIC,
                size: half,
                next: 0,
                prev: 0,
            }
            .write(&mut self.memory, upper);
            self.free_list.link_after(&mut self.memory, offset, upper);
            set_size(&mut self.memory, offset, half);

            debug!(
                "buddy arena: split block at {:#x} into {} byte halves",
                offset, half
            );
        }
    }

    /// Merge the free block at `offset` with its buddy until no merge
    /// applies (buddy allocated, wrong size, or whole-arena block).
    ///
    /// The free list is address-sorted, so the buddy of a lower half can
    /// only be the list successor and the buddy of an upper half can only
    /// be the list predecessor.
    fn coalesce(&mut self, mut offset: u32) {
        loop {
            let size = size_at(&self.memory, offset);
            if size == self.size() {
                return;
            }

            let buddy = buddy_of(offset, size);
            if buddy > offset {
                let next = next_at(&self.memory, offset);
                check_free(&self.memory, next);
                if next != buddy || size_at(&self.memory, next) != size {
                    return;
                }
                set_size(&mut self.memory, offset, size * 2);
                self.free_list.remove(&mut self.memory, next);
                debug!(
                    "buddy arena: merged {:#x} and {:#x} into {} bytes",
                    offset,
                    next,
                    size * 2
                );
            } else {
                let prev = prev_at(&self.memory, offset);
                check_free(&self.memory, prev);
                if prev != buddy || size_at(&self.memory, prev) != size {
                    return;
                }
                set_size(&mut self.memory, prev, size * 2);
                self.free_list.remove(&mut self.memory, offset);
                debug!(
                    "buddy arena: merged {:#x} and {:#x} into {} bytes",
                    prev,
                    offset,
                    size * 2
                );
                offset = prev;
            }
        }
    }

    fn exhausted(&mut self, requested: u32) -> AllocError {
        #[cfg(feature = "tracking")]
        {
            self.counters.failed_allocations += 1;
        }
        super::stats::log_alloc_failure(self, requested);
        AllocError::NoMemory
    }

    /// Read the block header at `offset` without mutating anything.
    ///
    /// Out-of-range offsets report `InvalidParam`; an unrecognized magic
    /// reports `Corrupted`.
    pub fn block_at(&self, offset: u32) -> AllocResult<BlockInfo> {
        if offset >= self.size() || self.size() - offset < HEADER_SIZE {
            return Err(AllocError::InvalidParam);
        }
        let header = RawHeader::read(&self.memory, offset);
        let tag = header.tag().ok_or(AllocError::Corrupted)?;
        Ok(BlockInfo {
            tag,
            size: header.size,
            next: header.next,
            prev: header.prev,
        })
    }

    /// Walk every block by address, from offset 0 to the arena size.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            arena: self,
            pos: 0,
            done: false,
        }
    }

    /// Walk the free list in list order.
    pub fn free_blocks(&self) -> FreeBlocks<'_> {
        FreeBlocks {
            bytes: &self.memory,
            inner: self.free_list.iter(&self.memory),
        }
    }

    /// Summarize the arena with one address-order walk.
    pub fn stats(&self) -> AllocResult<ArenaStats> {
        ArenaStats::collect(self)
    }

    /// Cumulative operation counters.
    #[cfg(feature = "tracking")]
    pub fn counters(&self) -> ArenaCounters {
        self.counters
    }

    /// Check the arena's global invariants.
    ///
    /// Walks every block by address and the free list in both directions;
    /// a violation of conservation, buddy alignment, address sortedness,
    /// or link symmetry reports `Corrupted`.
    pub fn verify(&self) -> AllocResult<()> {
        let mut total: u64 = 0;
        let mut free_seen = 0usize;
        for block in self.blocks() {
            let (offset, info) = block?;
            if !info.size.is_power_of_two() || !is_aligned(offset, info.size) {
                return Err(AllocError::Corrupted);
            }
            total += u64::from(info.size);
            if info.tag == BlockTag::Free {
                free_seen += 1;
            }
        }
        if total != u64::from(self.size()) {
            return Err(AllocError::Corrupted);
        }
        if free_seen != self.free_list.len() {
            return Err(AllocError::Corrupted);
        }

        let head = self.free_list.head();
        let mut count = 0usize;
        let mut curr = head;
        let mut last = None;
        loop {
            if magic_at(&self.memory, curr) != FREE_MAGIC {
                return Err(AllocError::Corrupted);
            }
            // Ascending offsets around the circle imply the head is the
            // lowest-offset free block.
            if let Some(last) = last {
                if curr <= last {
                    return Err(AllocError::Corrupted);
                }
            }
            let next = next_at(&self.memory, curr);
            if next >= self.size() || prev_at(&self.memory, next) != curr {
                return Err(AllocError::Corrupted);
            }
            count += 1;
            if count > free_seen {
                return Err(AllocError::Corrupted);
            }
            last = Some(curr);
            curr = next;
            if curr == head {
                break;
            }
        }
        if count != free_seen {
            return Err(AllocError::Corrupted);
        }
        Ok(())
    }
}

/// Address-order block iterator; see [`BuddyArena::blocks`].
///
/// Yields `Err(Corrupted)` once and stops if a header cannot be decoded
/// or its size would not advance the walk.
pub struct Blocks<'a> {
    arena: &'a BuddyArena,
    pos: u32,
    done: bool,
}

impl Iterator for Blocks<'_> {
    type Item = AllocResult<(u32, BlockInfo)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.arena.size() {
            return None;
        }
        let offset = self.pos;
        match self.arena.block_at(offset) {
            Ok(info) => {
                if info.size < HEADER_SIZE || self.arena.size() - offset < info.size {
                    self.done = true;
                    return Some(Err(AllocError::Corrupted));
                }
                self.pos = offset + info.size;
                Some(Ok((offset, info)))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// List-order free block iterator; see [`BuddyArena::free_blocks`].
pub struct FreeBlocks<'a> {
    bytes: &'a [u8],
    inner: FreeListIter<'a>,
}

impl Iterator for FreeBlocks<'_> {
    type Item = (u32, BlockInfo);

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.inner.next()?;
        let header = RawHeader::read(self.bytes, offset);
        Some((
            offset,
            BlockInfo {
                tag: BlockTag::Free,
                size: header.size,
                next: header.next,
                prev: header.prev,
            },
        ))
    }
}
