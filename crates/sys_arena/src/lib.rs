//! OS-backed memory supply for a page-structured allocator.
//!
//! Two contracts are exported:
//!
//! - [`PageBuf`]: an owned, zero-initialized mapping of a fixed length whose
//!   base address is aligned to a caller-chosen power of two. Dropping the
//!   buffer returns it to the operating system.
//! - [`Arena`]: a bump allocator over chained anonymous mappings for raw,
//!   arbitrarily sized blocks. Nothing allocated from an arena is released
//!   before the arena itself is dropped.

use std::io;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as os;

pub use os::{allocation_granularity, page_size};

/// Default size of a bump block, and the granularity the arena grows in.
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 20;

/// An owned, aligned, zero-initialized buffer mapped directly from the OS.
///
/// The mapping is created by over-allocating and aligning; on unix the
/// misaligned head and tail are returned immediately, on windows the full
/// reservation is retained for the buffer's lifetime.
pub struct PageBuf {
    inner: os::MmapInner,
}

impl PageBuf {
    /// Maps `len` bytes aligned to `align`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the mapping cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero, or `align` is not a power of two, or `align`
    /// is smaller than the allocation granularity (the page size on unix,
    /// the `VirtualAlloc` reservation granularity on windows).
    pub fn map(len: usize, align: usize) -> io::Result<PageBuf> {
        assert!(len > 0, "cannot map an empty buffer");
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        assert!(
            align >= allocation_granularity(),
            "alignment below allocation granularity"
        );

        // SAFETY: align is a power of two and a multiple of the page size.
        let inner = unsafe { os::MmapInner::map_aligned(len, align)? };
        debug_assert_eq!(inner.ptr() as usize & (align - 1), 0);

        Ok(PageBuf { inner })
    }

    /// Base address of the buffer. Aligned as requested at map time.
    pub fn ptr(&self) -> *mut u8 {
        self.inner.ptr()
    }

    /// Length of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True if the buffer holds no bytes. Always false for a live buffer.
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

/// One mapped block the arena bumps through.
struct Block {
    map: os::MmapInner,
    head: usize,
}

impl Block {
    fn map(len: usize) -> io::Result<Block> {
        // SAFETY: plain anonymous mapping, no alignment demands.
        let map = unsafe { os::MmapInner::map_anon(len)? };
        Ok(Block { map, head: 0 })
    }

    fn remaining(&self) -> usize {
        self.map.len() - self.head
    }
}

/// A bump allocator over chained anonymous mappings.
///
/// Blocks are never reused or compacted; every pointer handed out stays
/// valid until the arena is dropped. Requests larger than the block size get
/// a dedicated block of their own.
pub struct Arena {
    blocks: Vec<Block>,
    block_size: usize,
}

impl Arena {
    /// Creates an arena and maps its first block.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the initial block cannot be mapped.
    pub fn new() -> io::Result<Arena> {
        Self::with_block_size(NonZeroUsize::new(DEFAULT_BLOCK_SIZE).unwrap())
    }

    /// Creates an arena that grows in blocks of `block_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the initial block cannot be mapped.
    pub fn with_block_size(block_size: NonZeroUsize) -> io::Result<Arena> {
        let block_size = block_size.get();
        let first = Block::map(block_size)?;
        Ok(Arena {
            blocks: vec![first],
            block_size,
        })
    }

    /// Allocates `n` bytes, aligned to pointer width.
    ///
    /// The bytes are zero on first use of the underlying mapping; the arena
    /// never recycles, so in practice they are always zero.
    ///
    /// # Errors
    ///
    /// Returns the OS error if a new block is needed and cannot be mapped.
    pub fn alloc_raw(&mut self, n: usize) -> io::Result<NonNull<u8>> {
        let align = std::mem::align_of::<usize>();

        let tail = self.blocks.last_mut().expect("arena has at least one block");
        let base = tail.map.ptr() as usize + tail.head;
        let pad = base.wrapping_neg() & (align - 1);

        if n + pad <= tail.remaining() {
            tail.head += pad + n;
            let ptr = (base + pad) as *mut u8;
            // SAFETY: the address lies inside a live mapping, never null.
            return Ok(unsafe { NonNull::new_unchecked(ptr) });
        }

        // A fresh mapping starts page-aligned, so no pad is needed.
        let len = if n > self.block_size { n } else { self.block_size };
        let mut block = Block::map(len)?;
        let ptr = block.map.ptr();
        block.head = n;
        self.blocks.push(block);

        // SAFETY: mmap/VirtualAlloc never return null on success.
        Ok(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Number of blocks currently mapped.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}
