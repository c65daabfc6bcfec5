//! Block-table heap.
//!
//! The managed region is split into [`BLOCK_SIZE`] blocks and every block is
//! described by one byte in a table kept outside the region. An allocation is
//! a run of contiguous blocks: the first is flagged `is_first`, every block
//! but the last is flagged `has_next`. Freeing walks the `has_next` chain, so
//! a free never spills past the allocation it started on.

use crate::{
    constants::memory::BLOCK_SIZE,
    errors::{KernelError, KernelResult},
    memory::address::PhysAddr,
};
use bitfield_struct::bitfield;

/// Whether a block belongs to a live allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockKind {
    Free = 0,
    Taken = 1,
}

impl BlockKind {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value {
            0 => BlockKind::Free,
            _ => BlockKind::Taken,
        }
    }
}

/// One heap table entry.
///
/// Byte layout: kind in the low nibble, `0x40` first block of an
/// allocation, `0x80` the allocation continues in the next block.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct BlockEntry {
    #[bits(4, default = BlockKind::Free)]
    pub kind: BlockKind,
    #[bits(2)]
    __: u8,
    pub is_first: bool,
    pub has_next: bool,
}

impl BlockEntry {
    pub const FREE: BlockEntry = BlockEntry::new();

    pub const fn is_free(self) -> bool {
        matches!(self.kind(), BlockKind::Free)
    }
}

/// The descriptor table, one entry per block in the region.
pub struct HeapTable {
    entries: &'static mut [BlockEntry],
}

impl HeapTable {
    pub fn new(entries: &'static mut [BlockEntry]) -> Self {
        Self { entries }
    }

    /// Builds a table over `len` entries starting at `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid for `len` bytes for the rest of the kernel's
    /// lifetime and not aliased by anything else.
    pub unsafe fn from_raw(ptr: *mut BlockEntry, len: usize) -> Self {
        Self::new(core::slice::from_raw_parts_mut(ptr, len))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct Heap {
    table: HeapTable,
    start: PhysAddr,
}

impl Heap {
    /// Creates a heap over `[start, end)`, marking every block free.
    ///
    /// # Returns
    /// `InvalidArgument` if a bound is not block aligned or the table does not
    /// hold exactly one entry per block.
    pub fn create(start: PhysAddr, end: PhysAddr, table: HeapTable) -> KernelResult<Heap> {
        if !start.is_aligned(BLOCK_SIZE) || !end.is_aligned(BLOCK_SIZE) || end < start {
            return Err(KernelError::InvalidArgument);
        }
        let total_blocks = (end - start) as usize / BLOCK_SIZE;
        if table.len() != total_blocks {
            return Err(KernelError::InvalidArgument);
        }

        let mut heap = Heap { table, start };
        heap.table.entries.fill(BlockEntry::FREE);
        Ok(heap)
    }

    /// Address of the first block.
    pub fn start(&self) -> PhysAddr {
        self.start
    }

    /// One past the last block.
    pub fn end(&self) -> PhysAddr {
        self.start + (self.table.len() * BLOCK_SIZE) as u32
    }

    pub fn total_blocks(&self) -> usize {
        self.table.len()
    }

    /// Number of FREE entries, wherever they are. A request for that many
    /// blocks can still fail if they are not contiguous.
    pub fn free_blocks(&self) -> usize {
        self.table.entries.iter().filter(|e| e.is_free()).count()
    }

    /// The table entry for block `index`.
    #[cfg(test)]
    pub fn entry(&self, index: usize) -> Option<BlockEntry> {
        self.table.entries.get(index).copied()
    }

    /// Allocates the first run of free blocks covering `size` bytes.
    ///
    /// # Arguments
    /// * `size` - Request in bytes, rounded up to whole blocks
    ///
    /// # Returns
    /// The address of the run's first block, `InvalidArgument` for a zero
    /// size, or `OutOfMemory` when no free run is long enough.
    pub fn allocate(&mut self, size: usize) -> KernelResult<PhysAddr> {
        if size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let blocks = size.div_ceil(BLOCK_SIZE);
        let first = self.find_free_run(blocks).ok_or_else(|| {
            log::warn!("heap: no run of {} free blocks", blocks);
            KernelError::OutOfMemory
        })?;
        self.mark_taken(first, blocks);

        Ok(self.block_address(first))
    }

    /// Releases the allocation whose first block starts at `addr`.
    ///
    /// # Returns
    /// `InvalidArgument` without touching the table if `addr` is outside the
    /// region, not block aligned, or not the first block of a live allocation.
    pub fn free(&mut self, addr: PhysAddr) -> KernelResult<()> {
        let first = self.block_index(addr)?;
        let head = self.table.entries[first];
        if head.is_free() || !head.is_first() {
            return Err(KernelError::InvalidArgument);
        }

        for entry in &mut self.table.entries[first..] {
            let has_next = entry.has_next();
            *entry = BlockEntry::FREE;
            if !has_next {
                break;
            }
        }
        Ok(())
    }

    fn find_free_run(&self, blocks: usize) -> Option<usize> {
        let mut run = 0;
        for (index, entry) in self.table.entries.iter().enumerate() {
            if !entry.is_free() {
                run = 0;
                continue;
            }
            run += 1;
            if run == blocks {
                return Some(index + 1 - blocks);
            }
        }
        None
    }

    fn mark_taken(&mut self, first: usize, blocks: usize) {
        let last = first + blocks - 1;
        for (index, entry) in self.table.entries[first..=last].iter_mut().enumerate() {
            *entry = BlockEntry::new()
                .with_kind(BlockKind::Taken)
                .with_is_first(index == 0)
                .with_has_next(first + index != last);
        }
    }

    fn block_address(&self, index: usize) -> PhysAddr {
        self.start + (index * BLOCK_SIZE) as u32
    }

    fn block_index(&self, addr: PhysAddr) -> KernelResult<usize> {
        if addr < self.start || addr >= self.end() || !addr.is_aligned(BLOCK_SIZE) {
            return Err(KernelError::InvalidArgument);
        }
        Ok((addr - self.start) as usize / BLOCK_SIZE)
    }
}
