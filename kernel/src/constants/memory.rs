//! Physical memory layout and paging geometry.

/// Allocation unit tracked by one heap table entry.
pub const BLOCK_SIZE: usize = 4096;
pub const PAGE_SIZE: usize = 4096;

/// Entries in one page directory and in one page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes covered by one page directory entry (one full page table).
pub const DIRECTORY_ENTRY_SPAN: usize = PAGE_SIZE * ENTRIES_PER_TABLE;

/// Start of the kernel heap region (16 MiB, above the kernel image).
pub const HEAP_ADDRESS: u32 = 0x0100_0000;
pub const HEAP_SIZE_BYTES: usize = 100 * 1024 * 1024; // 100 MiB
pub const HEAP_TOTAL_BLOCKS: usize = HEAP_SIZE_BYTES / BLOCK_SIZE;

/// The block table sits in free conventional memory right after the boot sector.
pub const HEAP_TABLE_ADDRESS: u32 = 0x0000_7E00;
