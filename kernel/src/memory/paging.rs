//! Two-level i386 paging.
//!
//! A [`PageDirectory`] is one address space: 1024 directory entries, each
//! pointing at a page table of 1024 entries. Both levels live in kernel heap
//! blocks and are reached through the heap's [`DirectMap`].
//!
//! [`ActiveDirectory`] is the only thing allowed to load a directory into the
//! paging root, and it remembers which one it loaded.

use super::{
    address::{DirectMap, PhysAddr, VirtAddr},
    kheap::LockedHeap,
};
use crate::{
    constants::memory::{ENTRIES_PER_TABLE, PAGE_SIZE},
    errors::{KernelError, KernelResult},
};
use bitfield_struct::bitfield;
use core::ops::BitOr;

/// Hardware access needed by the paging layer.
pub trait Mmu {
    /// Loads `root` into the paging root register.
    fn load_directory(&mut self, root: PhysAddr);

    /// Reads one byte through the currently loaded directory.
    ///
    /// # Safety
    /// `virt` must be mapped and readable in the loaded directory.
    unsafe fn read_byte(&self, virt: VirtAddr) -> u8;
}

/// The architectural flag bits shared by directory and table entries.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct PageFlags {
    pub present: bool,
    pub writable: bool,
    /// Ring 3 may access the page.
    pub access_from_all: bool,
    pub write_through: bool,
    pub cache_disabled: bool,
    #[bits(3)]
    __: u8,
}

impl PageFlags {
    pub const EMPTY: PageFlags = PageFlags::new();
    pub const PRESENT: PageFlags = PageFlags::new().with_present(true);
    pub const WRITABLE: PageFlags = PageFlags::new().with_writable(true);
    pub const ACCESS_FROM_ALL: PageFlags = PageFlags::new().with_access_from_all(true);
    pub const WRITE_THROUGH: PageFlags = PageFlags::new().with_write_through(true);
    pub const CACHE_DISABLED: PageFlags = PageFlags::new().with_cache_disabled(true);

    /// The kernel's identity map of the whole 4 GiB space.
    pub const KERNEL: PageFlags = PageFlags::PRESENT
        .with_writable(true)
        .with_access_from_all(true);
    /// Default for a fresh task space: visible to ring 3, read only.
    pub const TASK: PageFlags = PageFlags::PRESENT.with_access_from_all(true);
    /// Program images, stacks and process allocations.
    pub const USER_WRITABLE: PageFlags = PageFlags::KERNEL;
}

impl BitOr for PageFlags {
    type Output = PageFlags;

    fn bitor(self, rhs: PageFlags) -> PageFlags {
        PageFlags::from_bits(self.into_bits() | rhs.into_bits())
    }
}

/// A 32-bit directory or table entry.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntry {
    #[bits(5, default = PageFlags::EMPTY)]
    pub flags: PageFlags,
    pub accessed: bool,
    pub dirty: bool,
    pub large_page: bool,
    pub global: bool,
    #[bits(3)]
    pub available: u8,
    #[bits(20)]
    frame_number: u32,
}

impl PageEntry {
    /// An entry pointing at `frame`, which must be page aligned.
    pub const fn mapping(frame: PhysAddr, flags: PageFlags) -> Self {
        PageEntry::new()
            .with_flags(flags)
            .with_frame_number(frame.as_u32() >> 12)
    }

    pub const fn frame(self) -> PhysAddr {
        PhysAddr::new(self.frame_number() << 12)
    }

    pub const fn is_present(self) -> bool {
        self.flags().present()
    }
}

/// One address space. Not `Clone`: exactly one owner frees it.
#[derive(Debug)]
pub struct PageDirectory {
    root: PhysAddr,
    map: DirectMap,
}

impl PageDirectory {
    /// Builds a directory whose tables map every virtual page onto the same
    /// physical page with `flags`. Directory entries additionally carry
    /// `WRITABLE` so table-level flags decide write access.
    ///
    /// On heap exhaustion everything allocated so far is released.
    pub fn new(heap: &LockedHeap, flags: PageFlags) -> KernelResult<PageDirectory> {
        let directory = PageDirectory {
            root: heap.allocate(PAGE_SIZE)?,
            map: heap.direct_map(),
        };

        for di in 0..ENTRIES_PER_TABLE {
            let table = match heap.allocate(PAGE_SIZE) {
                Ok(table) => table,
                Err(e) => {
                    let _ = directory.release(heap, di);
                    return Err(e);
                }
            };
            for ti in 0..ENTRIES_PER_TABLE {
                let frame = PhysAddr::new(((di << 22) | (ti << 12)) as u32);
                directory.write(table, ti, PageEntry::mapping(frame, flags));
            }
            directory.write(
                directory.root,
                di,
                PageEntry::mapping(table, flags | PageFlags::WRITABLE),
            );
        }

        log::debug!("paging: new address space at {:?}", directory.root);
        Ok(directory)
    }

    /// Physical address of the directory page, as loaded into the paging root.
    pub fn root(&self) -> PhysAddr {
        self.root
    }

    /// Maps the page at `virt` onto the frame at `phys`.
    ///
    /// # Returns
    /// `InvalidArgument`, with nothing written, if either address is not page
    /// aligned.
    pub fn map(&mut self, virt: VirtAddr, phys: PhysAddr, flags: PageFlags) -> KernelResult<()> {
        if !phys.is_page_aligned() {
            return Err(KernelError::InvalidArgument);
        }
        self.set_entry(virt, PageEntry::mapping(phys, flags))
    }

    /// Maps `count` consecutive pages, stopping at the first failure.
    ///
    /// # Returns
    /// `InvalidArgument` from the first page that is misaligned or would lie
    /// past 4 GiB. Pages before it stay mapped.
    pub fn map_range(
        &mut self,
        virt: VirtAddr,
        phys: PhysAddr,
        count: usize,
        flags: PageFlags,
    ) -> KernelResult<()> {
        (0..count).try_for_each(|page| {
            let offset = page
                .checked_mul(PAGE_SIZE)
                .and_then(|offset| u32::try_from(offset).ok())
                .ok_or(KernelError::InvalidArgument)?;
            match (virt.checked_add(offset), phys.checked_add(offset)) {
                (Some(virt), Some(phys)) => self.map(virt, phys, flags),
                _ => Err(KernelError::InvalidArgument),
            }
        })
    }

    /// Maps the physical span `[phys, phys_end)` starting at `virt`.
    pub fn map_to(
        &mut self,
        virt: VirtAddr,
        phys: PhysAddr,
        phys_end: PhysAddr,
        flags: PageFlags,
    ) -> KernelResult<()> {
        if !virt.is_page_aligned() || !phys.is_page_aligned() || !phys_end.is_page_aligned() {
            return Err(KernelError::InvalidArgument);
        }
        if phys_end < phys {
            return Err(KernelError::InvalidArgument);
        }
        let count = (phys_end - phys) as usize / PAGE_SIZE;
        self.map_range(virt, phys, count, flags)
    }

    /// The raw table entry for the page at `virt`.
    pub fn entry(&self, virt: VirtAddr) -> KernelResult<PageEntry> {
        if !virt.is_page_aligned() {
            return Err(KernelError::InvalidArgument);
        }
        let table = self.read(self.root, virt.directory_index()).frame();
        Ok(self.read(table, virt.table_index()))
    }

    /// Overwrites the table entry for the page at `virt`.
    pub fn set_entry(&mut self, virt: VirtAddr, entry: PageEntry) -> KernelResult<()> {
        if !virt.is_page_aligned() {
            return Err(KernelError::InvalidArgument);
        }
        let table = self.read(self.root, virt.directory_index()).frame();
        self.write(table, virt.table_index(), entry);
        Ok(())
    }

    /// The physical address `virt` resolves to in this space.
    pub fn translate(&self, virt: VirtAddr) -> PhysAddr {
        let page = virt.align_down(PAGE_SIZE);
        let table = self.read(self.root, page.directory_index()).frame();
        self.read(table, page.table_index()).frame() + virt.page_offset()
    }

    /// Returns every table and the directory itself to the heap.
    pub fn free(self, heap: &LockedHeap) -> KernelResult<()> {
        log::debug!("paging: freeing address space at {:?}", self.root);
        self.release(heap, ENTRIES_PER_TABLE)
    }

    fn release(&self, heap: &LockedHeap, tables: usize) -> KernelResult<()> {
        let tables = (0..tables).map(|di| heap.free(self.read(self.root, di).frame()));
        tables.fold(Ok(()), KernelResult::and).and(heap.free(self.root))
    }

    fn read(&self, table: PhysAddr, index: usize) -> PageEntry {
        // SAFETY: `table` is a page owned by this directory and index < 1024
        unsafe { PageEntry::from_bits(*self.map.as_mut_ptr::<u32>(table).add(index)) }
    }

    fn write(&self, table: PhysAddr, index: usize, entry: PageEntry) {
        // SAFETY: as in `read`
        unsafe { *self.map.as_mut_ptr::<u32>(table).add(index) = entry.into_bits() }
    }
}

/// The hardware paging root together with a record of what is loaded in it.
pub struct ActiveDirectory<M: Mmu> {
    mmu: M,
    root: Option<PhysAddr>,
}

impl<M: Mmu> ActiveDirectory<M> {
    pub fn new(mmu: M) -> Self {
        Self { mmu, root: None }
    }

    /// Loads `directory` and records it as the active address space.
    pub fn switch(&mut self, directory: &PageDirectory) {
        self.mmu.load_directory(directory.root());
        self.root = Some(directory.root());
    }

    pub fn root(&self) -> Option<PhysAddr> {
        self.root
    }

    pub fn is_active(&self, directory: &PageDirectory) -> bool {
        self.root == Some(directory.root())
    }

    pub fn mmu(&self) -> &M {
        &self.mmu
    }

    /// # Safety
    /// See [`Mmu::read_byte`].
    pub unsafe fn read_byte(&self, virt: VirtAddr) -> u8 {
        self.mmu.read_byte(virt)
    }
}
