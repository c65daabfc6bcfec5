//! The kernel heap
//!
//! Wraps the block-table [`Heap`] in a spinlock together with the kernel's
//! view of physical memory. On the machine this is also the global allocator,
//! so `Box`, `Vec` and `BTreeMap` draw from the same blocks as page tables,
//! task stacks and process images.

use super::{
    address::{DirectMap, PhysAddr},
    heap::Heap,
};
use crate::{
    constants::memory::BLOCK_SIZE,
    errors::{KernelError, KernelResult},
};
use core::alloc::{GlobalAlloc, Layout};
use spin::Mutex;

pub struct LockedHeap {
    map: DirectMap,
    inner: Mutex<Option<Heap>>,
}

impl LockedHeap {
    /// A heap with no backing region. Every allocation fails until
    /// [`Self::init`] is called.
    pub const fn empty(map: DirectMap) -> Self {
        Self {
            map,
            inner: Mutex::new(None),
        }
    }

    pub fn new(map: DirectMap, heap: Heap) -> Self {
        Self {
            map,
            inner: Mutex::new(Some(heap)),
        }
    }

    pub fn init(&self, heap: Heap) {
        log::info!(
            "heap: {} blocks at {:?}..{:?}",
            heap.total_blocks(),
            heap.start(),
            heap.end()
        );
        *self.inner.lock() = Some(heap);
    }

    /// How the kernel reaches the blocks this heap hands out.
    pub fn direct_map(&self) -> DirectMap {
        self.map
    }

    /// Allocates `size` bytes of whole blocks. See [`Heap::allocate`].
    ///
    /// # Returns
    /// `OutOfMemory` as well when the heap has not been initialized.
    pub fn allocate(&self, size: usize) -> KernelResult<PhysAddr> {
        self.inner
            .lock()
            .as_mut()
            .ok_or(KernelError::OutOfMemory)?
            .allocate(size)
    }

    /// Allocates and fills the whole request with zeroes.
    pub fn allocate_zeroed(&self, size: usize) -> KernelResult<PhysAddr> {
        let addr = self.allocate(size)?;
        // SAFETY: the run was just handed out and covers at least `size` bytes
        unsafe {
            core::ptr::write_bytes(self.map.as_mut_ptr::<u8>(addr), 0, size);
        }
        Ok(addr)
    }

    /// Returns the run starting at `addr`.
    ///
    /// # Returns
    /// `InvalidArgument` if `addr` does not start a live allocation.
    pub fn free(&self, addr: PhysAddr) -> KernelResult<()> {
        self.inner
            .lock()
            .as_mut()
            .ok_or(KernelError::InvalidArgument)?
            .free(addr)
    }

    /// Free blocks left, zero before initialization.
    pub fn free_blocks(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, Heap::free_blocks)
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > BLOCK_SIZE {
            return core::ptr::null_mut();
        }
        match self.allocate(layout.size().max(1)) {
            Ok(addr) => self.map.as_mut_ptr(addr),
            Err(_) => core::ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if self.free(self.map.to_phys(ptr)).is_err() {
            log::error!("heap: dealloc of unknown pointer {:p}", ptr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn zeroed_allocation_clears_reused_blocks() {
        let heap = testing::heap(4);
        let map = heap.direct_map();
        let addr = heap.allocate(BLOCK_SIZE).unwrap();
        unsafe { core::ptr::write_bytes(map.as_mut_ptr::<u8>(addr), 0xAA, BLOCK_SIZE) };
        heap.free(addr).unwrap();

        let again = heap.allocate_zeroed(BLOCK_SIZE).unwrap();
        assert_eq!(again, addr);
        let bytes =
            unsafe { core::slice::from_raw_parts(map.as_mut_ptr::<u8>(again), BLOCK_SIZE) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_heap_refuses_allocation() {
        let heap = LockedHeap::empty(DirectMap::IDENTITY);
        assert_eq!(heap.allocate(10), Err(KernelError::OutOfMemory));
        assert_eq!(heap.free_blocks(), 0);
    }

    #[test]
    fn global_alloc_interface() {
        let heap = testing::heap(4);
        unsafe {
            let layout = Layout::from_size_align(100, 8).unwrap();
            let ptr = heap.alloc(layout);
            assert!(!ptr.is_null());
            assert_eq!(heap.free_blocks(), 3);
            heap.dealloc(ptr, layout);
            assert_eq!(heap.free_blocks(), 4);

            let huge_align = Layout::from_size_align(16, 2 * BLOCK_SIZE).unwrap();
            assert!(heap.alloc(huge_align).is_null());
        }
    }
}
