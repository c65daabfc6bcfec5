//! Host stand-ins for the machine, shared by the unit tests.
//!
//! Physical memory is an ordinary page-aligned host allocation that pretends
//! to start at [`REGION_START`]; the heap's [`DirectMap`] carries the
//! distance between the two.

use crate::{
    constants::{
        gdt::{USER_CODE_SELECTOR, USER_DATA_SELECTOR},
        memory::{BLOCK_SIZE, ENTRIES_PER_TABLE, PAGE_SIZE},
        processes::{PROGRAM_VIRTUAL_ADDRESS, PROGRAM_VIRTUAL_STACK_ADDRESS_START, USER_PROGRAM_STACK_SIZE},
    },
    devices::Devices,
    kernel::Kernel,
    memory::{
        heap::{BlockEntry, Heap, HeapTable},
        paging::PageEntry,
        DirectMap, LockedHeap, Mmu, PhysAddr, VirtAddr,
    },
    processes::InterruptFrame,
};
use alloc::{boxed::Box, vec, vec::Vec};
use std::alloc::{alloc_zeroed, Layout};

pub const REGION_START: u32 = 0x0100_0000;

/// A kernel heap of `blocks` blocks backed by leaked host memory.
pub fn heap(blocks: usize) -> &'static LockedHeap {
    let size = blocks.max(1) * BLOCK_SIZE;
    let layout = Layout::from_size_align(size, BLOCK_SIZE).unwrap();
    let region = unsafe { alloc_zeroed(layout) };
    assert!(!region.is_null());

    let map = DirectMap::with_offset((region as usize).wrapping_sub(REGION_START as usize));
    let entries = Box::leak(vec![BlockEntry::new(); blocks].into_boxed_slice());
    let start = PhysAddr::new(REGION_START);
    let end = start + (blocks * BLOCK_SIZE) as u32;
    let heap = Heap::create(start, end, HeapTable::new(entries)).unwrap();

    Box::leak(Box::new(LockedHeap::new(map, heap)))
}

pub fn write_phys(heap: &LockedHeap, phys: PhysAddr, bytes: &[u8]) {
    let dest = heap.direct_map().as_mut_ptr::<u8>(phys);
    unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), dest, bytes.len()) };
}

pub fn read_phys(heap: &LockedHeap, phys: PhysAddr, len: usize) -> Vec<u8> {
    let src = heap.direct_map().as_mut_ptr::<u8>(phys);
    unsafe { core::slice::from_raw_parts(src, len) }.to_vec()
}

/// Walks whichever directory was loaded last, like the hardware would.
pub struct SoftMmu {
    map: DirectMap,
    loads: Vec<PhysAddr>,
}

impl SoftMmu {
    pub fn new(map: DirectMap) -> Self {
        Self {
            map,
            loads: Vec::new(),
        }
    }

    /// Every directory loaded so far, oldest first.
    pub fn loads(&self) -> &[PhysAddr] {
        &self.loads
    }

    fn entry(&self, table: PhysAddr, index: usize) -> PageEntry {
        unsafe { PageEntry::from_bits(*self.map.as_mut_ptr::<u32>(table).add(index)) }
    }
}

impl Mmu for SoftMmu {
    fn load_directory(&mut self, root: PhysAddr) {
        self.loads.push(root);
    }

    unsafe fn read_byte(&self, virt: VirtAddr) -> u8 {
        let root = *self.loads.last().expect("no directory loaded");
        let table = self.entry(root, virt.directory_index());
        assert!(table.is_present(), "page fault at {:?}", virt);
        let page = self.entry(table.frame(), virt.table_index());
        assert!(page.is_present(), "page fault at {:?}", virt);

        let phys = page.frame() + virt.page_offset();
        assert!(phys.as_u32() >= REGION_START, "{:?} is outside host memory", phys);
        *self.map.as_mut_ptr::<u8>(phys)
    }
}

#[derive(Default)]
pub struct RecordingDevices {
    pub output: Vec<u8>,
    pub acknowledged: Vec<usize>,
}

impl Devices for RecordingDevices {
    fn acknowledge_interrupt(&mut self, vector: usize) {
        self.acknowledged.push(vector);
    }

    fn put_char(&mut self, byte: u8) {
        self.output.push(byte);
    }
}

pub type TestKernel = Kernel<SoftMmu, RecordingDevices>;

/// Heap blocks one address space takes.
pub const SPACE_BLOCKS: usize = ENTRIES_PER_TABLE + 1;
/// Heap blocks one loaded flat binary of at most a page takes.
pub const PROCESS_BLOCKS: usize = SPACE_BLOCKS + USER_PROGRAM_STACK_SIZE / PAGE_SIZE + 1;

/// A kernel with room for `processes` small flat binaries plus `extra` blocks.
pub fn kernel(processes: usize, extra: usize) -> TestKernel {
    let heap = heap(SPACE_BLOCKS + processes * PROCESS_BLOCKS + extra);
    let mmu = SoftMmu::new(heap.direct_map());
    Kernel::new(heap, mmu, RecordingDevices::default()).unwrap()
}

/// A trap taken from ring 3 at the program entry with an empty stack.
pub fn trap(vector: usize) -> InterruptFrame {
    InterruptFrame {
        vector: vector as u32,
        ip: PROGRAM_VIRTUAL_ADDRESS,
        cs: u32::from(USER_CODE_SELECTOR.0),
        esp: PROGRAM_VIRTUAL_STACK_ADDRESS_START,
        ss: u32::from(USER_DATA_SELECTOR.0),
        ..InterruptFrame::default()
    }
}
