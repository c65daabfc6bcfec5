//! Physical memory and address spaces.

pub mod address;
pub mod heap;
pub mod kheap;
pub mod paging;

pub use address::{DirectMap, PhysAddr, VirtAddr};
pub use kheap::LockedHeap;
pub use paging::{ActiveDirectory, Mmu, PageDirectory, PageFlags};
