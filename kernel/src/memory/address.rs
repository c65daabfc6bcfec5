//! 32-bit physical and virtual addresses, and the kernel's window onto
//! physical memory.

use crate::constants::memory::{DIRECTORY_ENTRY_SPAN, PAGE_SIZE};
use core::fmt;
use core::ops::{Add, Sub};

macro_rules! address_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(addr: u32) -> Self {
                Self(addr)
            }

            pub const fn as_u32(self) -> u32 {
                self.0
            }

            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }

            pub const fn is_aligned(self, align: usize) -> bool {
                self.0 as usize % align == 0
            }

            pub const fn is_page_aligned(self) -> bool {
                self.is_aligned(PAGE_SIZE)
            }

            pub const fn align_down(self, align: usize) -> Self {
                Self(self.0 - (self.0 % align as u32))
            }

            /// Offset of this address inside its page.
            pub const fn page_offset(self) -> u32 {
                self.0 % PAGE_SIZE as u32
            }

            /// `self + rhs`, or `None` past the top of the 4 GiB space.
            pub const fn checked_add(self, rhs: u32) -> Option<Self> {
                match self.0.checked_add(rhs) {
                    Some(addr) => Some(Self(addr)),
                    None => None,
                }
            }
        }

        impl Add<u32> for $name {
            type Output = Self;

            fn add(self, rhs: u32) -> Self {
                Self(self.0 + rhs)
            }
        }

        impl Sub for $name {
            type Output = u32;

            fn sub(self, rhs: Self) -> u32 {
                self.0 - rhs.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#010x})"), self.0)
            }
        }
    };
}

address_type!(
    /// An address in the flat physical space.
    PhysAddr
);
address_type!(
    /// An address as seen through some page directory.
    VirtAddr
);

impl VirtAddr {
    /// Index into the page directory.
    pub const fn directory_index(self) -> usize {
        self.as_usize() / DIRECTORY_ENTRY_SPAN
    }

    /// Index into the page table selected by [`Self::directory_index`].
    pub const fn table_index(self) -> usize {
        self.as_usize() % DIRECTORY_ENTRY_SPAN / PAGE_SIZE
    }
}

/// How the kernel reaches physical memory from its own address space.
///
/// On the machine the kernel runs identity mapped, so the offset is zero.
/// Host tests back the physical range with an ordinary allocation and
/// store the distance to it here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectMap {
    offset: usize,
}

impl DirectMap {
    pub const IDENTITY: DirectMap = DirectMap { offset: 0 };

    pub const fn with_offset(offset: usize) -> Self {
        Self { offset }
    }

    pub fn as_mut_ptr<T>(&self, phys: PhysAddr) -> *mut T {
        phys.as_usize().wrapping_add(self.offset) as *mut T
    }

    pub fn to_phys<T>(&self, ptr: *const T) -> PhysAddr {
        PhysAddr::new((ptr as usize).wrapping_sub(self.offset) as u32)
    }
}
