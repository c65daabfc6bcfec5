//! Segment selectors and the privilege-transition stack.
//!
//! The descriptor layout is fixed: null, kernel code, kernel data,
//! user code, user data, task state segment.

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

pub const TOTAL_GDT_SEGMENTS: usize = 6;

pub const KERNEL_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);
pub const KERNEL_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);
pub const USER_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring3);
pub const USER_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(4, PrivilegeLevel::Ring3);
pub const TSS_SELECTOR: SegmentSelector = SegmentSelector::new(5, PrivilegeLevel::Ring0);

/// Stack the CPU switches to when a user task traps into ring 0.
pub const KERNEL_INTERRUPT_STACK: u32 = 0x0060_0000;
