//! Flat segmentation and the task state segment.
//!
//! Kernel and user code/data segments all span the full 4 GiB; the TSS only
//! supplies the ring 0 stack used when a user task traps.

use super::descriptors::Segment;
use crate::constants::gdt::{
    KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR, KERNEL_INTERRUPT_STACK, TOTAL_GDT_SEGMENTS,
    TSS_SELECTOR,
};
use core::arch::asm;
use core::mem::size_of;
use lazy_static::lazy_static;

/// The i386 task state segment. Only `esp0`/`ss0` and the I/O map base are
/// used.
#[derive(Debug, Default)]
#[repr(C)]
pub struct TaskStateSegment {
    link: u32,
    esp0: u32,
    ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldtr: u32,
    trap: u16,
    iomap_base: u16,
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

lazy_static! {
    static ref TSS: TaskStateSegment = TaskStateSegment {
        esp0: KERNEL_INTERRUPT_STACK,
        ss0: u32::from(KERNEL_DATA_SELECTOR.0),
        iomap_base: size_of::<TaskStateSegment>() as u16,
        ..TaskStateSegment::default()
    };

    static ref GDT: [[u8; 8]; TOTAL_GDT_SEGMENTS] = {
        let tss = &*TSS as *const TaskStateSegment as u32;
        [
            Segment::NULL,
            Segment::new(0, 0xFFFF_FFFF, 0x9A), // kernel code
            Segment::new(0, 0xFFFF_FFFF, 0x92), // kernel data
            Segment::new(0, 0xFFFF_FFFF, 0xF8), // user code
            Segment::new(0, 0xFFFF_FFFF, 0xF2), // user data
            Segment::new(tss, size_of::<TaskStateSegment>() as u32 - 1, 0xE9),
        ]
        .map(|segment| segment.encode())
    };
}

/// Loads the GDT, reloads every segment register, and loads the TSS.
pub fn init() {
    let pointer = DescriptorTablePointer {
        limit: (size_of::<[[u8; 8]; TOTAL_GDT_SEGMENTS]>() - 1) as u16,
        base: GDT.as_ptr() as u32,
    };

    unsafe {
        asm!("lgdt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
        asm!(
            "mov ds, {data:x}",
            "mov es, {data:x}",
            "mov fs, {data:x}",
            "mov gs, {data:x}",
            "mov ss, {data:x}",
            "push {code}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            data = in(reg) KERNEL_DATA_SELECTOR.0,
            code = const KERNEL_CODE_SELECTOR.0,
            tmp = out(reg) _,
        );
        asm!("ltr {0:x}", in(reg) TSS_SELECTOR.0, options(nostack, preserves_flags));
    }
    log::info!("gdt: loaded {} segments", TOTAL_GDT_SEGMENTS);
}
