//! Interrupt Descriptor Table and the assembly trap stubs.
//!
//! Every vector gets a 16-byte stub that pushes a zero error code (unless
//! the CPU pushed one), the vector number, the data segment and `pushad`,
//! giving the kernel a uniform
//! [`InterruptFrame`](crate::processes::InterruptFrame). The stubs are laid out
//! back to back so vector `n` lives at `ringzero_isr_stubs + 16 * n`.

use super::descriptors::{IdtGate, INTERRUPT_GATE, USER_INTERRUPT_GATE};
use crate::constants::{
    gdt::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR},
    idt::{SYSCALL_VECTOR, TOTAL_INTERRUPTS},
};
use core::arch::{asm, global_asm};
use core::mem::size_of;
use lazy_static::lazy_static;

const STUB_SIZE: u32 = 16;

global_asm!(
    ".section .text",
    ".global ringzero_isr_stubs",
    ".p2align 4",
    "ringzero_isr_stubs:",
    ".set ringzero_vector, 0",
    ".rept 256",
    "    .p2align 4",
    "    .if (ringzero_vector == 8) || (ringzero_vector == 10) || (ringzero_vector == 11) || (ringzero_vector == 12) || (ringzero_vector == 13) || (ringzero_vector == 14) || (ringzero_vector == 17) || (ringzero_vector == 21) || (ringzero_vector == 29) || (ringzero_vector == 30)",
    "    .else",
    "    pushl $0",
    "    .endif",
    "    pushl $ringzero_vector",
    "    jmp ringzero_isr_common",
    "    .set ringzero_vector, ringzero_vector + 1",
    ".endr",
    "",
    "ringzero_isr_common:",
    "    pushl %ds",
    "    pushal",
    "    movw ${kernel_data}, %ax",
    "    movw %ax, %ds",
    "    movw %ax, %es",
    "    pushl %esp",
    "    call {trap}",
    "    addl $4, %esp",
    // only reached when the interrupted code resumes unchanged
    "    movw 32(%esp), %ax",
    "    movw %ax, %es",
    "    popal",
    "    popl %ds",
    "    addl $8, %esp",
    "    iretl",
    kernel_data = const KERNEL_DATA_SELECTOR.0,
    trap = sym crate::init::trap_entry,
    options(att_syntax),
);

extern "C" {
    static ringzero_isr_stubs: u8;
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

lazy_static! {
    static ref IDT: [IdtGate; TOTAL_INTERRUPTS] = {
        let stubs = unsafe { core::ptr::addr_of!(ringzero_isr_stubs) } as u32;
        core::array::from_fn(|vector| {
            let attributes = if vector == SYSCALL_VECTOR {
                USER_INTERRUPT_GATE
            } else {
                INTERRUPT_GATE
            };
            IdtGate::new(
                stubs + vector as u32 * STUB_SIZE,
                KERNEL_CODE_SELECTOR.0,
                attributes,
            )
        })
    };
}

pub fn init() {
    let pointer = DescriptorTablePointer {
        limit: (size_of::<[IdtGate; TOTAL_INTERRUPTS]>() - 1) as u16,
        base: IDT.as_ptr() as u32,
    };
    unsafe {
        asm!("lidt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
    }
    log::info!("idt: {} vectors installed", TOTAL_INTERRUPTS);
}
