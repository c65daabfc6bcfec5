//! Privileged i386 instructions.

use crate::{
    memory::{Mmu, PhysAddr, VirtAddr},
    processes::Registers,
};
use core::arch::asm;
use core::mem::offset_of;

/// Interrupt enable bit in EFLAGS.
const EFLAGS_IF: u32 = 0x200;

pub unsafe fn outb(port: u16, value: u8) {
    asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
}

pub unsafe fn inb(port: u16) -> u8 {
    let value: u8;
    asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
    value
}

/// Points CR3 at a page directory.
pub unsafe fn load_cr3(root: PhysAddr) {
    asm!("mov cr3, {}", in(reg) root.as_u32(), options(nostack, preserves_flags));
}

/// Sets CR0.PG. A directory must already be loaded.
pub unsafe fn enable_paging() {
    asm!(
        "mov {tmp}, cr0",
        "or {tmp}, 0x80000000",
        "mov cr0, {tmp}",
        tmp = out(reg) _,
        options(nostack),
    );
}

/// The real MMU: CR3 and plain loads through whatever directory is active.
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareMmu;

impl Mmu for HardwareMmu {
    fn load_directory(&mut self, root: PhysAddr) {
        unsafe { load_cr3(root) }
    }

    unsafe fn read_byte(&self, virt: VirtAddr) -> u8 {
        core::ptr::read_volatile(virt.as_usize() as *const u8)
    }
}

pub fn disable_interrupts() {
    unsafe { asm!("cli", options(nomem, nostack)) };
}

pub fn halt_loop() -> ! {
    loop {
        unsafe { asm!("cli; hlt", options(nomem, nostack)) };
    }
}

/// Drops to ring 3 with `regs`, interrupts enabled. The task's address space
/// must already be loaded.
pub unsafe fn task_return(regs: &Registers) -> ! {
    let frame = Registers {
        flags: regs.flags | EFLAGS_IF,
        ..*regs
    };
    asm!(
        "mov ax, word ptr [ecx + {ss}]",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        // iret frame: ss, esp, eflags, cs, eip
        "push dword ptr [ecx + {ss}]",
        "push dword ptr [ecx + {esp}]",
        "push dword ptr [ecx + {flags}]",
        "push dword ptr [ecx + {cs}]",
        "push dword ptr [ecx + {ip}]",
        "mov edi, [ecx + {edi}]",
        "mov esi, [ecx + {esi}]",
        "mov ebp, [ecx + {ebp}]",
        "mov ebx, [ecx + {ebx}]",
        "mov edx, [ecx + {edx}]",
        "mov eax, [ecx + {eax}]",
        "mov ecx, [ecx + {ecx}]",
        "iretd",
        ss = const offset_of!(Registers, ss),
        esp = const offset_of!(Registers, esp),
        flags = const offset_of!(Registers, flags),
        cs = const offset_of!(Registers, cs),
        ip = const offset_of!(Registers, ip),
        edi = const offset_of!(Registers, edi),
        esi = const offset_of!(Registers, esi),
        ebp = const offset_of!(Registers, ebp),
        ebx = const offset_of!(Registers, ebx),
        edx = const offset_of!(Registers, edx),
        eax = const offset_of!(Registers, eax),
        ecx = const offset_of!(Registers, ecx),
        in("ecx") &frame,
        options(noreturn),
    );
}
