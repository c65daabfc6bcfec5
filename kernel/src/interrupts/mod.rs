//! Interrupt plumbing: descriptor encoding, handler tables and the default
//! handlers everywhere, plus the GDT/IDT/PIC setup on the machine.

pub mod descriptors;
pub mod dispatch;
pub mod handlers;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod gdt;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod idt;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod pic;

/// Loads the GDT and TSS, installs the IDT and remaps the PICs. Interrupts
/// stay disabled until the first task is entered.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    gdt::init();
    idt::init();
    pic::init();
}
