#![cfg_attr(all(target_arch = "x86", target_os = "none"), no_std)]
#![cfg_attr(all(target_arch = "x86", target_os = "none"), no_main)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod boot {
    use core::arch::global_asm;
    use ringzero::{cpu, init, serial_println};

    const MULTIBOOT_MAGIC: u32 = 0x1BAD_B002;
    /// Page-aligned modules and a memory map.
    const MULTIBOOT_FLAGS: u32 = 0x3;
    const BOOT_STACK_SIZE: usize = 16 * 1024;

    global_asm!(
        ".section .multiboot, \"a\"",
        ".p2align 2",
        ".long {magic}",
        ".long {flags}",
        ".long {checksum}",
        "",
        ".section .bss",
        ".p2align 4",
        "ringzero_boot_stack:",
        ".skip {stack_size}",
        "ringzero_boot_stack_top:",
        "",
        ".section .text",
        ".global _start",
        "_start:",
        "    cli",
        "    movl $ringzero_boot_stack_top, %esp",
        "    call {kmain}",
        "1:  hlt",
        "    jmp 1b",
        magic = const MULTIBOOT_MAGIC,
        flags = const MULTIBOOT_FLAGS,
        checksum = const 0u32.wrapping_sub(MULTIBOOT_MAGIC + MULTIBOOT_FLAGS),
        stack_size = const BOOT_STACK_SIZE,
        kmain = sym kmain,
        options(att_syntax),
    );

    extern "C" fn kmain() -> ! {
        serial_println!("Booting ringzero...");
        init::start()
    }

    #[panic_handler]
    fn rust_panic(info: &core::panic::PanicInfo) -> ! {
        serial_println!("Kernel panic: {}", info);
        cpu::halt_loop()
    }
}

/// Built for the host only so the workspace checks; the kernel itself boots
/// from the freestanding target.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn main() {}
