//! Interrupt Descriptor Table configuration.

pub const TOTAL_INTERRUPTS: usize = 256;

/// Vectors below this are CPU exceptions.
pub const EXCEPTION_VECTORS: usize = 0x20;

/// Vector number assigned to the timer interrupt (IRQ0 after remapping).
pub const TIMER_VECTOR: usize = 0x20;
pub const SYSCALL_VECTOR: usize = 0x80;

/// Where the master and slave PICs deliver IRQ0 and IRQ8.
pub const PIC_MASTER_OFFSET: u8 = 0x20;
pub const PIC_SLAVE_OFFSET: u8 = 0x28;
