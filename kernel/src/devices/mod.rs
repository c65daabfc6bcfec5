//! Device access used by the kernel core.
//!
//! The core only needs two things from hardware outside the CPU: telling the
//! interrupt controller a vector was handled, and putting a character on the
//! terminal. [`Devices`] is that seam; the machine implementation drives the
//! 8259 PICs and COM1.

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod platform;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod serial;

pub trait Devices {
    /// Signals end of interrupt for `vector`.
    fn acknowledge_interrupt(&mut self, vector: usize);

    /// Writes one byte to the terminal.
    fn put_char(&mut self, byte: u8);
}
