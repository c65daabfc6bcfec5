#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]
extern crate alloc;

pub mod constants;
pub mod devices;
pub mod errors;
pub mod interrupts;
pub mod kernel;
pub mod memory;
pub mod processes;
pub mod syscalls;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod cpu;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod init;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod logging;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use devices::serial;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod prelude {
    pub use crate::serial_print;
    pub use crate::serial_println;
}
