//! The syscall gate's command set.

pub mod syscall_handlers;
