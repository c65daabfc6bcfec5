//! Recoverable kernel errors.
//!
//! Conditions the kernel cannot continue from (no task left to run, a vector
//! registered twice, an unrepresentable segment limit) are panics instead.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    /// No free run was long enough, or a fixed-size table is full.
    #[error("out of memory")]
    OutOfMemory,
    /// Misaligned address, unknown handle, or an oversized request.
    #[error("invalid argument")]
    InvalidArgument,
    /// A collaborator failed to read or restore data.
    #[error("i/o failure")]
    IoFailure,
}

pub type KernelResult<T> = Result<T, KernelError>;
