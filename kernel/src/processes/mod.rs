//! Tasks, processes and the round-robin scheduler.

pub mod process;
pub mod registers;
pub mod scheduler;
pub mod table;
pub mod task;

pub use process::{ProcessId, ProgramImage};
pub use registers::{InterruptFrame, Registers};
pub use scheduler::Scheduler;
pub use table::ProcessTable;
pub use task::TaskId;
