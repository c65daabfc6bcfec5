//! Task records: one schedulable register snapshot and its address space.

use super::{process::ProcessId, registers::Registers};
use crate::{
    constants::{
        gdt::{USER_CODE_SELECTOR, USER_DATA_SELECTOR},
        processes::PROGRAM_VIRTUAL_STACK_ADDRESS_START,
    },
    errors::KernelResult,
    memory::{LockedHeap, PageDirectory, PageFlags, VirtAddr},
};

/// Stable handle for a task, never reused while the kernel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(super) u32);

impl TaskId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
pub struct Task {
    id: TaskId,
    process: ProcessId,
    pub(super) directory: PageDirectory,
    pub(super) registers: Registers,
    pub(super) next: Option<TaskId>,
    pub(super) prev: Option<TaskId>,
}

impl Task {
    /// A ring 3 task that starts at `entry` on the fixed user stack, in a
    /// fresh address space that is identity mapped and read only.
    pub(super) fn new(
        heap: &LockedHeap,
        id: TaskId,
        process: ProcessId,
        entry: VirtAddr,
    ) -> KernelResult<Task> {
        let directory = PageDirectory::new(heap, PageFlags::TASK)?;
        let user_data = u32::from(USER_DATA_SELECTOR.0);
        let registers = Registers {
            ip: entry.as_u32(),
            cs: u32::from(USER_CODE_SELECTOR.0),
            ss: user_data,
            esp: PROGRAM_VIRTUAL_STACK_ADDRESS_START,
            ..Registers::default()
        };

        Ok(Task {
            id,
            process,
            directory,
            registers,
            next: None,
            prev: None,
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn process(&self) -> ProcessId {
        self.process
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn directory(&self) -> &PageDirectory {
        &self.directory
    }
}
