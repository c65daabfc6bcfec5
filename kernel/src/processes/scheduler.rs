//! Round-robin scheduler.
//!
//! Tasks live in a map keyed by [`TaskId`] and are threaded into a list by
//! handle (`head`/`tail` plus per-task `next`/`prev`). Scheduling order is the
//! list order, wrapping from the tail to the head.
//!
//! The scheduler also owns the [`ActiveDirectory`], so the current task and the
//! loaded address space only ever change together. The one exception is the
//! kernel space, which dispatch loads around every handler with
//! [`Scheduler::kernel_page`] and leaves with [`Scheduler::task_page`].

use super::{
    process::ProcessId,
    registers::{InterruptFrame, Registers},
    task::{Task, TaskId},
};
use crate::{
    constants::memory::PAGE_SIZE,
    errors::{KernelError, KernelResult},
    memory::{
        ActiveDirectory, LockedHeap, Mmu, PageDirectory, PageFlags, PhysAddr, VirtAddr,
    },
};
use alloc::collections::BTreeMap;

pub struct Scheduler<M: Mmu> {
    tasks: BTreeMap<TaskId, Task>,
    head: Option<TaskId>,
    tail: Option<TaskId>,
    current: Option<TaskId>,
    next_id: u32,
    kernel_directory: PageDirectory,
    active: ActiveDirectory<M>,
}

impl<M: Mmu> Scheduler<M> {
    pub fn new(kernel_directory: PageDirectory, mmu: M) -> Self {
        Self {
            tasks: BTreeMap::new(),
            head: None,
            tail: None,
            current: None,
            next_id: 0,
            kernel_directory,
            active: ActiveDirectory::new(mmu),
        }
    }

    /// Creates a task for `process` entering at `entry` and appends it to the
    /// end of the run order. The first task ever queued becomes current.
    pub fn new_task(
        &mut self,
        heap: &LockedHeap,
        process: ProcessId,
        entry: VirtAddr,
    ) -> KernelResult<TaskId> {
        let id = TaskId(self.next_id);
        let mut task = Task::new(heap, id, process, entry)?;
        self.next_id += 1;

        task.prev = self.tail;
        match self.tail {
            Some(tail) => self.task_mut(tail)?.next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.tasks.insert(id, task);

        if self.current.is_none() {
            self.current = Some(id);
        }

        log::debug!("scheduler: task {} created for {:?}", id.as_u32(), process);
        Ok(id)
    }

    /// Unlinks and releases a task. If it was current, its successor becomes
    /// current; if it was the last task, nothing is current afterwards.
    pub fn free_task(&mut self, heap: &LockedHeap, id: TaskId) -> KernelResult<()> {
        let task = self.tasks.remove(&id).ok_or(KernelError::InvalidArgument)?;

        match task.prev {
            Some(prev) => self.task_mut(prev)?.next = task.next,
            None => self.head = task.next,
        }
        match task.next {
            Some(next) => self.task_mut(next)?.prev = task.prev,
            None => self.tail = task.prev,
        }
        if self.current == Some(id) {
            self.current = task.next.or(self.head);
        }

        if self.active.is_active(&task.directory) {
            self.kernel_page();
        }

        log::debug!("scheduler: task {} freed", id.as_u32());
        task.directory.free(heap)
    }

    /// The task whose registers are resumed on the way out of the kernel.
    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    /// The task after the current one, wrapping to the head.
    pub fn next(&self) -> Option<TaskId> {
        self.current
            .and_then(|id| self.tasks.get(&id))
            .and_then(|task| task.next)
            .or(self.head)
    }

    /// Makes `id` current and loads its address space.
    pub fn switch(&mut self, id: TaskId) -> KernelResult<()> {
        let task = self.tasks.get(&id).ok_or(KernelError::InvalidArgument)?;
        self.active.switch(&task.directory);
        self.current = Some(id);
        Ok(())
    }

    /// Switches to the next task in round-robin order and returns the
    /// registers to resume it with.
    ///
    /// # Panics
    /// When no task is left to run.
    pub fn advance_to_next(&mut self) -> Registers {
        let Some(next) = self.next() else {
            panic!("no more tasks");
        };
        self.resume(next)
    }

    /// Switches to the first task in the run order.
    ///
    /// # Panics
    /// When no task has been created.
    pub fn run_first_task(&mut self) -> Registers {
        let Some(head) = self.head else {
            panic!("run_first_task(): no current task exists");
        };
        self.resume(head)
    }

    fn resume(&mut self, id: TaskId) -> Registers {
        match self.switch(id) {
            Ok(()) => self.tasks[&id].registers,
            Err(_) => panic!("task {} vanished from the run list", id.as_u32()),
        }
    }

    /// Stores the trap frame as the task's saved registers.
    pub fn save(&mut self, id: TaskId, frame: &InterruptFrame) -> KernelResult<()> {
        self.task_mut(id)?.registers = Registers::from(frame);
        Ok(())
    }

    /// Stores the trap frame into the current task.
    ///
    /// # Panics
    /// When there is no current task to save into.
    pub fn save_current(&mut self, frame: &InterruptFrame) {
        let Some(id) = self.current else {
            panic!("no current task to save");
        };
        if self.save(id, frame).is_err() {
            panic!("current task {} is not in the task list", id.as_u32());
        }
    }

    /// Loads the kernel's address space.
    pub fn kernel_page(&mut self) {
        self.active.switch(&self.kernel_directory);
    }

    /// Loads the current task's address space, if there is a current task.
    pub fn task_page(&mut self) {
        if let Some(task) = self.current.and_then(|id| self.tasks.get(&id)) {
            self.active.switch(&task.directory);
        }
    }

    /// Loads `id`'s address space without making it current.
    pub fn task_page_task(&mut self, id: TaskId) -> KernelResult<()> {
        let task = self.tasks.get(&id).ok_or(KernelError::InvalidArgument)?;
        self.active.switch(&task.directory);
        Ok(())
    }

    /// Looks a task up by handle; `None` once it has been freed.
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Saved registers of `id`, for syscall results.
    ///
    /// # Returns
    /// `InvalidArgument` if `id` is not a live task.
    pub fn registers_mut(&mut self, id: TaskId) -> KernelResult<&mut Registers> {
        Ok(&mut self.task_mut(id)?.registers)
    }

    /// Page directory of `id`, for mapping process memory.
    ///
    /// # Returns
    /// `InvalidArgument` if `id` is not a live task.
    pub fn directory_mut(&mut self, id: TaskId) -> KernelResult<&mut PageDirectory> {
        Ok(&mut self.task_mut(id)?.directory)
    }

    /// The identity-mapped address space every handler runs in.
    pub fn kernel_directory(&self) -> &PageDirectory {
        &self.kernel_directory
    }

    /// Which directory the MMU has loaded.
    pub fn active(&self) -> &ActiveDirectory<M> {
        &self.active
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run order from the head.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Task> + '_ {
        core::iter::successors(self.head.and_then(|id| self.tasks.get(&id)), |task| {
            task.next.and_then(|id| self.tasks.get(&id))
        })
    }

    /// Copies a NUL-terminated string out of `id`'s address space.
    ///
    /// At most `dest.len()` bytes are copied, stopping after the terminator,
    /// and the string length is returned. A scratch heap page is mapped into
    /// the task at its own address, filled while the task's space is loaded,
    /// then unmapped again from the kernel space.
    pub fn copy_string_from_task(
        &mut self,
        heap: &LockedHeap,
        id: TaskId,
        virt: VirtAddr,
        dest: &mut [u8],
    ) -> KernelResult<usize> {
        let max = dest.len();
        if max > PAGE_SIZE || !self.tasks.contains_key(&id) {
            return Err(KernelError::InvalidArgument);
        }
        if max == 0 {
            return Ok(0);
        }

        let scratch = heap.allocate_zeroed(max)?;
        let copied = self
            .copy_through_scratch(heap, id, virt, scratch, max)
            .map(|len| {
                // SAFETY: the scratch run holds `max` bytes and was filled above
                let src = unsafe {
                    core::slice::from_raw_parts(heap.direct_map().as_mut_ptr::<u8>(scratch), max)
                };
                let n = (len + 1).min(max);
                dest[..n].copy_from_slice(&src[..n]);
                len
            });
        heap.free(scratch).and(copied)
    }

    fn copy_through_scratch(
        &mut self,
        heap: &LockedHeap,
        id: TaskId,
        virt: VirtAddr,
        scratch: PhysAddr,
        max: usize,
    ) -> KernelResult<usize> {
        let scratch_virt = VirtAddr::new(scratch.as_u32());
        let directory = self.directory_mut(id)?;
        let old_entry = directory.entry(scratch_virt)?;
        directory.map(scratch_virt, scratch, PageFlags::KERNEL)?;

        self.task_page_task(id)?;
        let out = heap.direct_map().as_mut_ptr::<u8>(scratch);
        let mut len = 0;
        let mut copied = Ok(());
        while len < max {
            let Some(src) = virt.checked_add(len as u32) else {
                copied = Err(KernelError::InvalidArgument);
                break;
            };
            // SAFETY: the string lives in the task's space, which is loaded
            let byte = unsafe { self.active.read_byte(src) };
            // SAFETY: len < max and the scratch run holds max bytes
            unsafe { *out.add(len) = byte };
            if byte == 0 {
                break;
            }
            len += 1;
        }
        self.kernel_page();

        self.directory_mut(id)?
            .set_entry(scratch_virt, old_entry)
            .map_err(|_| KernelError::IoFailure)?;
        copied.map(|()| len)
    }

    /// Reads the `index`-th 32-bit word of `id`'s user stack, counting up
    /// from its saved stack pointer.
    pub fn stack_item(&mut self, id: TaskId, index: usize) -> KernelResult<u32> {
        let esp = self
            .tasks
            .get(&id)
            .ok_or(KernelError::InvalidArgument)?
            .registers
            .esp;
        // the task picks its own esp; the whole word must sit below 4 GiB
        let item = u32::try_from(index)
            .ok()
            .and_then(|index| index.checked_mul(4))
            .and_then(|offset| VirtAddr::new(esp).checked_add(offset))
            .filter(|item| item.checked_add(3).is_some())
            .ok_or(KernelError::InvalidArgument)?;

        self.task_page_task(id)?;
        let mut bytes = [0u8; 4];
        for (offset, byte) in (0u32..).zip(bytes.iter_mut()) {
            // SAFETY: the user stack is mapped in the task's space
            *byte = unsafe { self.active.read_byte(item + offset) };
        }
        self.kernel_page();

        Ok(u32::from_le_bytes(bytes))
    }

    /// Translates `virt` through `id`'s page directory.
    pub fn virtual_to_physical(&self, id: TaskId, virt: VirtAddr) -> KernelResult<PhysAddr> {
        let task = self.tasks.get(&id).ok_or(KernelError::InvalidArgument)?;
        Ok(task.directory.translate(virt))
    }

    fn task_mut(&mut self, id: TaskId) -> KernelResult<&mut Task> {
        self.tasks.get_mut(&id).ok_or(KernelError::InvalidArgument)
    }
}
