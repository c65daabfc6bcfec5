//! The process table: fixed slots, one per process id.

use super::{
    process::{
        InputBuffer, Process, ProcessAllocation, ProcessArguments, ProcessId, ProgramImage,
    },
    scheduler::Scheduler,
    task::TaskId,
};
use crate::{
    constants::{
        memory::PAGE_SIZE,
        processes::{
            MAX_ARGUMENT_LENGTH, MAX_PATH, MAX_PROCESSES, PROGRAM_VIRTUAL_STACK_ADDRESS_END,
            USER_PROGRAM_STACK_SIZE,
        },
    },
    errors::{KernelError, KernelResult},
    memory::{LockedHeap, Mmu, PageFlags, PhysAddr, VirtAddr},
};
use alloc::{boxed::Box, vec::Vec};
use arrayvec::{ArrayString, ArrayVec};

/// Every live process, indexed by [`ProcessId`].
pub struct ProcessTable {
    slots: [Option<Box<Process>>; MAX_PROCESSES],
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    /// The process in slot `id`, if one is loaded there.
    pub fn get(&self, id: ProcessId) -> Option<&Process> {
        self.slots.get(id.as_usize())?.as_deref()
    }

    /// Mutable access to the process in slot `id`.
    pub fn get_mut(&mut self, id: ProcessId) -> Option<&mut Process> {
        self.slots.get_mut(id.as_usize())?.as_deref_mut()
    }

    /// Keyboard buffer of process `id`.
    pub fn input_mut(&mut self, id: ProcessId) -> Option<&mut InputBuffer> {
        self.get_mut(id).map(Process::input_mut)
    }

    /// Loaded processes in slot order.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Process> + '_ {
        self.slots.iter().filter_map(Option::as_deref)
    }

    /// Creates a process for `image` in the first free slot.
    ///
    /// The image is mapped at its virtual base and a zeroed stack is mapped
    /// below the initial stack pointer, both writable from ring 3. On failure
    /// everything built so far is released; the image itself stays with the
    /// caller.
    pub fn load<M: Mmu>(
        &mut self,
        scheduler: &mut Scheduler<M>,
        heap: &LockedHeap,
        filename: &str,
        image: ProgramImage,
    ) -> KernelResult<ProcessId> {
        let filename = ArrayString::<MAX_PATH>::from(filename).map_err(|_| KernelError::InvalidArgument)?;
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::OutOfMemory)?;
        let id = ProcessId::new(slot as u16);

        let stack = heap.allocate_zeroed(USER_PROGRAM_STACK_SIZE)?;
        let task = match scheduler.new_task(heap, id, image.entry) {
            Ok(task) => task,
            Err(e) => {
                let _ = heap.free(stack);
                return Err(e);
            }
        };
        if let Err(e) = Self::map_memory(scheduler, task, &image, stack) {
            let _ = scheduler.free_task(heap, task);
            let _ = heap.free(stack);
            return Err(e);
        }

        self.slots[slot] = Some(Box::new(Process {
            id,
            filename,
            task,
            image,
            stack,
            allocations: ArrayVec::new(),
            input: InputBuffer::new(),
            arguments: Vec::new(),
            argv: None,
        }));

        log::info!("process {}: loaded {}", slot, filename);
        Ok(id)
    }

    fn map_memory<M: Mmu>(
        scheduler: &mut Scheduler<M>,
        task: TaskId,
        image: &ProgramImage,
        stack: PhysAddr,
    ) -> KernelResult<()> {
        let directory = scheduler.directory_mut(task)?;
        directory.map_to(
            image.virtual_base,
            image.physical_base,
            image.physical_end,
            PageFlags::USER_WRITABLE,
        )?;
        directory.map_to(
            VirtAddr::new(PROGRAM_VIRTUAL_STACK_ADDRESS_END),
            stack,
            stack + USER_PROGRAM_STACK_SIZE as u32,
            PageFlags::USER_WRITABLE,
        )
    }

    /// Releases everything the process owns and empties its slot. Every
    /// release is attempted; the first failure is reported.
    pub fn terminate<M: Mmu>(
        &mut self,
        scheduler: &mut Scheduler<M>,
        heap: &LockedHeap,
        id: ProcessId,
    ) -> KernelResult<()> {
        let process = self
            .slots
            .get_mut(id.as_usize())
            .and_then(Option::take)
            .ok_or(KernelError::InvalidArgument)?;

        let allocations = process
            .allocations
            .iter()
            .map(|allocation| heap.free(PhysAddr::new(allocation.ptr.as_u32())))
            .fold(Ok(()), KernelResult::and);

        log::info!("process {}: terminated {}", id.as_usize(), process.filename);
        allocations
            .and(process.image.release(heap))
            .and(heap.free(process.stack))
            .and(scheduler.free_task(heap, process.task))
    }

    /// Hands the process `size` zeroed bytes, identity mapped and writable
    /// from ring 3.
    ///
    /// # Returns
    /// The address the process sees, or `OutOfMemory` when the heap or the
    /// process's allocation table is full.
    pub fn malloc<M: Mmu>(
        &mut self,
        scheduler: &mut Scheduler<M>,
        heap: &LockedHeap,
        id: ProcessId,
        size: usize,
    ) -> KernelResult<VirtAddr> {
        let process = self.get_mut(id).ok_or(KernelError::InvalidArgument)?;
        let phys = heap.allocate_zeroed(size)?;
        let ptr = VirtAddr::new(phys.as_u32());

        if process
            .allocations
            .try_push(ProcessAllocation { ptr, size })
            .is_err()
        {
            let _ = heap.free(phys);
            return Err(KernelError::OutOfMemory);
        }

        let end = phys + size.next_multiple_of(PAGE_SIZE) as u32;
        let mapped = scheduler
            .directory_mut(process.task)
            .and_then(|directory| directory.map_to(ptr, phys, end, PageFlags::USER_WRITABLE));
        if let Err(e) = mapped {
            process.allocations.pop();
            let _ = heap.free(phys);
            return Err(e);
        }
        Ok(ptr)
    }

    /// Takes back memory handed out by [`Self::malloc`].
    ///
    /// # Returns
    /// `InvalidArgument`, with nothing unmapped, if `ptr` is not one of the
    /// process's allocations.
    pub fn free<M: Mmu>(
        &mut self,
        scheduler: &mut Scheduler<M>,
        heap: &LockedHeap,
        id: ProcessId,
        ptr: VirtAddr,
    ) -> KernelResult<()> {
        let process = self.get_mut(id).ok_or(KernelError::InvalidArgument)?;
        let index = process.find_allocation(ptr)?;
        let allocation = process.allocations[index];
        let phys = PhysAddr::new(ptr.as_u32());

        scheduler.directory_mut(process.task)?.map_to(
            ptr,
            phys,
            phys + allocation.size.next_multiple_of(PAGE_SIZE) as u32,
            PageFlags::EMPTY,
        )?;
        process.allocations.swap_remove(index);
        heap.free(phys)
    }

    /// Stores `arguments` and lays them out in the process's memory as an
    /// array of pointers to NUL-terminated strings.
    pub fn inject_arguments<M: Mmu>(
        &mut self,
        scheduler: &mut Scheduler<M>,
        heap: &LockedHeap,
        id: ProcessId,
        arguments: &[&str],
    ) -> KernelResult<()> {
        let parsed = arguments
            .iter()
            .map(|argument| ArrayString::from(argument))
            .collect::<Result<Vec<ArrayString<MAX_ARGUMENT_LENGTH>>, _>>()
            .map_err(|_| KernelError::InvalidArgument)?;
        if parsed.is_empty() {
            return Ok(());
        }

        let argv = self.malloc(scheduler, heap, id, parsed.len() * 4)?;
        let map = heap.direct_map();
        for (index, argument) in parsed.iter().enumerate() {
            let string = self.malloc(scheduler, heap, id, argument.len() + 1)?;
            // SAFETY: both runs were just handed out with room for these writes
            unsafe {
                let dest = map.as_mut_ptr::<u8>(PhysAddr::new(string.as_u32()));
                core::ptr::copy_nonoverlapping(argument.as_ptr(), dest, argument.len());
                let slot = map.as_mut_ptr::<u32>(PhysAddr::new(argv.as_u32())).add(index);
                slot.write_unaligned(string.as_u32());
            }
        }

        let process = self.get_mut(id).ok_or(KernelError::InvalidArgument)?;
        process.arguments = parsed;
        process.argv = Some(argv);
        Ok(())
    }

    /// Where the injected `argc`/`argv` live in the process's memory.
    ///
    /// # Returns
    /// `InvalidArgument` if `id` is not loaded.
    pub fn arguments(&self, id: ProcessId) -> KernelResult<ProcessArguments> {
        self.get(id)
            .map(Process::argv)
            .ok_or(KernelError::InvalidArgument)
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
