//! The kernel core: heap, scheduler, processes, and the trap entry points
//! that tie them together.
//!
//! Every trap is handled synchronously and answers with a [`Resume`] telling
//! the entry stub what to return to. Handlers always run in the kernel's
//! address space; the (possibly different) current task's space is loaded
//! again before returning.

use crate::{
    constants::{
        idt::{TOTAL_INTERRUPTS, SYSCALL_VECTOR},
        syscalls::MAX_SYSCALL_COMMANDS,
    },
    devices::Devices,
    errors::{KernelError, KernelResult},
    interrupts::{dispatch::HandlerTable, handlers},
    memory::{LockedHeap, Mmu, PageDirectory, PageFlags, VirtAddr},
    processes::{
        InterruptFrame, ProcessId, ProcessTable, ProgramImage, Registers, Scheduler, TaskId,
    },
    syscalls::syscall_handlers,
};

pub type InterruptCallback<M, D> = fn(&mut Kernel<M, D>, &InterruptFrame);
pub type SyscallCommand<M, D> = fn(&mut Kernel<M, D>, &InterruptFrame) -> u32;

/// What a trap entry stub does after the kernel has handled the trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Nothing handled the vector; return to the interrupted code as is.
    Interrupted,
    /// Drop into ring 3 with these registers. Their task's address space is
    /// already loaded.
    Task(Registers),
}

pub struct Kernel<M: Mmu, D: Devices> {
    heap: &'static LockedHeap,
    scheduler: Scheduler<M>,
    processes: ProcessTable,
    interrupts: HandlerTable<InterruptCallback<M, D>>,
    syscalls: HandlerTable<SyscallCommand<M, D>>,
    devices: D,
}

impl<M: Mmu, D: Devices> Kernel<M, D> {
    /// Builds the kernel address space, loads it, and installs the default
    /// exception, timer and syscall handlers.
    pub fn new(heap: &'static LockedHeap, mmu: M, devices: D) -> KernelResult<Self> {
        let kernel_directory = PageDirectory::new(heap, PageFlags::KERNEL)?;
        let mut scheduler = Scheduler::new(kernel_directory, mmu);
        scheduler.kernel_page();

        let mut kernel = Kernel {
            heap,
            scheduler,
            processes: ProcessTable::new(),
            interrupts: HandlerTable::new("interrupt", TOTAL_INTERRUPTS),
            syscalls: HandlerTable::new("syscall", MAX_SYSCALL_COMMANDS),
            devices,
        };
        handlers::register_defaults(&mut kernel);
        syscall_handlers::register_commands(&mut kernel);
        Ok(kernel)
    }

    pub fn register_interrupt(&mut self, vector: usize, callback: InterruptCallback<M, D>) {
        if vector == SYSCALL_VECTOR {
            panic!("interrupt {:#x} is reserved for syscalls", vector);
        }
        self.interrupts.register(vector, callback);
    }

    pub fn register_syscall(&mut self, command: usize, handler: SyscallCommand<M, D>) {
        self.syscalls.register(command, handler);
    }

    /// Entry for every hardware interrupt and exception.
    pub fn handle_interrupt(&mut self, frame: &InterruptFrame) -> Resume {
        let vector = frame.vector as usize;
        self.scheduler.kernel_page();
        let callback = self.interrupts.get(vector);
        if let Some(callback) = callback {
            self.scheduler.save_current(frame);
            callback(self, frame);
        }
        self.scheduler.task_page();
        self.devices.acknowledge_interrupt(vector);

        match callback {
            Some(_) => Resume::Task(self.current_registers()),
            None => Resume::Interrupted,
        }
    }

    /// Entry for the syscall gate. The command number is in `eax`; the
    /// result is returned to the caller in `eax`.
    pub fn handle_syscall(&mut self, frame: &InterruptFrame) -> Resume {
        self.scheduler.kernel_page();
        self.scheduler.save_current(frame);
        let caller = self.scheduler.current();

        let result = self
            .syscalls
            .get(frame.eax as usize)
            .map_or(0, |command| command(self, frame));

        // the caller may have exited
        if let Some(caller) = caller.filter(|&id| self.scheduler.current() == Some(id)) {
            if let Ok(registers) = self.scheduler.registers_mut(caller) {
                registers.eax = result;
            }
        }
        self.scheduler.task_page();

        Resume::Task(self.current_registers())
    }

    /// Registers of the current task.
    ///
    /// # Panics
    /// When no task is left to run.
    pub fn current_registers(&self) -> Registers {
        match self.scheduler.current().and_then(|id| self.scheduler.task(id)) {
            Some(task) => *task.registers(),
            None => panic!("no more tasks"),
        }
    }

    /// Enters the first loaded task.
    pub fn run_first_task(&mut self) -> Registers {
        self.scheduler.run_first_task()
    }

    pub fn load_process(&mut self, filename: &str, image: ProgramImage) -> KernelResult<ProcessId> {
        self.processes
            .load(&mut self.scheduler, self.heap, filename, image)
    }

    /// Copies `bytes` into the heap and loads them as a flat binary.
    pub fn load_flat_binary(&mut self, filename: &str, bytes: &[u8]) -> KernelResult<ProcessId> {
        let heap = self.heap;
        let image = ProgramImage::flat_binary(heap, bytes)?;
        self.load_process(filename, image).inspect_err(|_| {
            let _ = image.release(heap);
        })
    }

    pub fn terminate_process(&mut self, id: ProcessId) -> KernelResult<()> {
        self.processes
            .terminate(&mut self.scheduler, self.heap, id)
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.scheduler.current()
    }

    pub fn current_process(&self) -> Option<ProcessId> {
        let task = self.scheduler.task(self.scheduler.current()?)?;
        Some(task.process())
    }

    /// Terminates whatever process owns the current task. Its successor in
    /// the run order becomes current.
    pub fn terminate_current(&mut self) -> KernelResult<()> {
        let id = self.current_process().ok_or(KernelError::InvalidArgument)?;
        self.terminate_process(id)
    }

    /// Delivers a key press to the current process.
    pub fn push_input(&mut self, byte: u8) {
        if let Some(input) = self
            .current_process()
            .and_then(|id| self.processes.input_mut(id))
        {
            input.push(byte);
        }
    }

    pub fn backspace_input(&mut self) {
        if let Some(input) = self
            .current_process()
            .and_then(|id| self.processes.input_mut(id))
        {
            input.backspace();
        }
    }

    pub fn pop_input(&mut self) -> u8 {
        self.current_process()
            .and_then(|id| self.processes.input_mut(id))
            .map_or(0, |input| input.pop())
    }

    /// The `index`-th word on the current task's stack.
    pub fn stack_item(&mut self, index: usize) -> KernelResult<u32> {
        let task = self.scheduler.current().ok_or(KernelError::InvalidArgument)?;
        self.scheduler.stack_item(task, index)
    }

    pub fn copy_string_from_current(
        &mut self,
        virt: VirtAddr,
        dest: &mut [u8],
    ) -> KernelResult<usize> {
        let task = self.scheduler.current().ok_or(KernelError::InvalidArgument)?;
        self.scheduler
            .copy_string_from_task(self.heap, task, virt, dest)
    }

    pub fn process_malloc(&mut self, id: ProcessId, size: usize) -> KernelResult<VirtAddr> {
        self.processes
            .malloc(&mut self.scheduler, self.heap, id, size)
    }

    pub fn process_free(&mut self, id: ProcessId, ptr: VirtAddr) -> KernelResult<()> {
        self.processes
            .free(&mut self.scheduler, self.heap, id, ptr)
    }

    pub fn inject_arguments(&mut self, id: ProcessId, arguments: &[&str]) -> KernelResult<()> {
        self.processes
            .inject_arguments(&mut self.scheduler, self.heap, id, arguments)
    }

    pub fn heap(&self) -> &'static LockedHeap {
        self.heap
    }

    pub fn scheduler(&self) -> &Scheduler<M> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<M> {
        &mut self.scheduler
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    pub fn devices(&self) -> &D {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut D {
        &mut self.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::{
            idt::TIMER_VECTOR,
            processes::{IDLE_LOOP, PROGRAM_VIRTUAL_STACK_ADDRESS_START},
            syscalls::{SYSCALL_EXIT, SYSCALL_SUM},
        },
        testing::{self, kernel, TestKernel},
    };

    fn trap(vector: usize) -> InterruptFrame {
        testing::trap(vector)
    }

    fn record(kernel: &mut TestKernel, _frame: &InterruptFrame) {
        kernel.devices_mut().output.push(b'!');
    }

    #[test]
    fn timer_rotates_through_processes() {
        let mut kernel = kernel(3, 0);
        let ids: alloc::vec::Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|name| kernel.load_flat_binary(name, IDLE_LOOP).unwrap())
            .collect();
        kernel.run_first_task();

        let mut order = alloc::vec::Vec::new();
        for _ in 0..4 {
            let resume = kernel.handle_interrupt(&trap(TIMER_VECTOR));
            assert!(matches!(resume, Resume::Task(_)));
            order.push(kernel.current_process().unwrap());
        }
        assert_eq!(order, [ids[1], ids[2], ids[0], ids[1]]);
        assert_eq!(kernel.devices().acknowledged, [TIMER_VECTOR; 4]);
    }

    #[test]
    fn handlers_run_in_the_kernel_space() {
        let mut kernel = kernel(1, 0);
        kernel.load_flat_binary("a", IDLE_LOOP).unwrap();
        kernel.run_first_task();
        let task = kernel.current_task().unwrap();
        let task_root = kernel.scheduler().task(task).unwrap().directory().root();
        let kernel_root = kernel.scheduler().kernel_directory().root();

        kernel.register_interrupt(0x21, record);
        let before = kernel.scheduler().active().mmu().loads().len();
        kernel.handle_interrupt(&trap(0x21));

        let loads = &kernel.scheduler().active().mmu().loads()[before..];
        assert_eq!(loads, [kernel_root, task_root]);
        assert_eq!(kernel.devices().output, b"!");
        assert_eq!(kernel.devices().acknowledged, [0x21]);
    }

    #[test]
    fn unhandled_vectors_return_to_the_interrupted_code() {
        let mut kernel = kernel(1, 0);
        kernel.load_flat_binary("a", IDLE_LOOP).unwrap();
        kernel.run_first_task();

        assert_eq!(kernel.handle_interrupt(&trap(0x2E)), Resume::Interrupted);
        assert_eq!(kernel.devices().acknowledged, [0x2E]);
    }

    #[test]
    fn interrupt_saves_the_interrupted_registers() {
        let mut kernel = kernel(1, 0);
        kernel.load_flat_binary("a", IDLE_LOOP).unwrap();
        kernel.run_first_task();

        let frame = InterruptFrame {
            eax: 0x1234,
            ip: 0x0040_0001,
            ..trap(TIMER_VECTOR)
        };
        let Resume::Task(regs) = kernel.handle_interrupt(&frame) else {
            panic!("expected a task to resume");
        };
        assert_eq!(regs.eax, 0x1234);
        assert_eq!(regs.ip, 0x0040_0001);
    }

    #[test]
    fn faults_terminate_the_process_and_resume_the_next() {
        let mut kernel = kernel(2, 0);
        let a = kernel.load_flat_binary("a", IDLE_LOOP).unwrap();
        let b = kernel.load_flat_binary("b", IDLE_LOOP).unwrap();
        kernel.run_first_task();

        // general protection fault in `a`
        let resume = kernel.handle_interrupt(&trap(0x0D));
        assert!(matches!(resume, Resume::Task(_)));
        assert!(kernel.processes().get(a).is_none());
        assert_eq!(kernel.current_process(), Some(b));
        let root = kernel.scheduler().task(kernel.current_task().unwrap()).unwrap();
        assert!(kernel.scheduler().active().is_active(root.directory()));
    }

    #[test]
    #[should_panic(expected = "no more tasks")]
    fn faulting_the_last_process_is_fatal() {
        let mut kernel = kernel(1, 0);
        kernel.load_flat_binary("a", IDLE_LOOP).unwrap();
        kernel.run_first_task();
        kernel.handle_interrupt(&trap(0x0E));
    }

    #[test]
    fn syscall_results_land_in_eax() {
        let mut kernel = kernel(1, 0);
        kernel.load_flat_binary("a", IDLE_LOOP).unwrap();
        kernel.run_first_task();

        let frame = InterruptFrame {
            eax: SYSCALL_SUM as u32,
            ..trap(SYSCALL_VECTOR)
        };
        // both arguments read as zero from the fresh stack page below the top
        let frame = InterruptFrame {
            esp: PROGRAM_VIRTUAL_STACK_ADDRESS_START - 8,
            ..frame
        };
        let Resume::Task(regs) = kernel.handle_syscall(&frame) else {
            panic!("expected a task to resume");
        };
        assert_eq!(regs.eax, 0);
    }

    #[test]
    fn unknown_syscalls_return_zero() {
        let mut kernel = kernel(1, 0);
        kernel.load_flat_binary("a", IDLE_LOOP).unwrap();
        kernel.run_first_task();

        for command in [7, 500, MAX_SYSCALL_COMMANDS, u32::MAX as usize] {
            let frame = InterruptFrame {
                eax: command as u32,
                ..trap(SYSCALL_VECTOR)
            };
            assert!(matches!(
                kernel.handle_syscall(&frame),
                Resume::Task(Registers { eax: 0, .. })
            ));
        }
        assert!(kernel.devices().acknowledged.is_empty());
    }

    #[test]
    fn exit_resumes_the_next_task_without_touching_it() {
        let mut kernel = kernel(2, 0);
        let a = kernel.load_flat_binary("a", IDLE_LOOP).unwrap();
        let b = kernel.load_flat_binary("b", IDLE_LOOP).unwrap();
        kernel.run_first_task();
        let b_task = kernel.processes().get(b).unwrap().task();
        let b_regs = *kernel.scheduler().task(b_task).unwrap().registers();

        let frame = InterruptFrame {
            eax: SYSCALL_EXIT as u32,
            ..trap(SYSCALL_VECTOR)
        };
        assert_eq!(kernel.handle_syscall(&frame), Resume::Task(b_regs));
        assert!(kernel.processes().get(a).is_none());
        assert_eq!(kernel.current_process(), Some(b));
    }

    #[test]
    #[should_panic(expected = "already taken")]
    fn default_vectors_cannot_be_replaced() {
        let mut kernel = kernel(0, 0);
        kernel.register_interrupt(TIMER_VECTOR, record);
    }

    #[test]
    #[should_panic(expected = "reserved for syscalls")]
    fn syscall_vector_is_not_an_interrupt_callback() {
        let mut kernel = kernel(0, 0);
        kernel.register_interrupt(SYSCALL_VECTOR, record);
    }

    #[test]
    fn input_goes_to_the_current_process() {
        let mut kernel = kernel(2, 0);
        let a = kernel.load_flat_binary("a", IDLE_LOOP).unwrap();
        kernel.load_flat_binary("b", IDLE_LOOP).unwrap();
        kernel.run_first_task();

        kernel.push_input(b'q');
        kernel.push_input(b'w');
        kernel.backspace_input();
        kernel.handle_interrupt(&trap(TIMER_VECTOR));
        assert_eq!(kernel.pop_input(), 0);
        kernel.handle_interrupt(&trap(TIMER_VECTOR));
        assert_eq!(kernel.current_process(), Some(a));
        assert_eq!(kernel.pop_input(), b'q');
        assert_eq!(kernel.pop_input(), 0);
    }

    #[test]
    fn failed_flat_binary_load_releases_the_image() {
        let mut kernel = kernel(0, 2);
        let free = kernel.heap().free_blocks();
        assert_eq!(
            kernel.load_flat_binary("a", IDLE_LOOP),
            Err(KernelError::OutOfMemory)
        );
        assert_eq!(kernel.heap().free_blocks(), free);
    }
}
