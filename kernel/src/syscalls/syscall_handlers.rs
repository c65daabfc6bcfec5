//! Syscall commands.
//!
//! Arguments are pushed on the caller's stack; `stack_item(0)` is the first.
//! Every command answers with a 32-bit value in `eax`, and failures answer 0.

use crate::{
    constants::{
        memory::PAGE_SIZE,
        syscalls::{
            PRINT_BUFFER_SIZE, SYSCALL_EXIT, SYSCALL_FREE, SYSCALL_GETKEY, SYSCALL_GET_ARGUMENTS,
            SYSCALL_MALLOC, SYSCALL_PRINT, SYSCALL_PUTCHAR, SYSCALL_SUM,
        },
    },
    devices::Devices,
    errors::{KernelError, KernelResult},
    kernel::Kernel,
    memory::{Mmu, PhysAddr, VirtAddr},
    processes::{InterruptFrame, ProcessId},
};

pub fn register_commands<M: Mmu, D: Devices>(kernel: &mut Kernel<M, D>) {
    kernel.register_syscall(SYSCALL_SUM, sys_sum);
    kernel.register_syscall(SYSCALL_PRINT, sys_print);
    kernel.register_syscall(SYSCALL_GETKEY, sys_getkey);
    kernel.register_syscall(SYSCALL_PUTCHAR, sys_putchar);
    kernel.register_syscall(SYSCALL_MALLOC, sys_malloc);
    kernel.register_syscall(SYSCALL_FREE, sys_free);
    kernel.register_syscall(SYSCALL_GET_ARGUMENTS, sys_get_arguments);
    kernel.register_syscall(SYSCALL_EXIT, sys_exit);
}

fn or_zero(result: KernelResult<u32>) -> u32 {
    result.unwrap_or_else(|e| {
        log::debug!("syscall failed: {}", e);
        0
    })
}

fn current_process<M: Mmu, D: Devices>(kernel: &Kernel<M, D>) -> KernelResult<ProcessId> {
    kernel.current_process().ok_or(KernelError::InvalidArgument)
}

fn sys_sum<M: Mmu, D: Devices>(kernel: &mut Kernel<M, D>, _frame: &InterruptFrame) -> u32 {
    or_zero((|| -> KernelResult<u32> {
        let b = kernel.stack_item(1)?;
        let a = kernel.stack_item(0)?;
        Ok(a.wrapping_add(b))
    })())
}

fn sys_print<M: Mmu, D: Devices>(kernel: &mut Kernel<M, D>, _frame: &InterruptFrame) -> u32 {
    let mut buf = [0u8; PRINT_BUFFER_SIZE];
    let printed = kernel.stack_item(0).and_then(|message| {
        kernel.copy_string_from_current(VirtAddr::new(message), &mut buf)
    });
    if let Ok(len) = printed {
        for &byte in &buf[..len] {
            kernel.devices_mut().put_char(byte);
        }
    }
    0
}

fn sys_getkey<M: Mmu, D: Devices>(kernel: &mut Kernel<M, D>, _frame: &InterruptFrame) -> u32 {
    u32::from(kernel.pop_input())
}

fn sys_putchar<M: Mmu, D: Devices>(kernel: &mut Kernel<M, D>, _frame: &InterruptFrame) -> u32 {
    if let Ok(c) = kernel.stack_item(0) {
        kernel.devices_mut().put_char(c as u8);
    }
    0
}

fn sys_malloc<M: Mmu, D: Devices>(kernel: &mut Kernel<M, D>, _frame: &InterruptFrame) -> u32 {
    or_zero((|| -> KernelResult<u32> {
        let size = kernel.stack_item(0)? as usize;
        let process = current_process(kernel)?;
        Ok(kernel.process_malloc(process, size)?.as_u32())
    })())
}

fn sys_free<M: Mmu, D: Devices>(kernel: &mut Kernel<M, D>, _frame: &InterruptFrame) -> u32 {
    or_zero((|| -> KernelResult<u32> {
        let ptr = VirtAddr::new(kernel.stack_item(0)?);
        let process = current_process(kernel)?;
        kernel.process_free(process, ptr)?;
        Ok(0)
    })())
}

/// Fills the caller's `{ argc, argv }` pair.
fn sys_get_arguments<M: Mmu, D: Devices>(
    kernel: &mut Kernel<M, D>,
    _frame: &InterruptFrame,
) -> u32 {
    or_zero((|| -> KernelResult<u32> {
        let out = VirtAddr::new(kernel.stack_item(0)?);
        let process = current_process(kernel)?;
        let arguments = kernel.processes().arguments(process)?;
        let dest = user_writable(kernel, out, 8)?;

        let argv = arguments.argv.map_or(0, VirtAddr::as_u32);
        let ptr = kernel.heap().direct_map().as_mut_ptr::<u32>(dest);
        // SAFETY: both words were checked to be mapped writable for the caller
        unsafe {
            ptr.write_unaligned(arguments.argc);
            ptr.add(1).write_unaligned(argv);
        }
        Ok(0)
    })())
}

fn sys_exit<M: Mmu, D: Devices>(kernel: &mut Kernel<M, D>, _frame: &InterruptFrame) -> u32 {
    if let Err(e) = kernel.terminate_current() {
        log::error!("exit: {}", e);
    }
    0
}

/// Resolves `len` bytes at `virt` in the current task to a physical address,
/// provided the task could write them itself.
fn user_writable<M: Mmu, D: Devices>(
    kernel: &Kernel<M, D>,
    virt: VirtAddr,
    len: u32,
) -> KernelResult<PhysAddr> {
    let scheduler = kernel.scheduler();
    let task = scheduler
        .current()
        .and_then(|id| scheduler.task(id))
        .ok_or(KernelError::InvalidArgument)?;
    let directory = task.directory();

    let last = virt
        .as_u32()
        .checked_add(len - 1)
        .map(VirtAddr::new)
        .ok_or(KernelError::InvalidArgument)?;
    for page in [virt, last] {
        let flags = directory.entry(page.align_down(PAGE_SIZE))?.flags();
        if !(flags.present() && flags.writable() && flags.access_from_all()) {
            return Err(KernelError::InvalidArgument);
        }
    }
    let start = directory.translate(virt);
    if directory.translate(last) != start + (len - 1) {
        return Err(KernelError::InvalidArgument);
    }
    Ok(start)
}

#[cfg(test)]
mod tests {
    use crate::{
        constants::{
            idt::SYSCALL_VECTOR,
            memory::PAGE_SIZE,
            processes::{IDLE_LOOP, PROGRAM_VIRTUAL_STACK_ADDRESS_START},
            syscalls::*,
        },
        kernel::Resume,
        memory::{PageFlags, PhysAddr, VirtAddr},
        processes::InterruptFrame,
        testing::{self, TestKernel},
    };

    const ARGS: u32 = PROGRAM_VIRTUAL_STACK_ADDRESS_START - 0x100;

    /// Runs `command` in the current task with `args` pushed on its stack.
    fn syscall(kernel: &mut TestKernel, command: usize, args: &[u32]) -> u32 {
        let task = kernel.current_task().unwrap();
        let stack = kernel
            .scheduler()
            .virtual_to_physical(task, VirtAddr::new(ARGS))
            .unwrap();
        let bytes: alloc::vec::Vec<u8> = args.iter().flat_map(|a| a.to_le_bytes()).collect();
        testing::write_phys(kernel.heap(), stack, &bytes);

        let frame = InterruptFrame {
            eax: command as u32,
            esp: ARGS,
            ..testing::trap(SYSCALL_VECTOR)
        };
        match kernel.handle_syscall(&frame) {
            Resume::Task(regs) => regs.eax,
            Resume::Interrupted => panic!("syscalls always resume a task"),
        }
    }

    fn booted(extra: usize) -> TestKernel {
        let mut kernel = testing::kernel(1, extra);
        kernel.load_flat_binary("prog", IDLE_LOOP).unwrap();
        kernel.run_first_task();
        kernel
    }

    #[test]
    fn sum_adds_two_stack_arguments() {
        let mut kernel = booted(0);
        assert_eq!(syscall(&mut kernel, SYSCALL_SUM, &[20, 22]), 42);
    }

    #[test]
    fn putchar_and_print_reach_the_terminal() {
        let mut kernel = booted(4);
        let text = syscall(&mut kernel, SYSCALL_MALLOC, &[16]);
        assert_ne!(text, 0);
        testing::write_phys(kernel.heap(), PhysAddr::new(text), b"hi there\0");

        syscall(&mut kernel, SYSCALL_PUTCHAR, &[u32::from(b'>')]);
        assert_eq!(syscall(&mut kernel, SYSCALL_PRINT, &[text]), 0);
        assert_eq!(kernel.devices().output, b">hi there");
    }

    #[test]
    fn arguments_past_the_top_of_memory_answer_zero() {
        let mut kernel = booted(0);
        let frame = InterruptFrame {
            eax: SYSCALL_SUM as u32,
            esp: 0xFFFF_FFFE,
            ..testing::trap(SYSCALL_VECTOR)
        };
        assert!(matches!(
            kernel.handle_syscall(&frame),
            Resume::Task(regs) if regs.eax == 0
        ));

        // the task is still runnable afterwards
        assert_eq!(syscall(&mut kernel, SYSCALL_SUM, &[1, 2]), 3);
    }

    #[test]
    fn print_stops_at_the_top_of_memory() {
        let mut kernel = booted(2);
        let task = kernel.current_task().unwrap();
        let page = kernel.heap().allocate_zeroed(PAGE_SIZE).unwrap();
        kernel
            .scheduler_mut()
            .directory_mut(task)
            .unwrap()
            .map(VirtAddr::new(0xFFFF_F000), page, PageFlags::USER_WRITABLE)
            .unwrap();
        // an unterminated string running into the end of the address space
        testing::write_phys(kernel.heap(), page + 0xFF0, &[b'x'; 16]);

        assert_eq!(syscall(&mut kernel, SYSCALL_PRINT, &[0xFFFF_FFF0]), 0);
        assert!(kernel.devices().output.is_empty());
    }

    #[test]
    fn getkey_pops_queued_input() {
        let mut kernel = booted(0);
        kernel.push_input(b'k');
        assert_eq!(syscall(&mut kernel, SYSCALL_GETKEY, &[]), u32::from(b'k'));
        assert_eq!(syscall(&mut kernel, SYSCALL_GETKEY, &[]), 0);
    }

    #[test]
    fn malloc_and_free_round_trip() {
        let mut kernel = booted(2);
        let free = kernel.heap().free_blocks();

        let ptr = syscall(&mut kernel, SYSCALL_MALLOC, &[PAGE_SIZE as u32 * 2]);
        assert_ne!(ptr, 0);
        assert_eq!(kernel.heap().free_blocks(), free - 2);

        assert_eq!(syscall(&mut kernel, SYSCALL_FREE, &[ptr]), 0);
        assert_eq!(kernel.heap().free_blocks(), free);
    }

    #[test]
    fn failed_malloc_answers_zero() {
        let mut kernel = booted(0);
        assert_eq!(syscall(&mut kernel, SYSCALL_MALLOC, &[PAGE_SIZE as u32]), 0);
        assert_eq!(syscall(&mut kernel, SYSCALL_MALLOC, &[0]), 0);
    }

    #[test]
    fn get_arguments_fills_the_callers_struct() {
        let mut kernel = booted(8);
        let process = kernel.current_process().unwrap();
        kernel.inject_arguments(process, &["ls", "-l"]).unwrap();
        let out = syscall(&mut kernel, SYSCALL_MALLOC, &[8]);

        assert_eq!(syscall(&mut kernel, SYSCALL_GET_ARGUMENTS, &[out]), 0);
        let words = testing::read_phys(kernel.heap(), PhysAddr::new(out), 8);
        assert_eq!(u32::from_le_bytes(words[0..4].try_into().unwrap()), 2);
        let argv = u32::from_le_bytes(words[4..8].try_into().unwrap());
        assert_eq!(
            Some(VirtAddr::new(argv)),
            kernel.processes().arguments(process).unwrap().argv
        );
    }

    #[test]
    fn get_arguments_refuses_read_only_memory() {
        let mut kernel = booted(0);
        // identity mapped kernel memory is read only for the task
        assert_eq!(syscall(&mut kernel, SYSCALL_GET_ARGUMENTS, &[0x0000_1000]), 0);
    }

    #[test]
    fn exit_with_no_other_task_leaves_nothing_to_run() {
        let mut kernel = booted(0);
        let frame = InterruptFrame {
            eax: SYSCALL_EXIT as u32,
            ..testing::trap(SYSCALL_VECTOR)
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            kernel.handle_syscall(&frame)
        }));
        assert!(result.is_err());
        assert!(kernel.processes().iter().next().is_none());
    }
}
