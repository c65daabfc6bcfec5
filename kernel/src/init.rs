//! Bringing the machine up and the glue between the trap stubs and the
//! kernel core.

use crate::{
    constants::{
        idt::SYSCALL_VECTOR,
        memory::{HEAP_ADDRESS, HEAP_SIZE_BYTES, HEAP_TABLE_ADDRESS, HEAP_TOTAL_BLOCKS},
        processes::IDLE_LOOP,
    },
    cpu::{self, HardwareMmu},
    devices::platform::PlatformDevices,
    errors::KernelResult,
    interrupts,
    kernel::{Kernel, Resume},
    logging,
    memory::{
        heap::{BlockEntry, Heap, HeapTable},
        DirectMap, LockedHeap, PhysAddr,
    },
    processes::{InterruptFrame, Registers},
};
use spin::Mutex;

pub type MachineKernel = Kernel<HardwareMmu, PlatformDevices>;

#[global_allocator]
pub static KERNEL_HEAP: LockedHeap = LockedHeap::empty(DirectMap::IDENTITY);

pub static KERNEL: Mutex<Option<MachineKernel>> = Mutex::new(None);

/// Prints `A` through the putchar syscall, then exits.
const HELLO: &[u8] = &[
    0x6A, 0x41, // push 'A'
    0xB8, 0x03, 0x00, 0x00, 0x00, // mov eax, 3
    0xCD, 0x80, // int 0x80
    0x83, 0xC4, 0x04, // add esp, 4
    0xB8, 0x09, 0x00, 0x00, 0x00, // mov eax, 9
    0xCD, 0x80, // int 0x80
    0xEB, 0xFE, // jmp $
];

/// Brings the machine up and enters the first task. Never returns.
pub fn start() -> ! {
    cpu::disable_interrupts();
    logging::init();
    interrupts::init();

    let first = match boot() {
        Ok(registers) => registers,
        Err(e) => panic!("boot failed: {}", e),
    };
    log::info!("entering first task at {:#010x}", first.ip);
    unsafe { cpu::task_return(&first) }
}

fn boot() -> KernelResult<Registers> {
    let table = unsafe {
        HeapTable::from_raw(HEAP_TABLE_ADDRESS as *mut BlockEntry, HEAP_TOTAL_BLOCKS)
    };
    let start = PhysAddr::new(HEAP_ADDRESS);
    KERNEL_HEAP.init(Heap::create(start, start + HEAP_SIZE_BYTES as u32, table)?);

    let mut kernel = Kernel::new(&KERNEL_HEAP, HardwareMmu, PlatformDevices)?;
    unsafe { cpu::enable_paging() };

    kernel.load_flat_binary("0:/idle.bin", IDLE_LOOP)?;
    kernel.load_flat_binary("0:/hello.bin", HELLO)?;

    let registers = kernel.run_first_task();
    *KERNEL.lock() = Some(kernel);
    Ok(registers)
}

/// Called by the common trap stub with the frame it built. Returns only when
/// the interrupted code should continue untouched.
pub extern "C" fn trap_entry(frame: &InterruptFrame) {
    let resume = {
        let mut guard = KERNEL.lock();
        match guard.as_mut() {
            Some(kernel) if frame.vector as usize == SYSCALL_VECTOR => kernel.handle_syscall(frame),
            Some(kernel) => kernel.handle_interrupt(frame),
            None => {
                PlatformDevices.acknowledge(frame.vector as usize);
                Resume::Interrupted
            }
        }
    };

    if let Resume::Task(registers) = resume {
        unsafe { cpu::task_return(&registers) }
    }
}
