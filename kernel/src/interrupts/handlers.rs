//! Default interrupt callbacks: CPU exceptions and the timer.

use crate::{
    constants::idt::{EXCEPTION_VECTORS, TIMER_VECTOR},
    devices::Devices,
    kernel::Kernel,
    memory::Mmu,
    processes::InterruptFrame,
};

pub fn register_defaults<M: Mmu, D: Devices>(kernel: &mut Kernel<M, D>) {
    for vector in 0..EXCEPTION_VECTORS {
        kernel.register_interrupt(vector, exception_handler);
    }
    kernel.register_interrupt(TIMER_VECTOR, timer_handler);
}

/// A faulting task never resumes: its process is torn down and the next
/// task in line takes over.
fn exception_handler<M: Mmu, D: Devices>(kernel: &mut Kernel<M, D>, frame: &InterruptFrame) {
    log::error!(
        "EXCEPTION {:#x} (error {:#x}) at {:#010x} in {:?}",
        frame.vector,
        frame.error_code,
        frame.ip,
        kernel.current_process()
    );
    if let Err(e) = kernel.terminate_current() {
        log::error!("failed to terminate faulting process: {}", e);
    }
}

fn timer_handler<M: Mmu, D: Devices>(kernel: &mut Kernel<M, D>, _frame: &InterruptFrame) {
    kernel.scheduler_mut().advance_to_next();
}
