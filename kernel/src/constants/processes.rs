/// Where flat binaries are mapped and entered.
pub const PROGRAM_VIRTUAL_ADDRESS: u32 = 0x0040_0000;

pub const USER_PROGRAM_STACK_SIZE: usize = 16 * 1024;
/// Initial stack pointer of every task; the stack grows down from here.
pub const PROGRAM_VIRTUAL_STACK_ADDRESS_START: u32 = 0x003F_F000;
pub const PROGRAM_VIRTUAL_STACK_ADDRESS_END: u32 =
    PROGRAM_VIRTUAL_STACK_ADDRESS_START - USER_PROGRAM_STACK_SIZE as u32;

pub const MAX_PROCESSES: usize = 12;
pub const MAX_PROGRAM_ALLOCATIONS: usize = 1024;
pub const MAX_PATH: usize = 108;
pub const MAX_ARGUMENT_LENGTH: usize = 512;

/// Capacity of the per-process keyboard ring buffer.
pub const INPUT_BUFFER_SIZE: usize = 1024;

/// `jmp $`: a flat binary that spins until the next timer tick.
pub const IDLE_LOOP: &[u8] = &[0xEB, 0xFE];
