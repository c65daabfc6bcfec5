pub const MAX_SYSCALL_COMMANDS: usize = 1024;

// Syscall numbers, passed in eax
pub const SYSCALL_SUM: usize = 0;
pub const SYSCALL_PRINT: usize = 1;
pub const SYSCALL_GETKEY: usize = 2;
pub const SYSCALL_PUTCHAR: usize = 3;
pub const SYSCALL_MALLOC: usize = 4;
pub const SYSCALL_FREE: usize = 5;
pub const SYSCALL_GET_ARGUMENTS: usize = 8;
pub const SYSCALL_EXIT: usize = 9;

/// Longest string the print command copies out of a task.
pub const PRINT_BUFFER_SIZE: usize = 1024;
