//! Process records: a loaded program image, its stack, memory handed out
//! to it, its keyboard input and its arguments.

use super::task::TaskId;
use crate::{
    constants::{
        memory::PAGE_SIZE,
        processes::{
            INPUT_BUFFER_SIZE, MAX_ARGUMENT_LENGTH, MAX_PATH, MAX_PROGRAM_ALLOCATIONS,
            PROGRAM_VIRTUAL_ADDRESS,
        },
    },
    errors::{KernelError, KernelResult},
    memory::{LockedHeap, PhysAddr, VirtAddr},
};
use alloc::vec::Vec;
use arrayvec::{ArrayString, ArrayVec};

/// Slot index in the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u16);

impl ProcessId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Elf,
    Binary,
}

/// A program already placed in physical memory, ready to be mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramImage {
    pub kind: FileType,
    pub entry: VirtAddr,
    pub virtual_base: VirtAddr,
    pub physical_base: PhysAddr,
    /// Page aligned, exclusive.
    pub physical_end: PhysAddr,
}

impl ProgramImage {
    /// Copies a flat binary into fresh heap blocks. It is entered at its
    /// first byte, mapped at the program base address.
    pub fn flat_binary(heap: &LockedHeap, bytes: &[u8]) -> KernelResult<ProgramImage> {
        let base = heap.allocate_zeroed(bytes.len())?;
        // SAFETY: the run was just allocated with room for every byte
        unsafe {
            core::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                heap.direct_map().as_mut_ptr::<u8>(base),
                bytes.len(),
            );
        }

        let program = VirtAddr::new(PROGRAM_VIRTUAL_ADDRESS);
        Ok(ProgramImage {
            kind: FileType::Binary,
            entry: program,
            virtual_base: program,
            physical_base: base,
            physical_end: base + bytes.len().next_multiple_of(PAGE_SIZE) as u32,
        })
    }

    /// Describes an ELF image an external loader has placed in memory.
    /// The loader keeps ownership of that memory.
    pub fn elf(
        entry: VirtAddr,
        virtual_base: VirtAddr,
        physical_base: PhysAddr,
        physical_end: PhysAddr,
    ) -> ProgramImage {
        ProgramImage {
            kind: FileType::Elf,
            entry,
            virtual_base,
            physical_base,
            physical_end,
        }
    }

    /// Returns kernel-owned image memory to the heap.
    pub fn release(&self, heap: &LockedHeap) -> KernelResult<()> {
        match self.kind {
            FileType::Binary => heap.free(self.physical_base),
            FileType::Elf => Ok(()),
        }
    }
}

/// Memory handed to a process through `malloc`. Identity mapped, so `ptr`
/// is both the process's and the kernel's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessAllocation {
    pub ptr: VirtAddr,
    pub size: usize,
}

/// Keyboard bytes queued for a process.
pub struct InputBuffer {
    buffer: [u8; INPUT_BUFFER_SIZE],
    head: usize,
    tail: usize,
}

impl InputBuffer {
    pub const fn new() -> Self {
        Self {
            buffer: [0; INPUT_BUFFER_SIZE],
            head: 0,
            tail: 0,
        }
    }

    /// Queues `byte`. Zero is not a valid key and is dropped; a full buffer
    /// overwrites its oldest slot.
    pub fn push(&mut self, byte: u8) {
        if byte == 0 {
            return;
        }
        self.buffer[self.tail % INPUT_BUFFER_SIZE] = byte;
        self.tail = self.tail.wrapping_add(1);
    }

    /// The oldest queued byte, or 0 when nothing is queued.
    pub fn pop(&mut self) -> u8 {
        let slot = &mut self.buffer[self.head % INPUT_BUFFER_SIZE];
        let byte = core::mem::take(slot);
        if byte != 0 {
            self.head = self.head.wrapping_add(1);
        }
        byte
    }

    /// Drops the most recently queued byte. Bytes already read stay read.
    pub fn backspace(&mut self) {
        if self.tail == self.head {
            return;
        }
        self.tail = self.tail.wrapping_sub(1);
        self.buffer[self.tail % INPUT_BUFFER_SIZE] = 0;
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// `argc`/`argv` as seen by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessArguments {
    pub argc: u32,
    pub argv: Option<VirtAddr>,
}

pub struct Process {
    pub(super) id: ProcessId,
    pub(super) filename: ArrayString<MAX_PATH>,
    pub(super) task: TaskId,
    pub(super) image: ProgramImage,
    pub(super) stack: PhysAddr,
    pub(super) allocations: ArrayVec<ProcessAllocation, MAX_PROGRAM_ALLOCATIONS>,
    pub(super) input: InputBuffer,
    pub(super) arguments: Vec<ArrayString<MAX_ARGUMENT_LENGTH>>,
    pub(super) argv: Option<VirtAddr>,
}

impl Process {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn filetype(&self) -> FileType {
        self.image.kind
    }

    pub fn image(&self) -> &ProgramImage {
        &self.image
    }

    pub fn stack(&self) -> PhysAddr {
        self.stack
    }

    pub fn allocations(&self) -> &[ProcessAllocation] {
        &self.allocations
    }

    pub fn input_mut(&mut self) -> &mut InputBuffer {
        &mut self.input
    }

    pub fn arguments(&self) -> impl Iterator<Item = &str> + '_ {
        self.arguments.iter().map(ArrayString::as_str)
    }

    pub fn argv(&self) -> ProcessArguments {
        ProcessArguments {
            argc: self.arguments.len() as u32,
            argv: self.argv,
        }
    }

    pub(super) fn find_allocation(&self, ptr: VirtAddr) -> KernelResult<usize> {
        self.allocations
            .iter()
            .position(|allocation| allocation.ptr == ptr)
            .ok_or(KernelError::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn input_is_first_in_first_out() {
        let mut input = InputBuffer::new();
        assert_eq!(input.pop(), 0);

        for byte in b"abc" {
            input.push(*byte);
        }
        input.push(0);
        assert_eq!(input.pop(), b'a');
        assert_eq!(input.pop(), b'b');
        assert_eq!(input.pop(), b'c');
        assert_eq!(input.pop(), 0);
    }

    #[test]
    fn backspace_retracts_the_last_byte() {
        let mut input = InputBuffer::new();
        input.push(b'x');
        input.push(b'y');
        input.backspace();
        input.push(b'z');
        assert_eq!(input.pop(), b'x');
        assert_eq!(input.pop(), b'z');
        assert_eq!(input.pop(), 0);
    }

    #[test]
    fn backspace_on_an_empty_buffer_does_nothing() {
        let mut input = InputBuffer::new();
        input.backspace();
        input.push(b'x');
        assert_eq!(input.pop(), b'x');
        assert_eq!(input.pop(), 0);
    }

    #[test]
    fn backspace_cannot_take_back_a_read_byte() {
        let mut input = InputBuffer::new();
        input.push(b'a');
        assert_eq!(input.pop(), b'a');
        input.backspace();
        input.push(b'b');
        assert_eq!(input.pop(), b'b');
        assert_eq!(input.pop(), 0);
    }

    #[test]
    fn input_wraps_around() {
        let mut input = InputBuffer::new();
        for _ in 0..INPUT_BUFFER_SIZE - 1 {
            input.push(b'.');
            input.pop();
        }
        input.push(b'1');
        input.push(b'2');
        assert_eq!(input.pop(), b'1');
        assert_eq!(input.pop(), b'2');
    }

    #[test]
    fn flat_binary_is_copied_to_the_heap() {
        let heap = testing::heap(4);
        let image = ProgramImage::flat_binary(heap, &[0xEB, 0xFE]).unwrap();

        assert_eq!(image.kind, FileType::Binary);
        assert_eq!(image.entry, VirtAddr::new(PROGRAM_VIRTUAL_ADDRESS));
        assert_eq!(image.physical_end - image.physical_base, PAGE_SIZE as u32);
        assert_eq!(testing::read_phys(heap, image.physical_base, 3), [0xEB, 0xFE, 0]);

        image.release(heap).unwrap();
        assert_eq!(heap.free_blocks(), 4);
    }

    #[test]
    fn elf_images_are_not_released_by_the_kernel() {
        let heap = testing::heap(1);
        let image = ProgramImage::elf(
            VirtAddr::new(0x0040_0100),
            VirtAddr::new(0x0040_0000),
            PhysAddr::new(0x0200_0000),
            PhysAddr::new(0x0200_2000),
        );
        assert_eq!(image.release(heap), Ok(()));
    }
}
