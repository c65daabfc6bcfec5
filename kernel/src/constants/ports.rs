//! I/O port definitions.

/// Base I/O port address for the first serial port (COM1).
pub const SERIAL_PORT: u16 = 0x3F8;

pub const PIC_MASTER_COMMAND: u16 = 0x20;
pub const PIC_MASTER_DATA: u16 = 0x21;
pub const PIC_SLAVE_COMMAND: u16 = 0xA0;
pub const PIC_SLAVE_DATA: u16 = 0xA1;

pub const PIC_END_OF_INTERRUPT: u8 = 0x20;
