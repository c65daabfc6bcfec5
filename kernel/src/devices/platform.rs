//! The machine's [`Devices`]: the 8259 PICs and COM1.

use super::{serial::SERIAL1, Devices};
use crate::interrupts::pic;

#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformDevices;

impl PlatformDevices {
    pub fn acknowledge(self, vector: usize) {
        pic::end_of_interrupt(vector);
    }
}

impl Devices for PlatformDevices {
    fn acknowledge_interrupt(&mut self, vector: usize) {
        self.acknowledge(vector);
    }

    fn put_char(&mut self, byte: u8) {
        SERIAL1.lock().send(byte);
    }
}
