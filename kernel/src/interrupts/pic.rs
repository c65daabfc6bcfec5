//! The pair of 8259 interrupt controllers.

use crate::{
    constants::{
        idt::{PIC_MASTER_OFFSET, PIC_SLAVE_OFFSET},
        ports::{
            PIC_END_OF_INTERRUPT, PIC_MASTER_COMMAND, PIC_MASTER_DATA, PIC_SLAVE_COMMAND,
            PIC_SLAVE_DATA,
        },
    },
    cpu::outb,
};

const ICW1_INIT_ICW4: u8 = 0x11;
const ICW4_8086: u8 = 0x01;

/// Moves IRQ0..16 to vectors 0x20..0x30 and unmasks only the timer.
pub fn init() {
    unsafe {
        outb(PIC_MASTER_COMMAND, ICW1_INIT_ICW4);
        outb(PIC_SLAVE_COMMAND, ICW1_INIT_ICW4);
        outb(PIC_MASTER_DATA, PIC_MASTER_OFFSET);
        outb(PIC_SLAVE_DATA, PIC_SLAVE_OFFSET);
        outb(PIC_MASTER_DATA, 0x04); // slave on IRQ2
        outb(PIC_SLAVE_DATA, 0x02);
        outb(PIC_MASTER_DATA, ICW4_8086);
        outb(PIC_SLAVE_DATA, ICW4_8086);

        outb(PIC_MASTER_DATA, 0xFE);
        outb(PIC_SLAVE_DATA, 0xFF);
    }
}

/// Acknowledges `vector` if it came from one of the PICs.
pub fn end_of_interrupt(vector: usize) {
    let master = PIC_MASTER_OFFSET as usize;
    let slave = PIC_SLAVE_OFFSET as usize;
    if !(master..slave + 8).contains(&vector) {
        return;
    }
    unsafe {
        if vector >= slave {
            outb(PIC_SLAVE_COMMAND, PIC_END_OF_INTERRUPT);
        }
        outb(PIC_MASTER_COMMAND, PIC_END_OF_INTERRUPT);
    }
}
