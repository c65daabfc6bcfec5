//! Bit layouts of IDT gates and GDT segment descriptors.
//!
//! Encoding is kept apart from loading so it can be checked off the machine.

/// 32-bit interrupt gate, ring 0 only.
pub const INTERRUPT_GATE: u8 = 0x8E;
/// 32-bit interrupt gate callable from ring 3 with `int`.
pub const USER_INTERRUPT_GATE: u8 = 0xEE;

/// One IDT entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, packed)]
pub struct IdtGate {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attributes: u8,
    offset_high: u16,
}

impl IdtGate {
    pub const fn new(handler: u32, selector: u16, type_attributes: u8) -> Self {
        Self {
            offset_low: handler as u16,
            selector,
            zero: 0,
            type_attributes,
            offset_high: (handler >> 16) as u16,
        }
    }

    #[cfg(test)]
    pub fn handler(&self) -> u32 {
        (u32::from(self.offset_high) << 16) | u32::from(self.offset_low)
    }

    /// The gate as the CPU reads it from the table.
    #[cfg(test)]
    pub fn to_bytes(self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0..2].copy_from_slice(&{ self.offset_low }.to_le_bytes());
        bytes[2..4].copy_from_slice(&{ self.selector }.to_le_bytes());
        bytes[4] = self.zero;
        bytes[5] = self.type_attributes;
        bytes[6..8].copy_from_slice(&{ self.offset_high }.to_le_bytes());
        bytes
    }
}

/// A flat segment before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub base: u32,
    pub limit: u32,
    pub access: u8,
}

impl Segment {
    pub const NULL: Segment = Segment::new(0, 0, 0);

    pub const fn new(base: u32, limit: u32, access: u8) -> Self {
        Self {
            base,
            limit,
            access,
        }
    }

    /// The 8-byte descriptor for this segment.
    ///
    /// Limits above 64 KiB are stored in 4 KiB units.
    ///
    /// # Panics
    /// If the limit is above 64 KiB and its low 12 bits are not all set,
    /// which page granularity cannot express.
    pub fn encode(&self) -> [u8; 8] {
        if self.limit > 65536 && (self.limit & 0xFFF) != 0xFFF {
            panic!("segment limit {:#x} is not representable", self.limit);
        }

        let (limit, flags) = if self.limit > 65536 {
            (self.limit >> 12, 0xC0)
        } else {
            (self.limit, 0x40)
        };

        [
            limit as u8,
            (limit >> 8) as u8,
            self.base as u8,
            (self.base >> 8) as u8,
            (self.base >> 16) as u8,
            self.access,
            flags | ((limit >> 16) & 0x0F) as u8,
            (self.base >> 24) as u8,
        ]
    }
}
