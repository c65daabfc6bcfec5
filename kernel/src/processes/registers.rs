//! Saved user register state and the trap frame it is captured from.

/// A task's register snapshot, restored when the task is resumed.
///
/// `ss` doubles as the data segment: every data segment register is loaded
/// with it on the way back to ring 3.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Registers {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub ip: u32,
    pub cs: u32,
    pub flags: u32,
    pub esp: u32,
    pub ss: u32,
}

/// What the trap stubs leave on the kernel stack, lowest address first:
/// `pushad`, the interrupted data segment, the vector, the error code
/// (zero for vectors without one), then the frame pushed by the CPU.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct InterruptFrame {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// `esp` as stored by `pushad`; unused.
    pub reserved: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub ds: u32,
    pub vector: u32,
    pub error_code: u32,
    pub ip: u32,
    pub cs: u32,
    pub flags: u32,
    pub esp: u32,
    pub ss: u32,
}

impl From<&InterruptFrame> for Registers {
    fn from(frame: &InterruptFrame) -> Self {
        Self {
            edi: frame.edi,
            esi: frame.esi,
            ebp: frame.ebp,
            ebx: frame.ebx,
            edx: frame.edx,
            ecx: frame.ecx,
            eax: frame.eax,
            ip: frame.ip,
            cs: frame.cs,
            flags: frame.flags,
            esp: frame.esp,
            ss: frame.ss,
        }
    }
}

impl core::fmt::Debug for Registers {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut ds = f.debug_struct("Registers");

        ds.field("edi", &format_args!("{:#010x}", self.edi))
            .field("esi", &format_args!("{:#010x}", self.esi))
            .field("ebp", &format_args!("{:#010x}", self.ebp))
            .field("ebx", &format_args!("{:#010x}", self.ebx))
            .field("edx", &format_args!("{:#010x}", self.edx))
            .field("ecx", &format_args!("{:#010x}", self.ecx))
            .field("eax", &format_args!("{:#010x}", self.eax))
            .field("ip", &format_args!("{:#010x}", self.ip))
            .field("cs", &format_args!("{:#06x}", self.cs))
            .field("flags", &format_args!("{:#010x}", self.flags))
            .field("esp", &format_args!("{:#010x}", self.esp))
            .field("ss", &format_args!("{:#06x}", self.ss));

        ds.finish()
    }
}
