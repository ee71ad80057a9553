use std::fmt;

/// Active instruction encoding, selected by the T bit.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CpuState { Arm, Thumb }

impl CpuState {
    /// Width in bytes of one instruction in this encoding.
    pub fn width(self) -> u32 {
        match self {
            CpuState::Arm => 4,
            CpuState::Thumb => 2,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CpuMode {
    User,
    Fiq,
    Irq,
    Supervisor,
    Abort,
    Undefined,
    System,
}

impl CpuMode {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits & 0x1F {
            0b10000 => Some(CpuMode::User),
            0b10001 => Some(CpuMode::Fiq),
            0b10010 => Some(CpuMode::Irq),
            0b10011 => Some(CpuMode::Supervisor),
            0b10111 => Some(CpuMode::Abort),
            0b11011 => Some(CpuMode::Undefined),
            0b11111 => Some(CpuMode::System),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            CpuMode::User => 0b10000,
            CpuMode::Fiq => 0b10001,
            CpuMode::Irq => 0b10010,
            CpuMode::Supervisor => 0b10011,
            CpuMode::Abort => 0b10111,
            CpuMode::Undefined => 0b11011,
            CpuMode::System => 0b11111,
        }
    }

    /// User and System share one register set and have no saved status register.
    pub fn is_privileged_bank(self) -> bool {
        !matches!(self, CpuMode::User | CpuMode::System)
    }
}

/// Program status register (CPSR or one of the SPSRs).
///
/// Every setter is a read-modify-write of its own bit range; the rest of the
/// word is left as it was.
#[derive(Copy, Clone, Eq, PartialEq, Default)]
pub struct Psr(u32);

impl fmt::Debug for Psr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Psr")
            .field("N", &self.n())
            .field("Z", &self.z())
            .field("C", &self.c())
            .field("V", &self.v())
            .field("I", &self.i())
            .field("F", &self.f())
            .field("T", &self.t())
            .field("mode", &CpuMode::from_bits(self.0))
            .finish()
    }
}

pub const FLAGS_MASK: u32 = 0xF000_0000;
pub const CONTROL_MASK: u32 = 0x0000_00FF;

impl Psr {
    pub const fn from_raw(value: u32) -> Self { Self(value) }

    pub fn raw(&self) -> u32 { self.0 }
    pub fn set_raw(&mut self, value: u32) { self.0 = value; }

    pub fn n(&self) -> bool { self.0 & (1 << 31) != 0 }
    pub fn z(&self) -> bool { self.0 & (1 << 30) != 0 }
    pub fn c(&self) -> bool { self.0 & (1 << 29) != 0 }
    pub fn v(&self) -> bool { self.0 & (1 << 28) != 0 }
    /// IRQ disable.
    pub fn i(&self) -> bool { self.0 & (1 << 7) != 0 }
    /// FIQ disable.
    pub fn f(&self) -> bool { self.0 & (1 << 6) != 0 }
    pub fn t(&self) -> bool { self.0 & (1 << 5) != 0 }

    pub fn set_n(&mut self, v: bool) { self.set_bit(31, v); }
    pub fn set_z(&mut self, v: bool) { self.set_bit(30, v); }
    pub fn set_c(&mut self, v: bool) { self.set_bit(29, v); }
    pub fn set_v(&mut self, v: bool) { self.set_bit(28, v); }
    pub fn set_i(&mut self, v: bool) { self.set_bit(7, v); }
    pub fn set_f(&mut self, v: bool) { self.set_bit(6, v); }
    pub fn set_t(&mut self, v: bool) { self.set_bit(5, v); }

    fn set_bit(&mut self, bit: u32, set: bool) { if set { self.0 |= 1 << bit } else { self.0 &= !(1 << bit) } }

    /// N and Z from a result word.
    pub fn set_nz(&mut self, result: u32) {
        self.set_n(result >> 31 != 0);
        self.set_z(result == 0);
    }

    pub fn mode_bits(&self) -> u32 { self.0 & 0x1F }

    /// Decoded mode. A raw field that names no mode (only reachable through
    /// MSR) banks like User.
    pub fn mode(&self) -> CpuMode { CpuMode::from_bits(self.0).unwrap_or(CpuMode::User) }
    pub fn set_mode(&mut self, mode: CpuMode) {
        self.0 = (self.0 & !0x1F) | mode.bits();
    }

    pub fn state(&self) -> CpuState { if self.t() { CpuState::Thumb } else { CpuState::Arm } }
    pub fn set_state(&mut self, state: CpuState) { self.set_t(matches!(state, CpuState::Thumb)); }

    /// Replace the bits selected by `mask` with those of `value`.
    pub fn write_masked(&mut self, value: u32, mask: u32) {
        self.0 = (self.0 & !mask) | (value & mask);
    }
}
