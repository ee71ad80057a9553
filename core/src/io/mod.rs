pub const IO_SIZE: usize = 0x400;

pub const REG_DISPCNT: usize = 0x000;
pub const REG_DISPSTAT: usize = 0x004;
pub const REG_KEYINPUT: usize = 0x130;
pub const REG_IE: usize = 0x200;
pub const REG_IME: usize = 0x208;

/// I/O register block at 0x0400_0000.
///
/// Stored as raw bytes. No peripheral is attached, so the block only
/// latches what the CPU writes, apart from the read-only key state.
pub struct Io {
    regs: [u8; IO_SIZE],
}

impl Default for Io {
    fn default() -> Self {
        let mut io = Self { regs: [0; IO_SIZE] };
        io.reset();
        io
    }
}

impl Io {
    pub fn new() -> Self { Self::default() }

    /// Power-on values: forced-blank display, no keys pressed.
    pub fn reset(&mut self) {
        self.regs.fill(0);
        self.write_half(REG_DISPCNT, 0x0080);
        self.write_half(REG_KEYINPUT, 0x03FF);
    }

    pub fn read8(&self, offset: usize) -> u8 {
        self.regs[offset & (IO_SIZE - 1)]
    }

    pub fn write8(&mut self, offset: usize, value: u8) {
        let offset = offset & (IO_SIZE - 1);
        match offset {
            // key state comes from the frontend, never from the CPU
            o if o == REG_KEYINPUT || o == REG_KEYINPUT + 1 => {}
            _ => self.regs[offset] = value,
        }
    }

    fn read_half(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.regs[offset], self.regs[offset + 1]])
    }

    fn write_half(&mut self, offset: usize, value: u16) {
        self.regs[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn dispcnt(&self) -> u16 { self.read_half(REG_DISPCNT) }
    pub fn dispstat(&self) -> u16 { self.read_half(REG_DISPSTAT) }
    pub fn keyinput(&self) -> u16 { self.read_half(REG_KEYINPUT) }
    pub fn ie(&self) -> u16 { self.read_half(REG_IE) }
    pub fn ime(&self) -> u16 { self.read_half(REG_IME) }

    /// Active-low key mask (bit clear = pressed), 10 keys.
    pub fn set_keyinput(&mut self, value: u16) {
        self.write_half(REG_KEYINPUT, value & 0x03FF);
    }
}
