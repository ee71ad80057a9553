use crate::io::{Io, IO_SIZE};
use crate::mem::{Mem, BIOS_SIZE};

/// Memory interface seen by the CPU.
///
/// Reads take `&mut self` because they update the open-bus latch.
pub trait BusAccess {
    fn read32(&mut self, addr: u32) -> u32;
    fn read16(&mut self, addr: u32) -> u16;
    fn read8(&mut self, addr: u32) -> u8;
    fn write32(&mut self, addr: u32, value: u32);
    fn write16(&mut self, addr: u32, value: u16);
    fn write8(&mut self, addr: u32, value: u8);
    /// Called with the address of every instruction fetch, before the read.
    fn on_instruction_fetch(&mut self, _addr: u32) {}
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Region {
    Bios,
    Ewram,
    Iwram,
    Io,
    Palette,
    Vram,
    Oam,
    Rom,
    Sram,
    Unmapped,
}

impl Region {
    pub fn of(addr: u32) -> Self {
        match addr >> 24 {
            0x00 => Region::Bios,
            0x02 => Region::Ewram,
            0x03 => Region::Iwram,
            0x04 => Region::Io,
            0x05 => Region::Palette,
            0x06 => Region::Vram,
            0x07 => Region::Oam,
            0x08..=0x0D => Region::Rom,
            0x0E | 0x0F => Region::Sram,
            _ => Region::Unmapped,
        }
    }
}

const EWRAM_MASK: u32 = 0x3_FFFF;
const IWRAM_MASK: u32 = 0x7FFF;
const PALETTE_MASK: u32 = 0x3FF;
const OAM_MASK: u32 = 0x3FF;
const ROM_MASK: u32 = 0x1FF_FFFF;
const SRAM_MASK: u32 = 0xFFFF;

/// 128KB window over 96KB of VRAM; the upper 32KB mirrors the last bank.
fn vram_offset(addr: u32) -> usize {
    let offset = addr & 0x1_FFFF;
    (if offset >= 0x1_8000 { offset - 0x8000 } else { offset }) as usize
}

pub struct Bus {
    pub mem: Mem,
    pub io: Io,
    last_read: u8,
    bios_locked: bool,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            mem: Mem::new(),
            io: Io::new(),
            last_read: 0,
            bios_locked: false,
        }
    }

    /// Power-on state for everything but the loaded images.
    pub fn reset(&mut self) {
        self.mem.reset();
        self.io.reset();
        self.last_read = 0;
        self.bios_locked = false;
    }

    pub fn load_bios(&mut self, data: &[u8]) {
        self.mem.load_bios(data);
    }

    pub fn load_rom(&mut self, data: &[u8]) {
        self.mem.load_rom(data);
    }

    pub fn bios_locked(&self) -> bool { self.bios_locked }
    pub fn set_bios_locked(&mut self, locked: bool) { self.bios_locked = locked; }

    /// Value currently held by the open-bus latch.
    pub fn open_bus(&self) -> u8 { self.last_read }

    /// Byte read without touching the open-bus latch, for inspectors.
    pub fn peek8(&self, addr: u32) -> u8 {
        self.backed_byte(addr).unwrap_or(self.last_read)
    }

    /// The byte backing `addr`, or `None` where the bus floats.
    fn backed_byte(&self, addr: u32) -> Option<u8> {
        match Region::of(addr) {
            Region::Bios => {
                let offset = addr as usize;
                (offset < BIOS_SIZE && !self.bios_locked).then(|| self.mem.bios[offset])
            }
            Region::Ewram => Some(self.mem.ewram[(addr & EWRAM_MASK) as usize]),
            Region::Iwram => Some(self.mem.iwram[(addr & IWRAM_MASK) as usize]),
            Region::Io => {
                let offset = (addr & 0xFF_FFFF) as usize;
                (offset < IO_SIZE).then(|| self.io.read8(offset))
            }
            Region::Palette => Some(self.mem.palette[(addr & PALETTE_MASK) as usize]),
            Region::Vram => Some(self.mem.vram[vram_offset(addr)]),
            Region::Oam => Some(self.mem.oam[(addr & OAM_MASK) as usize]),
            Region::Rom => self.mem.rom.get((addr & ROM_MASK) as usize).copied(),
            Region::Sram => Some(self.mem.sram[(addr & SRAM_MASK) as usize]),
            Region::Unmapped => None,
        }
    }

    fn read_byte(&mut self, addr: u32) -> u8 {
        match self.backed_byte(addr) {
            Some(value) => {
                self.last_read = value;
                value
            }
            None => {
                #[cfg(feature = "trace_bus")]
                log::trace!("open bus read at {:#010x} -> {:#04x}", addr, self.last_read);
                self.last_read
            }
        }
    }

    fn store_byte(&mut self, addr: u32, value: u8) {
        match Region::of(addr) {
            Region::Ewram => self.mem.ewram[(addr & EWRAM_MASK) as usize] = value,
            Region::Iwram => self.mem.iwram[(addr & IWRAM_MASK) as usize] = value,
            Region::Io => {
                let offset = (addr & 0xFF_FFFF) as usize;
                if offset < IO_SIZE {
                    self.io.write8(offset, value);
                }
            }
            Region::Palette => self.mem.palette[(addr & PALETTE_MASK) as usize] = value,
            Region::Vram => self.mem.vram[vram_offset(addr)] = value,
            Region::Oam => self.mem.oam[(addr & OAM_MASK) as usize] = value,
            Region::Sram => self.mem.sram[(addr & SRAM_MASK) as usize] = value,
            Region::Bios | Region::Rom | Region::Unmapped => {
                #[cfg(feature = "trace_bus")]
                log::trace!("discarded write {:#04x} to {:#010x}", value, addr);
            }
        }
    }

    fn read16_aligned(&mut self, addr: u32) -> u16 {
        let b0 = self.read_byte(addr) as u16;
        let b1 = self.read_byte(addr.wrapping_add(1)) as u16;
        b0 | (b1 << 8)
    }

    fn read32_aligned(&mut self, addr: u32) -> u32 {
        let lo = self.read16_aligned(addr) as u32;
        let hi = self.read16_aligned(addr.wrapping_add(2)) as u32;
        lo | (hi << 16)
    }

    fn write16_aligned(&mut self, addr: u32, value: u16) {
        self.store_byte(addr, value as u8);
        self.store_byte(addr.wrapping_add(1), (value >> 8) as u8);
    }
}

impl BusAccess for Bus {
    /// Misaligned reads load the aligned word and rotate it right by the
    /// byte offset.
    fn read32(&mut self, addr: u32) -> u32 {
        let value = self.read32_aligned(addr & !3);
        value.rotate_right((addr & 3) * 8)
    }

    fn read16(&mut self, addr: u32) -> u16 {
        let value = self.read16_aligned(addr & !1);
        value.rotate_right((addr & 1) * 8)
    }

    fn read8(&mut self, addr: u32) -> u8 {
        self.read_byte(addr)
    }

    /// Misaligned stores rotate left by the byte offset, then write aligned.
    fn write32(&mut self, addr: u32, value: u32) {
        let aligned = addr & !3;
        let value = value.rotate_left((addr & 3) * 8);
        self.write16_aligned(aligned, value as u16);
        self.write16_aligned(aligned.wrapping_add(2), (value >> 16) as u16);
    }

    fn write16(&mut self, addr: u32, value: u16) {
        self.write16_aligned(addr & !1, value);
    }

    fn write8(&mut self, addr: u32, value: u8) {
        self.store_byte(addr, value);
    }

    /// The boot ROM only answers while code runs from inside it.
    fn on_instruction_fetch(&mut self, addr: u32) {
        self.bios_locked = addr as usize >= BIOS_SIZE;
    }
}
