#![forbid(unsafe_code)]

use crate::bus::Bus;
use crate::cpu::{Cpu, CpuError, Psr, RegisterBank};

pub mod bus;
pub mod cpu;
pub mod io;
pub mod log_buffer;
pub mod mem;

pub const BIOS_ENTRY: u32 = 0x0000_0000;
pub const ROM_ENTRY: u32 = 0x0800_0000;

/// A processor wired to the GBA memory map.
///
/// Without a boot image the registers start in the state the boot ROM would
/// leave behind and execution begins at the cartridge entry point.
pub struct Emulator {
    cpu: Cpu,
    bus: Bus,
    bios_loaded: bool,
    rom_loaded: bool,
}

impl Emulator {
    pub fn new() -> Self {
        let mut emu = Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
            bios_loaded: false,
            rom_loaded: false,
        };
        emu.reset();
        emu
    }

    /// Clear RAM and I/O, restore the boot register state and prime the
    /// pipeline at the entry point. Loaded images are kept.
    pub fn reset(&mut self) {
        self.bus.reset();
        let regs = if self.bios_loaded {
            RegisterBank::new()
        } else {
            RegisterBank::direct_boot()
        };
        *self.cpu.regs_mut() = regs;
        self.cpu.initialize(&mut self.bus);
        log::debug!(
            "reset: entry {:#010x}, mode {:?}",
            if self.bios_loaded { BIOS_ENTRY } else { ROM_ENTRY },
            self.cpu.mode()
        );
    }

    pub fn load_bios(&mut self, data: &[u8]) {
        self.bus.load_bios(data);
        self.bios_loaded = true;
        log::info!("boot image loaded ({} bytes)", data.len());
        self.reset();
    }

    pub fn load_rom(&mut self, data: &[u8]) {
        self.bus.load_rom(data);
        self.rom_loaded = true;
        log::info!("cartridge image loaded ({} bytes)", data.len());
        self.reset();
    }

    pub fn step(&mut self) -> Result<(), CpuError> {
        self.cpu.step(&mut self.bus)
    }

    pub fn run(&mut self, steps: u64) -> Result<(), CpuError> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    pub fn read_reg(&self, index: usize) -> Result<u32, CpuError> { self.cpu.read_reg(index) }
    pub fn cpsr(&self) -> Psr { self.cpu.cpsr() }
    pub fn spsr(&self) -> Psr { self.cpu.spsr() }
    pub fn peek8(&self, addr: u32) -> u8 { self.bus.peek8(addr) }

    pub fn cpu(&self) -> &Cpu { &self.cpu }
    pub fn bus(&self) -> &Bus { &self.bus }
    pub fn bus_mut(&mut self) -> &mut Bus { &mut self.bus }
    pub fn is_bios_loaded(&self) -> bool { self.bios_loaded }
    pub fn is_rom_loaded(&self) -> bool { self.rom_loaded }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}
