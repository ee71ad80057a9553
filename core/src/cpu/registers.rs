use super::psr::{CpuMode, CpuState, Psr};
use super::CpuError;

pub const SP: usize = 13;
pub const LR: usize = 14;
pub const PC: usize = 15;

/// Bank slot for r13/r14/SPSR. User and System share slot 0.
fn bank_index(mode: CpuMode) -> usize {
    match mode {
        CpuMode::User | CpuMode::System => 0,
        CpuMode::Fiq => 1,
        CpuMode::Irq => 2,
        CpuMode::Supervisor => 3,
        CpuMode::Abort => 4,
        CpuMode::Undefined => 5,
    }
}

/// Register file with mode-dependent aliasing.
///
/// Nothing is copied on a mode switch: every access goes through
/// [`RegisterBank::resolve_in_mode`], which picks the storage for the mode
/// the CPSR names at that moment.
#[derive(Clone, Debug)]
pub struct RegisterBank {
    gpr: [u32; 13],
    fiq_r8_r12: [u32; 5],
    sp: [u32; 6],
    lr: [u32; 6],
    // Indexed by bank_index - 1; User/System have none.
    spsr: [Psr; 5],
    // Backs spsr()/spsr_mut() in User and System mode.
    dummy_spsr: Psr,
    pc: u32,
    cpsr: Psr,
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBank {
    /// Power-on state: Supervisor mode, IRQ and FIQ masked, ARM state, PC = 0.
    pub fn new() -> Self {
        let mut cpsr = Psr::default();
        cpsr.set_mode(CpuMode::Supervisor);
        cpsr.set_i(true);
        cpsr.set_f(true);
        Self {
            gpr: [0; 13],
            fiq_r8_r12: [0; 5],
            sp: [0; 6],
            lr: [0; 6],
            spsr: [Psr::default(); 5],
            dummy_spsr: Psr::default(),
            pc: 0,
            cpsr,
        }
    }

    /// State the boot ROM leaves behind when it hands over to the cartridge.
    pub fn direct_boot() -> Self {
        let mut bank = Self::new();
        bank.cpsr = Psr::default();
        bank.cpsr.set_mode(CpuMode::System);
        bank.sp[bank_index(CpuMode::System)] = 0x0300_7F00;
        bank.sp[bank_index(CpuMode::Irq)] = 0x0300_7FA0;
        bank.sp[bank_index(CpuMode::Supervisor)] = 0x0300_7FE0;
        bank.pc = 0x0800_0000;
        bank
    }

    pub fn cpsr(&self) -> Psr { self.cpsr }
    pub fn cpsr_mut(&mut self) -> &mut Psr { &mut self.cpsr }

    pub fn mode(&self) -> CpuMode { self.cpsr.mode() }
    pub fn state(&self) -> CpuState { self.cpsr.state() }

    /// Whether the current mode owns a saved status register.
    pub fn has_spsr(&self) -> bool { self.mode().is_privileged_bank() }

    /// Saved status register of the current mode, or the dummy word in
    /// User/System.
    pub fn spsr(&self) -> Psr {
        match bank_index(self.mode()) {
            0 => self.dummy_spsr,
            i => self.spsr[i - 1],
        }
    }

    pub fn spsr_mut(&mut self) -> &mut Psr {
        match bank_index(self.mode()) {
            0 => &mut self.dummy_spsr,
            i => &mut self.spsr[i - 1],
        }
    }

    /// Saved status register of an arbitrary mode.
    pub fn spsr_for(&self, mode: CpuMode) -> Option<Psr> {
        match bank_index(mode) {
            0 => None,
            i => Some(self.spsr[i - 1]),
        }
    }

    pub fn set_spsr_for(&mut self, mode: CpuMode, value: Psr) {
        match bank_index(mode) {
            0 => {}
            i => self.spsr[i - 1] = value,
        }
    }

    pub fn resolve(&self, index: usize) -> Result<&u32, CpuError> {
        self.resolve_in_mode(index, self.mode())
    }

    pub fn resolve_mut(&mut self, index: usize) -> Result<&mut u32, CpuError> {
        self.resolve_in_mode_mut(index, self.mode())
    }

    pub fn resolve_in_mode(&self, index: usize, mode: CpuMode) -> Result<&u32, CpuError> {
        Ok(match index {
            0..=7 => &self.gpr[index],
            8..=12 if mode == CpuMode::Fiq => &self.fiq_r8_r12[index - 8],
            8..=12 => &self.gpr[index],
            SP => &self.sp[bank_index(mode)],
            LR => &self.lr[bank_index(mode)],
            PC => &self.pc,
            _ => return Err(CpuError::InvalidRegister(index)),
        })
    }

    pub fn resolve_in_mode_mut(&mut self, index: usize, mode: CpuMode) -> Result<&mut u32, CpuError> {
        Ok(match index {
            0..=7 => &mut self.gpr[index],
            8..=12 if mode == CpuMode::Fiq => &mut self.fiq_r8_r12[index - 8],
            8..=12 => &mut self.gpr[index],
            SP => &mut self.sp[bank_index(mode)],
            LR => &mut self.lr[bank_index(mode)],
            PC => &mut self.pc,
            _ => return Err(CpuError::InvalidRegister(index)),
        })
    }

    pub fn read(&self, index: usize) -> Result<u32, CpuError> {
        self.resolve(index).copied()
    }

    pub fn write(&mut self, index: usize, value: u32) -> Result<(), CpuError> {
        *self.resolve_mut(index)? = value;
        Ok(())
    }

    pub fn pc(&self) -> u32 { self.pc }
    pub fn set_pc(&mut self, value: u32) { self.pc = value; }
}
