use thiserror::Error;

use crate::bus::BusAccess;

pub mod alu;
mod arm;
pub mod cond;
pub mod decode;
pub mod psr;
pub mod registers;
mod thumb;

pub use cond::Condition;
pub use decode::{ArmOp, DecodeTables, ThumbOp};
pub use psr::{CpuMode, CpuState, Psr};
pub use registers::{RegisterBank, LR, PC, SP};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum CpuError {
    /// Only a decoder defect can produce an index above 15.
    #[error("register index {0} is out of range")]
    InvalidRegister(usize),
}

/// Three-stage pipeline for one encoding width.
///
/// Only `decoding` and `executing` are stages. `fetched` is the fetch latch:
/// the word read by the most recent fetch cycle, which that same cycle hands
/// on to `decoding`, so after any cycle it mirrors `decoding`.
#[derive(Copy, Clone, Eq, PartialEq, Default, Debug)]
pub struct Pipeline<W> {
    /// Fetch latch, not a separate stage.
    pub fetched: W,
    pub decoding: W,
    pub executing: W,
}

impl<W: Copy + Default> Pipeline<W> {
    fn clear(&mut self) {
        *self = Self::default();
    }

    fn push(&mut self, word: W) {
        self.fetched = word;
        self.executing = self.decoding;
        self.decoding = self.fetched;
    }
}

pub struct Cpu {
    regs: RegisterBank,
    tables: DecodeTables,
    arm_pipe: Pipeline<u32>,
    thumb_pipe: Pipeline<u16>,
    flushed: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self::with_registers(RegisterBank::new())
    }

    pub fn with_registers(regs: RegisterBank) -> Self {
        Self {
            regs,
            tables: DecodeTables::new(),
            arm_pipe: Pipeline::default(),
            thumb_pipe: Pipeline::default(),
            flushed: false,
        }
    }

    pub fn regs(&self) -> &RegisterBank { &self.regs }
    pub fn regs_mut(&mut self) -> &mut RegisterBank { &mut self.regs }

    pub fn cpsr(&self) -> Psr { self.regs.cpsr() }
    pub fn cpsr_mut(&mut self) -> &mut Psr { self.regs.cpsr_mut() }
    pub fn spsr(&self) -> Psr { self.regs.spsr() }

    pub fn read_reg(&self, index: usize) -> Result<u32, CpuError> { self.regs.read(index) }
    pub fn write_reg(&mut self, index: usize, value: u32) -> Result<(), CpuError> { self.regs.write(index, value) }

    pub fn pc(&self) -> u32 { self.regs.pc() }
    pub fn set_pc(&mut self, value: u32) { self.regs.set_pc(value); }

    pub fn mode(&self) -> CpuMode { self.regs.mode() }
    pub fn state(&self) -> CpuState { self.regs.state() }

    pub fn arm_pipeline(&self) -> &Pipeline<u32> { &self.arm_pipe }
    pub fn thumb_pipeline(&self) -> &Pipeline<u16> { &self.thumb_pipe }
    pub fn decode_tables(&self) -> &DecodeTables { &self.tables }

    /// Whether the last dispatch redirected control flow.
    pub fn is_flushed(&self) -> bool { self.flushed }

    /// Address of the instruction sitting in the execute stage.
    pub fn executing_address(&self) -> u32 {
        self.pc().wrapping_sub(2 * self.state().width())
    }

    /// Prime the pipeline from the current PC. The first `step` afterwards
    /// advances normally.
    pub fn initialize<B: BusAccess>(&mut self, bus: &mut B) {
        self.flush(bus);
        self.flushed = false;
    }

    /// Refill the active pipeline from PC: the first word lands in the
    /// execute stage, the second in decode, and PC ends two instructions
    /// past the executing one. The next step does not advance.
    pub fn flush<B: BusAccess>(&mut self, bus: &mut B) {
        match self.state() {
            CpuState::Arm => {
                self.arm_pipe.clear();
                for _ in 0..2 {
                    let word = self.fetch_arm(bus);
                    self.arm_pipe.push(word);
                }
            }
            CpuState::Thumb => {
                self.thumb_pipe.clear();
                for _ in 0..2 {
                    let half = self.fetch_thumb(bus);
                    self.thumb_pipe.push(half);
                }
            }
        }
        self.flushed = true;
    }

    fn fetch_arm<B: BusAccess>(&mut self, bus: &mut B) -> u32 {
        let pc = self.regs.pc() & !3;
        bus.on_instruction_fetch(pc);
        let word = bus.read32(pc);
        self.regs.set_pc(pc.wrapping_add(4));
        word
    }

    fn fetch_thumb<B: BusAccess>(&mut self, bus: &mut B) -> u16 {
        let pc = self.regs.pc() & !1;
        bus.on_instruction_fetch(pc);
        let half = bus.read16(pc);
        self.regs.set_pc(pc.wrapping_add(2));
        half
    }

    /// Execute the instruction in the execute stage, then move the pipeline
    /// one stage forward unless the instruction flushed it.
    pub fn step<B: BusAccess>(&mut self, bus: &mut B) -> Result<(), CpuError> {
        match self.state() {
            CpuState::Arm => {
                let instr = self.arm_pipe.executing;
                if Condition::from_bits(instr >> 28).passed(self.regs.cpsr()) {
                    let op = self.tables.arm(instr);
                    #[cfg(feature = "trace_cpu")]
                    log::trace!("{:#010x}: {:08x} {:?}", self.executing_address(), instr, op);
                    self.execute_arm(bus, op, instr)?;
                }
            }
            CpuState::Thumb => {
                let instr = self.thumb_pipe.executing;
                let op = self.tables.thumb(instr);
                #[cfg(feature = "trace_cpu")]
                log::trace!("{:#010x}: {:04x} {:?}", self.executing_address(), instr, op);
                self.execute_thumb(bus, op, instr)?;
            }
        }

        if self.flushed {
            self.flushed = false;
        } else {
            match self.state() {
                CpuState::Arm => {
                    let word = self.fetch_arm(bus);
                    self.arm_pipe.push(word);
                }
                CpuState::Thumb => {
                    let half = self.fetch_thumb(bus);
                    self.thumb_pipe.push(half);
                }
            }
        }
        Ok(())
    }

    /// Jump to `target` in the current state and refill the pipeline.
    fn branch_to<B: BusAccess>(&mut self, bus: &mut B, target: u32) {
        let target = match self.state() {
            CpuState::Arm => target & !3,
            CpuState::Thumb => target & !1,
        };
        self.regs.set_pc(target);
        self.flush(bus);
    }

    /// Register write from an instruction; R15 redirects control flow.
    fn set_reg<B: BusAccess>(&mut self, bus: &mut B, index: usize, value: u32) -> Result<(), CpuError> {
        if index == PC {
            self.branch_to(bus, value);
            Ok(())
        } else {
            self.regs.write(index, value)
        }
    }

    /// Copy SPSR into CPSR, if the current mode has one.
    fn restore_cpsr(&mut self) {
        if self.regs.has_spsr() {
            let spsr = self.regs.spsr();
            *self.regs.cpsr_mut() = spsr;
        }
    }

    fn enter_exception<B: BusAccess>(
        &mut self,
        bus: &mut B,
        mode: CpuMode,
        vector: u32,
        return_addr: u32,
    ) -> Result<(), CpuError> {
        let saved = self.regs.cpsr();
        self.regs.set_spsr_for(mode, saved);
        let cpsr = self.regs.cpsr_mut();
        cpsr.set_mode(mode);
        cpsr.set_state(CpuState::Arm);
        cpsr.set_i(true);
        self.regs.write(LR, return_addr)?;
        log::debug!("exception entry {:?} from {:#010x}", mode, return_addr);
        self.branch_to(bus, vector);
        Ok(())
    }
}
