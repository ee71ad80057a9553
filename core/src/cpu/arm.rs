use super::alu::{self, ShiftType};
use super::psr::{CONTROL_MASK, FLAGS_MASK};
use super::{ArmOp, Cpu, CpuError, CpuMode, CpuState, LR, PC};
use crate::bus::BusAccess;

const T_BIT: u32 = 1 << 5;

#[inline]
fn bit(instr: u32, n: u32) -> bool {
    instr & (1 << n) != 0
}

#[inline]
fn reg(instr: u32, shift: u32) -> usize {
    ((instr >> shift) & 0xF) as usize
}

impl Cpu {
    pub(super) fn execute_arm<B: BusAccess>(&mut self, bus: &mut B, op: ArmOp, instr: u32) -> Result<(), CpuError> {
        match op {
            ArmOp::DataProcessing => self.arm_data_processing(bus, instr),
            ArmOp::Multiply => self.arm_multiply(instr),
            ArmOp::MultiplyLong => self.arm_multiply_long(instr),
            ArmOp::SingleDataSwap => self.arm_swap(bus, instr),
            ArmOp::BranchExchange => self.arm_branch_exchange(bus, instr),
            ArmOp::HalfwordDataTransfer => self.arm_halfword_transfer(bus, instr),
            ArmOp::PsrTransfer => self.arm_psr_transfer(instr),
            ArmOp::SingleDataTransfer => self.arm_single_transfer(bus, instr),
            ArmOp::BlockDataTransfer => self.arm_block_transfer(bus, instr),
            ArmOp::Branch => self.arm_branch(bus, instr),
            ArmOp::SoftwareInterrupt => {
                let ret = self.pc().wrapping_sub(4);
                self.enter_exception(bus, CpuMode::Supervisor, 0x08, ret)
            }
            ArmOp::CoprocessorDataTransfer
            | ArmOp::CoprocessorDataOperation
            | ArmOp::CoprocessorRegisterTransfer => {
                log::debug!("coprocessor instruction {:08x} at {:#010x} ignored", instr, self.executing_address());
                Ok(())
            }
            ArmOp::Undefined => {
                log::warn!("undefined ARM instruction {:08x} at {:#010x}", instr, self.executing_address());
                Ok(())
            }
        }
    }

    /// Register operand with an immediate or register shift. A register
    /// shift costs an extra cycle, so R15 reads one word further ahead.
    fn arm_shifted_register(&self, instr: u32) -> Result<(u32, bool), CpuError> {
        let carry = self.regs.cpsr().c();
        let rm = reg(instr, 0);
        let kind = ShiftType::from_bits(instr >> 5);
        let mut value = self.regs.read(rm)?;
        if bit(instr, 4) {
            if rm == PC {
                value = value.wrapping_add(4);
            }
            let amount = self.regs.read(reg(instr, 8))? & 0xFF;
            Ok(alu::barrel_shift(kind, value, amount, carry, false))
        } else {
            Ok(alu::barrel_shift(kind, value, (instr >> 7) & 0x1F, carry, true))
        }
    }

    fn arm_operand2(&self, instr: u32) -> Result<(u32, bool), CpuError> {
        if bit(instr, 25) {
            Ok(alu::rotated_immediate(instr & 0xFF, (instr >> 8) & 0xF, self.regs.cpsr().c()))
        } else {
            self.arm_shifted_register(instr)
        }
    }

    fn arm_data_processing<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let opcode = (instr >> 21) & 0xF;
        let rn = reg(instr, 16);
        let rd = reg(instr, 12);
        let (op2, shifter_carry) = self.arm_operand2(instr)?;

        let mut a = self.regs.read(rn)?;
        if rn == PC && !bit(instr, 25) && bit(instr, 4) {
            a = a.wrapping_add(4);
        }
        let carry = self.regs.cpsr().c();

        // arith carries (C, V); None means a logical op taking the shifter carry
        let (result, arith) = match opcode {
            0x0 | 0x8 => (a & op2, None),
            0x1 | 0x9 => (a ^ op2, None),
            0x2 | 0xA => {
                let (r, c, v) = alu::sub_with_carry(a, op2, true);
                (r, Some((c, v)))
            }
            0x3 => {
                let (r, c, v) = alu::sub_with_carry(op2, a, true);
                (r, Some((c, v)))
            }
            0x4 | 0xB => {
                let (r, c, v) = alu::add_with_carry(a, op2, false);
                (r, Some((c, v)))
            }
            0x5 => {
                let (r, c, v) = alu::add_with_carry(a, op2, carry);
                (r, Some((c, v)))
            }
            0x6 => {
                let (r, c, v) = alu::sub_with_carry(a, op2, carry);
                (r, Some((c, v)))
            }
            0x7 => {
                let (r, c, v) = alu::sub_with_carry(op2, a, carry);
                (r, Some((c, v)))
            }
            0xC => (a | op2, None),
            0xD => (op2, None),
            0xE => (a & !op2, None),
            _ => (!op2, None),
        };

        let writes = !(0x8..=0xB).contains(&opcode);
        let set_flags = bit(instr, 20) || !writes;

        if set_flags {
            if writes && rd == PC {
                self.restore_cpsr();
            } else {
                let cpsr = self.regs.cpsr_mut();
                cpsr.set_nz(result);
                match arith {
                    Some((c, v)) => {
                        cpsr.set_c(c);
                        cpsr.set_v(v);
                    }
                    None => cpsr.set_c(shifter_carry),
                }
            }
        }

        if writes {
            self.set_reg(bus, rd, result)?;
        }
        Ok(())
    }

    fn arm_multiply(&mut self, instr: u32) -> Result<(), CpuError> {
        let rd = reg(instr, 16);
        let rm = self.regs.read(reg(instr, 0))?;
        let rs = self.regs.read(reg(instr, 8))?;
        let mut result = rm.wrapping_mul(rs);
        if bit(instr, 21) {
            result = result.wrapping_add(self.regs.read(reg(instr, 12))?);
        }
        self.regs.write(rd, result)?;
        if bit(instr, 20) {
            self.regs.cpsr_mut().set_nz(result);
        }
        Ok(())
    }

    fn arm_multiply_long(&mut self, instr: u32) -> Result<(), CpuError> {
        let rd_hi = reg(instr, 16);
        let rd_lo = reg(instr, 12);
        let rm = self.regs.read(reg(instr, 0))?;
        let rs = self.regs.read(reg(instr, 8))?;

        let mut product = if bit(instr, 22) {
            (rm as i32 as i64).wrapping_mul(rs as i32 as i64) as u64
        } else {
            (rm as u64) * (rs as u64)
        };
        if bit(instr, 21) {
            let acc = ((self.regs.read(rd_hi)? as u64) << 32) | self.regs.read(rd_lo)? as u64;
            product = product.wrapping_add(acc);
        }

        self.regs.write(rd_lo, product as u32)?;
        self.regs.write(rd_hi, (product >> 32) as u32)?;
        if bit(instr, 20) {
            let cpsr = self.regs.cpsr_mut();
            cpsr.set_n(product >> 63 != 0);
            cpsr.set_z(product == 0);
        }
        Ok(())
    }

    fn arm_swap<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let addr = self.regs.read(reg(instr, 16))?;
        let source = self.regs.read(reg(instr, 0))?;
        let rd = reg(instr, 12);

        let old = if bit(instr, 22) {
            let old = bus.read8(addr) as u32;
            bus.write8(addr, source as u8);
            old
        } else {
            let old = bus.read32(addr);
            bus.write32(addr, source);
            old
        };
        self.regs.write(rd, old)
    }

    fn arm_branch_exchange<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let target = self.regs.read(reg(instr, 0))?;
        let state = if target & 1 != 0 { CpuState::Thumb } else { CpuState::Arm };
        self.regs.cpsr_mut().set_state(state);
        self.branch_to(bus, target);
        Ok(())
    }

    /// Resolve base + offset for a load/store. Returns the transfer address
    /// and the value written back to the base, if any.
    fn indexed_address(&self, instr: u32, base: u32, offset: u32) -> (u32, Option<u32>) {
        let pre = bit(instr, 24);
        let offset_addr = if bit(instr, 23) {
            base.wrapping_add(offset)
        } else {
            base.wrapping_sub(offset)
        };
        let addr = if pre { offset_addr } else { base };
        // post-indexing always writes back
        let writeback = (!pre || bit(instr, 21)) && reg(instr, 16) != PC;
        (addr, writeback.then_some(offset_addr))
    }

    fn arm_halfword_transfer<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let rn = reg(instr, 16);
        let rd = reg(instr, 12);
        let offset = if bit(instr, 22) {
            ((instr >> 4) & 0xF0) | (instr & 0xF)
        } else {
            self.regs.read(reg(instr, 0))?
        };
        let base = self.regs.read(rn)?;
        let (addr, writeback) = self.indexed_address(instr, base, offset);
        let sh = (instr >> 5) & 0x3;

        if bit(instr, 20) {
            let value = match sh {
                1 => (bus.read16(addr & !1) as u32).rotate_right((addr & 1) * 8),
                2 => bus.read8(addr) as i8 as i32 as u32,
                _ if addr & 1 != 0 => bus.read8(addr) as i8 as i32 as u32,
                _ => bus.read16(addr) as i16 as i32 as u32,
            };
            if let Some(wb) = writeback {
                self.regs.write(rn, wb)?;
            }
            self.set_reg(bus, rd, value)?;
        } else {
            if sh == 1 {
                let mut value = self.regs.read(rd)?;
                if rd == PC {
                    value = value.wrapping_add(4);
                }
                bus.write16(addr, value as u16);
            } else {
                log::debug!("signed store {:08x} ignored", instr);
            }
            if let Some(wb) = writeback {
                self.regs.write(rn, wb)?;
            }
        }
        Ok(())
    }

    fn arm_psr_transfer(&mut self, instr: u32) -> Result<(), CpuError> {
        let use_spsr = bit(instr, 22);

        if !bit(instr, 21) {
            // MRS
            let value = if use_spsr { self.regs.spsr().raw() } else { self.regs.cpsr().raw() };
            return self.regs.write(reg(instr, 12), value);
        }

        let operand = if bit(instr, 25) {
            alu::rotated_immediate(instr & 0xFF, (instr >> 8) & 0xF, false).0
        } else {
            self.regs.read(reg(instr, 0))?
        };

        let mut mask = 0;
        if bit(instr, 19) {
            mask |= FLAGS_MASK;
        }
        if bit(instr, 16) && self.regs.mode() != CpuMode::User {
            mask |= CONTROL_MASK;
        }

        if use_spsr {
            if self.regs.has_spsr() {
                self.regs.spsr_mut().write_masked(operand, mask);
            }
        } else {
            self.regs.cpsr_mut().write_masked(operand, mask & !T_BIT);
        }
        Ok(())
    }

    fn arm_single_transfer<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let rn = reg(instr, 16);
        let rd = reg(instr, 12);
        let offset = if bit(instr, 25) {
            self.arm_shifted_register(instr)?.0
        } else {
            instr & 0xFFF
        };
        let base = self.regs.read(rn)?;
        let (addr, writeback) = self.indexed_address(instr, base, offset);
        let byte = bit(instr, 22);

        if bit(instr, 20) {
            let value = if byte { bus.read8(addr) as u32 } else { bus.read32(addr) };
            if let Some(wb) = writeback {
                self.regs.write(rn, wb)?;
            }
            self.set_reg(bus, rd, value)?;
        } else {
            let mut value = self.regs.read(rd)?;
            if rd == PC {
                value = value.wrapping_add(4);
            }
            if byte {
                bus.write8(addr, value as u8);
            } else {
                bus.write32(addr, value);
            }
            if let Some(wb) = writeback {
                self.regs.write(rn, wb)?;
            }
        }
        Ok(())
    }

    fn arm_block_transfer<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let pre = bit(instr, 24);
        let up = bit(instr, 23);
        let psr_or_user = bit(instr, 22);
        let writeback = bit(instr, 21);
        let load = bit(instr, 20);
        let rn = reg(instr, 16);

        // An empty list moves R15 alone but steps the base by 16 words.
        let list = match instr & 0xFFFF {
            0 => 1 << PC,
            l => l,
        };
        let span = if instr & 0xFFFF == 0 { 0x40 } else { list.count_ones() * 4 };

        let base = self.regs.read(rn)?;
        let (start, new_base) = match (up, pre) {
            (true, false) => (base, base.wrapping_add(span)),
            (true, true) => (base.wrapping_add(4), base.wrapping_add(span)),
            (false, false) => (base.wrapping_sub(span).wrapping_add(4), base.wrapping_sub(span)),
            (false, true) => (base.wrapping_sub(span), base.wrapping_sub(span)),
        };

        let loads_pc = load && list & (1 << PC) != 0;
        let bank = if psr_or_user && !loads_pc { CpuMode::User } else { self.regs.mode() };

        let mut addr = start;
        if load {
            if writeback {
                self.regs.write(rn, new_base)?;
            }
            let mut pc_value = None;
            for i in (0..16).filter(|i| list & (1 << i) != 0) {
                let value = bus.read32(addr & !3);
                if i == PC {
                    pc_value = Some(value);
                } else {
                    *self.regs.resolve_in_mode_mut(i, bank)? = value;
                }
                addr = addr.wrapping_add(4);
            }
            if let Some(target) = pc_value {
                if psr_or_user {
                    self.restore_cpsr();
                }
                self.branch_to(bus, target);
            }
        } else {
            for (n, i) in (0..16).filter(|i| list & (1 << i) != 0).enumerate() {
                let value = if i == PC {
                    self.regs.pc().wrapping_add(4)
                } else {
                    *self.regs.resolve_in_mode(i, bank)?
                };
                bus.write32(addr & !3, value);
                addr = addr.wrapping_add(4);
                // the base is updated after the first store
                if n == 0 && writeback {
                    self.regs.write(rn, new_base)?;
                }
            }
        }
        Ok(())
    }

    fn arm_branch<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let offset = ((instr << 8) as i32 >> 6) as u32;
        let pc = self.regs.pc();
        if bit(instr, 24) {
            self.regs.write(LR, pc.wrapping_sub(4))?;
        }
        self.branch_to(bus, pc.wrapping_add(offset));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{arm_cpu, MockBus};
    use super::super::*;
    use crate::bus::{Bus, BusAccess};

    const NOP: u32 = 0xE1A0_0000;

    fn run(program: &[u32], steps: usize, setup: impl FnOnce(&mut Cpu, &mut MockBus)) -> (Cpu, MockBus) {
        let mut padded = program.to_vec();
        padded.extend([NOP; 4]);
        let (mut cpu, mut bus) = arm_cpu(&padded);
        setup(&mut cpu, &mut bus);
        for _ in 0..steps {
            cpu.step(&mut bus).unwrap();
        }
        (cpu, bus)
    }

    fn dp_imm(opcode: u32, s: bool, rn: u32, rd: u32, imm: u32) -> u32 {
        (0xE << 28) | (1 << 25) | (opcode << 21) | ((s as u32) << 20) | (rn << 16) | (rd << 12) | imm
    }

    #[test]
    fn cmp_equal_sets_zero_and_carry() {
        let (cpu, _) = run(&[dp_imm(0xA, true, 0, 0, 5)], 1, |cpu, _| {
            cpu.write_reg(0, 5).unwrap();
        });
        let cpsr = cpu.cpsr();
        assert!(cpsr.z());
        assert!(cpsr.c());
        assert!(!cpsr.n());
        assert!(!cpsr.v());
        assert_eq!(cpu.read_reg(0).unwrap(), 5);
    }

    #[test]
    fn adds_signed_overflow() {
        // ADDS r2, r0, r1
        let instr = (0xE << 28) | (0x4 << 21) | (1 << 20) | (0 << 16) | (2 << 12) | 1;
        let (cpu, _) = run(&[instr], 1, |cpu, _| {
            cpu.write_reg(0, 0x7FFF_FFFF).unwrap();
            cpu.write_reg(1, 1).unwrap();
        });
        assert_eq!(cpu.read_reg(2).unwrap(), 0x8000_0000);
        let cpsr = cpu.cpsr();
        assert!(cpsr.n());
        assert!(cpsr.v());
        assert!(!cpsr.c());
        assert!(!cpsr.z());
    }

    #[test]
    fn subs_borrow_clears_carry() {
        let (cpu, _) = run(&[dp_imm(0x2, true, 0, 1, 1)], 1, |_, _| {});
        assert_eq!(cpu.read_reg(1).unwrap(), 0xFFFF_FFFF);
        assert!(!cpu.cpsr().c());
        assert!(cpu.cpsr().n());
    }

    #[test]
    fn movs_shift_by_32_from_register() {
        // MOVS r0, r1, LSL r2
        let instr = (0xE << 28) | (0xD << 21) | (1 << 20) | (2 << 8) | (1 << 4) | 1;
        let (cpu, _) = run(&[instr], 1, |cpu, _| {
            cpu.write_reg(1, 1).unwrap();
            cpu.write_reg(2, 32).unwrap();
        });
        assert_eq!(cpu.read_reg(0).unwrap(), 0);
        assert!(cpu.cpsr().c());
        assert!(cpu.cpsr().z());
    }

    #[test]
    fn pc_operand_reads_ahead() {
        // MOV r0, pc ; MOV r1, pc, LSL r2 (r2 = 0)
        let mov_pc = (0xE << 28) | (0xD << 21) | 15;
        let mov_pc_reg_shift = (0xE << 28) | (0xD << 21) | (1 << 12) | (2 << 8) | (1 << 4) | 15;
        let (cpu, _) = run(&[mov_pc, mov_pc_reg_shift], 2, |_, _| {});
        assert_eq!(cpu.read_reg(0).unwrap(), 8);
        assert_eq!(cpu.read_reg(1).unwrap(), 4 + 12);
    }

    #[test]
    fn movs_negative_immediate_takes_shifter_carry() {
        // MOVS r0, #0x80000000 (0x02 ror 2)
        let (cpu, _) = run(&[dp_imm(0xD, true, 0, 0, (1 << 8) | 0x02)], 1, |_, _| {});
        assert_eq!(cpu.read_reg(0).unwrap(), 0x8000_0000);
        assert!(cpu.cpsr().n());
        assert!(cpu.cpsr().c());
    }

    #[test]
    fn teq_sets_flags_without_writing() {
        let (cpu, _) = run(&[dp_imm(0x9, true, 1, 0, 0xFF)], 1, |cpu, _| {
            cpu.write_reg(0, 0x55).unwrap();
            cpu.write_reg(1, 0xFF).unwrap();
        });
        assert!(cpu.cpsr().z());
        assert_eq!(cpu.read_reg(0).unwrap(), 0x55);
    }

    #[test]
    fn logical_ops_keep_overflow() {
        let (cpu, _) = run(&[dp_imm(0xD, true, 0, 0, 0)], 1, |cpu, _| {
            cpu.cpsr_mut().set_v(true);
        });
        assert!(cpu.cpsr().v());
        assert!(cpu.cpsr().z());
    }

    #[test]
    fn subs_pc_lr_restores_cpsr() {
        // SUBS pc, lr, #4 from IRQ mode
        let instr = dp_imm(0x2, true, 14, 15, 4);
        let (cpu, _) = run(&[instr], 1, |cpu, _| {
            cpu.cpsr_mut().set_mode(CpuMode::Irq);
            cpu.write_reg(LR, 0x104).unwrap();
            let mut saved = Psr::default();
            saved.set_mode(CpuMode::User);
            saved.set_z(true);
            cpu.regs_mut().set_spsr_for(CpuMode::Irq, saved);
        });
        assert_eq!(cpu.mode(), CpuMode::User);
        assert!(cpu.cpsr().z());
        assert_eq!(cpu.executing_address(), 0x100);
    }

    #[test]
    fn branch_with_link_records_return() {
        // BL +0x10 at 0
        let (cpu, _) = run(&[0xEB00_0004], 1, |_, _| {});
        assert_eq!(cpu.read_reg(LR).unwrap(), 4);
        assert_eq!(cpu.executing_address(), 0x18);
        assert_eq!(cpu.pc(), 0x20);
    }

    #[test]
    fn branch_backwards() {
        // at 0x10: B -0x10 (target 0x8)
        let mut program = vec![NOP; 4];
        program.push(0xEAFF_FFFC);
        let (mut cpu, mut bus) = arm_cpu(&program);
        cpu.set_pc(0x10);
        cpu.initialize(&mut bus);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.executing_address(), 0x8);
    }

    #[test]
    fn bx_switches_to_thumb() {
        // BX r0
        let (cpu, _) = run(&[0xE12F_FF10], 1, |cpu, _| {
            cpu.write_reg(0, 0x101).unwrap();
        });
        assert_eq!(cpu.state(), CpuState::Thumb);
        assert!(cpu.cpsr().t());
        assert_eq!(cpu.pc(), 0x104);
        assert_eq!(cpu.executing_address(), 0x100);
    }

    #[test]
    fn bx_to_arm_aligns_target() {
        let (cpu, _) = run(&[0xE12F_FF10], 1, |cpu, _| {
            cpu.write_reg(0, 0x102).unwrap();
        });
        assert_eq!(cpu.state(), CpuState::Arm);
        assert_eq!(cpu.executing_address(), 0x100);
    }

    #[test]
    fn multiply_accumulate() {
        // MLAS r0, r1, r2, r3
        let instr = (0xE << 28) | (1 << 21) | (1 << 20) | (0 << 16) | (3 << 12) | (2 << 8) | (0x9 << 4) | 1;
        let (cpu, _) = run(&[instr], 1, |cpu, _| {
            cpu.write_reg(1, 6).unwrap();
            cpu.write_reg(2, 7).unwrap();
            cpu.write_reg(3, 100).unwrap();
        });
        assert_eq!(cpu.read_reg(0).unwrap(), 142);
        assert!(!cpu.cpsr().z());
    }

    #[test]
    fn signed_multiply_long() {
        // SMULL r0, r1, r2, r3
        let instr = (0xE << 28) | (0x0C << 20) | (1 << 16) | (0 << 12) | (3 << 8) | (0x9 << 4) | 2;
        let (cpu, _) = run(&[instr], 1, |cpu, _| {
            cpu.write_reg(2, (-3i32) as u32).unwrap();
            cpu.write_reg(3, 5).unwrap();
        });
        assert_eq!(cpu.read_reg(0).unwrap(), (-15i32) as u32);
        assert_eq!(cpu.read_reg(1).unwrap(), 0xFFFF_FFFF);
    }

    #[test]
    fn unsigned_multiply_long_accumulate() {
        // UMLAL r0, r1, r2, r3
        let instr = (0xE << 28) | (0x0A << 20) | (1 << 16) | (0 << 12) | (3 << 8) | (0x9 << 4) | 2;
        let (cpu, _) = run(&[instr], 1, |cpu, _| {
            cpu.write_reg(0, 0xFFFF_FFFF).unwrap();
            cpu.write_reg(1, 1).unwrap();
            cpu.write_reg(2, 2).unwrap();
            cpu.write_reg(3, 1).unwrap();
        });
        assert_eq!(cpu.read_reg(0).unwrap(), 1);
        assert_eq!(cpu.read_reg(1).unwrap(), 2);
    }

    #[test]
    fn ldr_str_word_with_writeback() {
        // STR r1, [r0, #4]! ; LDR r2, [r0], #-4
        let str_pre = (0xE << 28) | (0x1 << 26) | (1 << 24) | (1 << 23) | (1 << 21) | (0 << 16) | (1 << 12) | 4;
        let ldr_post = (0xE << 28) | (0x1 << 26) | (1 << 20) | (0 << 16) | (2 << 12) | 4;
        let (cpu, mut bus) = run(&[str_pre, ldr_post], 2, |cpu, _| {
            cpu.write_reg(0, 0x200).unwrap();
            cpu.write_reg(1, 0xCAFE_BABE).unwrap();
        });
        assert_eq!(bus.read32(0x204), 0xCAFE_BABE);
        assert_eq!(cpu.read_reg(2).unwrap(), 0xCAFE_BABE);
        assert_eq!(cpu.read_reg(0).unwrap(), 0x200);
    }

    #[test]
    fn strb_and_ldrb() {
        // STRB r1, [r0] ; LDRB r2, [r0]
        let strb = (0xE << 28) | (0x1 << 26) | (1 << 24) | (1 << 23) | (1 << 22) | (1 << 12);
        let ldrb = (strb & !(0xF << 12)) | (1 << 20) | (2 << 12);
        let (cpu, mut bus) = run(&[strb, ldrb], 2, |cpu, _| {
            cpu.write_reg(0, 0x200).unwrap();
            cpu.write_reg(1, 0x1234_56AB).unwrap();
        });
        assert_eq!(bus.read8(0x200), 0xAB);
        assert_eq!(bus.read8(0x201), 0);
        assert_eq!(cpu.read_reg(2).unwrap(), 0xAB);
    }

    #[test]
    fn ldr_scaled_register_offset() {
        // LDR r2, [r0, r1, LSL #2]
        let instr = (0xE << 28) | (0x3 << 25) | (1 << 24) | (1 << 23) | (1 << 20) | (0 << 16) | (2 << 12) | (2 << 7) | 1;
        let (cpu, _) = run(&[instr], 1, |cpu, bus| {
            cpu.write_reg(0, 0x200).unwrap();
            cpu.write_reg(1, 3).unwrap();
            bus.write32(0x20C, 77);
        });
        assert_eq!(cpu.read_reg(2).unwrap(), 77);
    }

    #[test]
    fn ldr_into_pc_branches() {
        // LDR pc, [r0]
        let instr = (0xE << 28) | (0x1 << 26) | (1 << 24) | (1 << 23) | (1 << 20) | (15 << 12);
        let (cpu, _) = run(&[instr], 1, |cpu, bus| {
            cpu.write_reg(0, 0x200).unwrap();
            bus.write32(0x200, 0x100);
        });
        assert_eq!(cpu.executing_address(), 0x100);
    }

    #[test]
    fn str_pc_stores_address_plus_twelve() {
        // STR pc, [r0]
        let instr = (0xE << 28) | (0x1 << 26) | (1 << 24) | (1 << 23) | (15 << 12);
        let (_, mut bus) = run(&[instr], 1, |cpu, _| {
            cpu.write_reg(0, 0x200).unwrap();
        });
        assert_eq!(bus.read32(0x200), 12);
    }

    #[test]
    fn halfword_loads_sign_extend() {
        // LDRH r1, [r0] ; LDRSH r2, [r0] ; LDRSB r3, [r0, #1]
        let base = (0xE << 28) | (1 << 24) | (1 << 23) | (1 << 22) | (1 << 20) | (0x9 << 4);
        let ldrh = base | (0x1 << 5) | (1 << 12);
        let ldrsh = base | (0x3 << 5) | (2 << 12);
        let ldrsb = base | (0x2 << 5) | (3 << 12) | 1;
        let (cpu, _) = run(&[ldrh, ldrsh, ldrsb], 3, |cpu, bus| {
            cpu.write_reg(0, 0x200).unwrap();
            bus.write16(0x200, 0x8081);
        });
        assert_eq!(cpu.read_reg(1).unwrap(), 0x8081);
        assert_eq!(cpu.read_reg(2).unwrap(), 0xFFFF_8081);
        assert_eq!(cpu.read_reg(3).unwrap(), 0xFFFF_FF80);
    }

    #[test]
    fn strh_with_register_offset() {
        // STRH r1, [r0, -r2]
        let instr = (0xE << 28) | (1 << 24) | (1 << 12) | (0x1 << 5) | (0x9 << 4) | 2;
        let (_, mut bus) = run(&[instr], 1, |cpu, _| {
            cpu.write_reg(0, 0x210).unwrap();
            cpu.write_reg(1, 0xFFFF_1234).unwrap();
            cpu.write_reg(2, 0x10).unwrap();
        });
        assert_eq!(bus.read16(0x200), 0x1234);
        assert_eq!(bus.read16(0x202), 0);
    }

    #[test]
    fn swap_word_and_byte() {
        // SWP r2, r1, [r0] ; SWPB r3, r1, [r4]
        let swp = (0xE << 28) | (0x10 << 20) | (0 << 16) | (2 << 12) | (0x9 << 4) | 1;
        let swpb = (0xE << 28) | (0x14 << 20) | (4 << 16) | (3 << 12) | (0x9 << 4) | 1;
        let (cpu, mut bus) = run(&[swp, swpb], 2, |cpu, bus| {
            cpu.write_reg(0, 0x200).unwrap();
            cpu.write_reg(1, 0x1122_3344).unwrap();
            cpu.write_reg(4, 0x300).unwrap();
            bus.write32(0x200, 0xAAAA_BBBB);
            bus.write8(0x300, 0x5A);
        });
        assert_eq!(cpu.read_reg(2).unwrap(), 0xAAAA_BBBB);
        assert_eq!(bus.read32(0x200), 0x1122_3344);
        assert_eq!(cpu.read_reg(3).unwrap(), 0x5A);
        assert_eq!(bus.read8(0x300), 0x44);
    }

    #[test]
    fn stmdb_ldmia_round_trip() {
        // STMDB sp!, {r0-r2, lr} ; LDMIA sp!, {r4-r6, r8}
        let stmdb = 0xE92D_4007;
        let ldmia = 0xE8BD_0170;
        let (cpu, mut bus) = run(&[stmdb, ldmia], 2, |cpu, _| {
            cpu.write_reg(SP, 0x300).unwrap();
            cpu.write_reg(0, 1).unwrap();
            cpu.write_reg(1, 2).unwrap();
            cpu.write_reg(2, 3).unwrap();
            cpu.write_reg(LR, 4).unwrap();
        });
        assert_eq!(bus.read32(0x2F0), 1);
        assert_eq!(bus.read32(0x2FC), 4);
        assert_eq!(cpu.read_reg(SP).unwrap(), 0x300);
        assert_eq!(cpu.read_reg(4).unwrap(), 1);
        assert_eq!(cpu.read_reg(5).unwrap(), 2);
        assert_eq!(cpu.read_reg(6).unwrap(), 3);
        assert_eq!(cpu.read_reg(8).unwrap(), 4);
    }

    #[test]
    fn decrement_after_addresses() {
        // STMDA r0!, {r1, r2}
        let instr = (0xE << 28) | (0x4 << 25) | (1 << 21) | (0 << 16) | 0b110;
        let (cpu, mut bus) = run(&[instr], 1, |cpu, _| {
            cpu.write_reg(0, 0x300).unwrap();
            cpu.write_reg(1, 11).unwrap();
            cpu.write_reg(2, 22).unwrap();
        });
        assert_eq!(bus.read32(0x2FC), 11);
        assert_eq!(bus.read32(0x300), 22);
        assert_eq!(cpu.read_reg(0).unwrap(), 0x2F8);
    }

    #[test]
    fn ldm_with_pc_branches() {
        // LDMIA r0, {r1, pc}
        let instr = (0xE << 28) | (0x4 << 25) | (1 << 23) | (1 << 20) | (1 << 15) | (1 << 1);
        let (cpu, _) = run(&[instr], 1, |cpu, bus| {
            cpu.write_reg(0, 0x200).unwrap();
            bus.write32(0x200, 9);
            bus.write32(0x204, 0x100);
        });
        assert_eq!(cpu.read_reg(1).unwrap(), 9);
        assert_eq!(cpu.executing_address(), 0x100);
    }

    #[test]
    fn stm_user_bank_from_irq() {
        // STMIA r0, {sp}^ from IRQ mode stores the User SP
        let instr = (0xE << 28) | (0x4 << 25) | (1 << 23) | (1 << 22) | (1 << SP);
        let (_, mut bus) = run(&[instr], 1, |cpu, _| {
            cpu.write_reg(SP, 0x1111).unwrap();
            cpu.cpsr_mut().set_mode(CpuMode::Irq);
            cpu.write_reg(SP, 0x2222).unwrap();
            cpu.write_reg(0, 0x200).unwrap();
        });
        assert_eq!(bus.read32(0x200), 0x1111);
    }

    #[test]
    fn mrs_and_msr_flags() {
        // MSR cpsr_f, #0xF0000000 ; MRS r0, cpsr
        let msr = 0xE328_F20F;
        let mrs = 0xE10F_0000;
        let (cpu, _) = run(&[msr, mrs], 2, |_, _| {});
        let cpsr = cpu.cpsr();
        assert!(cpsr.n() && cpsr.z() && cpsr.c() && cpsr.v());
        assert_eq!(cpu.mode(), CpuMode::System);
        assert_eq!(cpu.read_reg(0).unwrap(), cpsr.raw());
    }

    #[test]
    fn msr_control_switches_mode_but_not_state() {
        // MSR cpsr_c, r0
        let instr = 0xE121_F000;
        let (cpu, _) = run(&[instr], 1, |cpu, _| {
            cpu.write_reg(0, 0x20 | CpuMode::Irq.bits()).unwrap();
        });
        assert_eq!(cpu.mode(), CpuMode::Irq);
        assert_eq!(cpu.state(), CpuState::Arm);
    }

    #[test]
    fn msr_spsr() {
        // MSR spsr_fc, r0 in Supervisor mode
        let instr = 0xE169_F000;
        let (cpu, _) = run(&[instr], 1, |cpu, _| {
            cpu.cpsr_mut().set_mode(CpuMode::Supervisor);
            cpu.write_reg(0, 0x8000_0010).unwrap();
        });
        assert_eq!(cpu.spsr().raw(), 0x8000_0010);
        assert_eq!(cpu.regs().spsr_for(CpuMode::Supervisor).map(|p| p.raw()), Some(0x8000_0010));
    }

    #[test]
    fn swi_enters_supervisor() {
        let (cpu, _) = run(&[NOP, 0xEF00_0001], 2, |cpu, _| {
            cpu.cpsr_mut().set_z(true);
        });
        assert_eq!(cpu.mode(), CpuMode::Supervisor);
        assert!(cpu.cpsr().i());
        assert_eq!(cpu.read_reg(LR).unwrap(), 8);
        assert_eq!(cpu.executing_address(), 0x08);
        let saved = cpu.spsr();
        assert_eq!(saved.mode(), CpuMode::System);
        assert!(saved.z());
    }

    #[test]
    fn ldm_empty_list_loads_pc_and_steps_base() {
        // LDMIA r0!, {}
        let (cpu, _) = run(&[0xE8B0_0000], 1, |cpu, bus| {
            cpu.write_reg(0, 0x200).unwrap();
            bus.write32(0x200, 0x100);
        });
        assert_eq!(cpu.executing_address(), 0x100);
        assert_eq!(cpu.read_reg(0).unwrap(), 0x240);
    }

    #[test]
    fn stm_empty_list_stores_pc_and_steps_base() {
        // STMIA r0!, {}
        let (cpu, mut bus) = run(&[0xE8A0_0000], 1, |cpu, _| {
            cpu.write_reg(0, 0x200).unwrap();
        });
        assert_eq!(bus.read32(0x200), 12);
        assert_eq!(cpu.read_reg(0).unwrap(), 0x240);
    }

    #[test]
    fn ldr_into_base_wins_over_writeback() {
        // LDR r0, [r0], #4
        let (cpu, _) = run(&[0xE490_0004], 1, |cpu, bus| {
            cpu.write_reg(0, 0x200).unwrap();
            bus.write32(0x200, 0x1234);
        });
        assert_eq!(cpu.read_reg(0).unwrap(), 0x1234);
    }

    #[test]
    fn ldm_into_base_wins_over_writeback() {
        // LDMIA r0!, {r0, r1}
        let (cpu, _) = run(&[0xE8B0_0003], 1, |cpu, bus| {
            cpu.write_reg(0, 0x200).unwrap();
            bus.write32(0x200, 0xAAAA);
            bus.write32(0x204, 0xBBBB);
        });
        assert_eq!(cpu.read_reg(0).unwrap(), 0xAAAA);
        assert_eq!(cpu.read_reg(1).unwrap(), 0xBBBB);
    }

    #[test]
    fn stm_base_position_decides_stored_value() {
        // STMIA r1!, {r0, r1} ; STMIA r2!, {r2, r3}
        let (cpu, mut bus) = run(&[0xE8A1_0003, 0xE8A2_000C], 2, |cpu, _| {
            cpu.write_reg(0, 7).unwrap();
            cpu.write_reg(1, 0x200).unwrap();
            cpu.write_reg(2, 0x300).unwrap();
            cpu.write_reg(3, 9).unwrap();
        });
        assert_eq!(bus.read32(0x200), 7);
        assert_eq!(bus.read32(0x204), 0x208, "base second in list stores the updated base");
        assert_eq!(cpu.read_reg(1).unwrap(), 0x208);
        assert_eq!(bus.read32(0x300), 0x300, "base first in list stores the original base");
        assert_eq!(bus.read32(0x304), 9);
        assert_eq!(cpu.read_reg(2).unwrap(), 0x308);
    }

    #[test]
    fn ldm_pc_with_s_bit_restores_cpsr() {
        // LDMIA r0, {r1, pc}^ from IRQ mode, saved state is User + Thumb
        let (cpu, _) = run(&[0xE8D0_8002], 1, |cpu, bus| {
            cpu.cpsr_mut().set_mode(CpuMode::Irq);
            cpu.write_reg(0, 0x200).unwrap();
            bus.write32(0x200, 9);
            bus.write32(0x204, 0x101);
            let mut saved = Psr::default();
            saved.set_mode(CpuMode::User);
            saved.set_state(CpuState::Thumb);
            cpu.regs_mut().set_spsr_for(CpuMode::Irq, saved);
        });
        assert_eq!(cpu.mode(), CpuMode::User);
        assert_eq!(cpu.state(), CpuState::Thumb);
        assert_eq!(cpu.read_reg(1).unwrap(), 9);
        assert_eq!(cpu.executing_address(), 0x100);
        assert_eq!(cpu.pc(), 0x104);
    }

    #[test]
    fn msr_from_user_mode_leaves_control_bits() {
        // MSR cpsr_fc, r0
        let (cpu, _) = run(&[0xE129_F000], 1, |cpu, _| {
            cpu.cpsr_mut().set_mode(CpuMode::User);
            cpu.write_reg(0, 0xF000_0000 | CpuMode::Supervisor.bits()).unwrap();
        });
        let cpsr = cpu.cpsr();
        assert_eq!(cpu.mode(), CpuMode::User);
        assert!(cpsr.i() && cpsr.f());
        assert!(cpsr.n() && cpsr.z() && cpsr.c() && cpsr.v());
    }

    #[test]
    fn halfword_loads_at_odd_address() {
        // LDRH r1, [r0, #1] ; LDRSH r2, [r0, #1]
        let base = (0xE << 28) | (1 << 24) | (1 << 23) | (1 << 22) | (1 << 20) | (0x9 << 4) | 1;
        let ldrh = base | (0x1 << 5) | (1 << 12);
        let ldrsh = base | (0x3 << 5) | (2 << 12);
        let (cpu, _) = run(&[ldrh, ldrsh], 2, |cpu, bus| {
            cpu.write_reg(0, 0x200).unwrap();
            bus.write16(0x200, 0x8012);
        });
        assert_eq!(cpu.read_reg(1).unwrap(), 0x1200_0080);
        assert_eq!(cpu.read_reg(2).unwrap(), 0xFFFF_FF80);
    }

    #[test]
    fn misaligned_word_swap_rotates() {
        // SWP r2, r1, [r0] running from IWRAM on the real bus
        let mut bus = Bus::new();
        bus.write32(0x0300_0000, 0xE100_2091);
        for i in 1..4 {
            bus.write32(0x0300_0000 + i * 4, NOP);
        }
        bus.write32(0x0200_0000, 0xAABB_CCDD);

        let mut cpu = Cpu::new();
        cpu.cpsr_mut().set_mode(CpuMode::System);
        cpu.set_pc(0x0300_0000);
        cpu.initialize(&mut bus);
        cpu.write_reg(0, 0x0200_0001).unwrap();
        cpu.write_reg(1, 0x1122_3344).unwrap();
        cpu.step(&mut bus).unwrap();

        assert_eq!(cpu.read_reg(2).unwrap(), 0xDDAA_BBCC);
        assert_eq!(bus.read32(0x0200_0000), 0x2233_4411);
    }
}
