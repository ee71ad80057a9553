use super::alu::{self, ShiftType};
use super::{Condition, Cpu, CpuError, CpuMode, CpuState, ThumbOp, LR, PC, SP};
use crate::bus::BusAccess;

#[inline]
fn bit(instr: u32, n: u32) -> bool {
    instr & (1 << n) != 0
}

#[inline]
fn low_reg(instr: u32, shift: u32) -> usize {
    ((instr >> shift) & 0x7) as usize
}

impl Cpu {
    pub(super) fn execute_thumb<B: BusAccess>(&mut self, bus: &mut B, op: ThumbOp, instr: u16) -> Result<(), CpuError> {
        let instr = instr as u32;
        match op {
            ThumbOp::MoveShiftedRegister => self.thumb_move_shifted(instr),
            ThumbOp::AddSubtract => self.thumb_add_subtract(instr),
            ThumbOp::MoveCompareAddSubtractImmediate => self.thumb_immediate(instr),
            ThumbOp::AluOperations => self.thumb_alu(instr),
            ThumbOp::HiRegisterOperations => self.thumb_hi_register(bus, instr),
            ThumbOp::PcRelativeLoad => {
                let addr = (self.regs.pc() & !3).wrapping_add((instr & 0xFF) << 2);
                let value = bus.read32(addr);
                self.regs.write(low_reg(instr, 8), value)
            }
            ThumbOp::LoadStoreRegisterOffset => self.thumb_load_store_register(bus, instr),
            ThumbOp::LoadStoreSignExtended => self.thumb_load_store_signed(bus, instr),
            ThumbOp::LoadStoreImmediateOffset => self.thumb_load_store_immediate(bus, instr),
            ThumbOp::LoadStoreHalfword => {
                let rd = low_reg(instr, 0);
                let addr = self.regs.read(low_reg(instr, 3))?.wrapping_add(((instr >> 6) & 0x1F) << 1);
                if bit(instr, 11) {
                    let value = (bus.read16(addr & !1) as u32).rotate_right((addr & 1) * 8);
                    self.regs.write(rd, value)
                } else {
                    bus.write16(addr, self.regs.read(rd)? as u16);
                    Ok(())
                }
            }
            ThumbOp::SpRelativeLoadStore => {
                let rd = low_reg(instr, 8);
                let addr = self.regs.read(SP)?.wrapping_add((instr & 0xFF) << 2);
                if bit(instr, 11) {
                    let value = bus.read32(addr);
                    self.regs.write(rd, value)
                } else {
                    bus.write32(addr, self.regs.read(rd)?);
                    Ok(())
                }
            }
            ThumbOp::LoadAddress => {
                let offset = (instr & 0xFF) << 2;
                let base = if bit(instr, 11) { self.regs.read(SP)? } else { self.regs.pc() & !3 };
                self.regs.write(low_reg(instr, 8), base.wrapping_add(offset))
            }
            ThumbOp::AddOffsetToSp => {
                let offset = (instr & 0x7F) << 2;
                let sp = self.regs.read(SP)?;
                let sp = if bit(instr, 7) { sp.wrapping_sub(offset) } else { sp.wrapping_add(offset) };
                self.regs.write(SP, sp)
            }
            ThumbOp::PushPopRegisters => self.thumb_push_pop(bus, instr),
            ThumbOp::MultipleLoadStore => self.thumb_multiple(bus, instr),
            ThumbOp::ConditionalBranch => {
                if Condition::from_bits(instr >> 8).passed(self.regs.cpsr()) {
                    let offset = ((instr as u8 as i8 as i32) << 1) as u32;
                    let target = self.regs.pc().wrapping_add(offset);
                    self.branch_to(bus, target);
                }
                Ok(())
            }
            ThumbOp::SoftwareInterrupt => {
                let ret = self.regs.pc().wrapping_sub(2);
                self.enter_exception(bus, CpuMode::Supervisor, 0x08, ret)
            }
            ThumbOp::UnconditionalBranch => {
                let offset = (((instr & 0x7FF) << 21) as i32 >> 20) as u32;
                let target = self.regs.pc().wrapping_add(offset);
                self.branch_to(bus, target);
                Ok(())
            }
            ThumbOp::LongBranchWithLink => self.thumb_long_branch(bus, instr),
            ThumbOp::Undefined => {
                log::warn!("undefined Thumb instruction {:04x} at {:#010x}", instr, self.executing_address());
                Ok(())
            }
        }
    }

    fn thumb_move_shifted(&mut self, instr: u32) -> Result<(), CpuError> {
        let kind = ShiftType::from_bits(instr >> 11);
        let amount = (instr >> 6) & 0x1F;
        let value = self.regs.read(low_reg(instr, 3))?;
        let (result, carry) = alu::barrel_shift(kind, value, amount, self.regs.cpsr().c(), true);
        self.regs.write(low_reg(instr, 0), result)?;
        let cpsr = self.regs.cpsr_mut();
        cpsr.set_nz(result);
        cpsr.set_c(carry);
        Ok(())
    }

    fn set_arith_flags(&mut self, result: u32, carry: bool, overflow: bool) {
        let cpsr = self.regs.cpsr_mut();
        cpsr.set_nz(result);
        cpsr.set_c(carry);
        cpsr.set_v(overflow);
    }

    fn thumb_add_subtract(&mut self, instr: u32) -> Result<(), CpuError> {
        let field = (instr >> 6) & 0x7;
        let operand = if bit(instr, 10) { field } else { self.regs.read(field as usize)? };
        let a = self.regs.read(low_reg(instr, 3))?;
        let (result, c, v) = if bit(instr, 9) {
            alu::sub_with_carry(a, operand, true)
        } else {
            alu::add_with_carry(a, operand, false)
        };
        self.regs.write(low_reg(instr, 0), result)?;
        self.set_arith_flags(result, c, v);
        Ok(())
    }

    fn thumb_immediate(&mut self, instr: u32) -> Result<(), CpuError> {
        let rd = low_reg(instr, 8);
        let imm = instr & 0xFF;
        let a = self.regs.read(rd)?;
        match (instr >> 11) & 0x3 {
            0 => {
                self.regs.write(rd, imm)?;
                self.regs.cpsr_mut().set_nz(imm);
            }
            1 => {
                let (r, c, v) = alu::sub_with_carry(a, imm, true);
                self.set_arith_flags(r, c, v);
            }
            2 => {
                let (r, c, v) = alu::add_with_carry(a, imm, false);
                self.regs.write(rd, r)?;
                self.set_arith_flags(r, c, v);
            }
            _ => {
                let (r, c, v) = alu::sub_with_carry(a, imm, true);
                self.regs.write(rd, r)?;
                self.set_arith_flags(r, c, v);
            }
        }
        Ok(())
    }

    fn thumb_alu(&mut self, instr: u32) -> Result<(), CpuError> {
        let rd = low_reg(instr, 0);
        let a = self.regs.read(rd)?;
        let b = self.regs.read(low_reg(instr, 3))?;
        let carry = self.regs.cpsr().c();

        let shift = |kind| alu::barrel_shift(kind, a, b & 0xFF, carry, false);
        // (result, write rd, carry, overflow); None keeps the flag
        let (result, writes, c, v) = match (instr >> 6) & 0xF {
            0x0 => (a & b, true, None, None),
            0x1 => (a ^ b, true, None, None),
            0x2 => {
                let (r, c) = shift(ShiftType::Lsl);
                (r, true, Some(c), None)
            }
            0x3 => {
                let (r, c) = shift(ShiftType::Lsr);
                (r, true, Some(c), None)
            }
            0x4 => {
                let (r, c) = shift(ShiftType::Asr);
                (r, true, Some(c), None)
            }
            0x5 => {
                let (r, c, v) = alu::add_with_carry(a, b, carry);
                (r, true, Some(c), Some(v))
            }
            0x6 => {
                let (r, c, v) = alu::sub_with_carry(a, b, carry);
                (r, true, Some(c), Some(v))
            }
            0x7 => {
                let (r, c) = shift(ShiftType::Ror);
                (r, true, Some(c), None)
            }
            0x8 => (a & b, false, None, None),
            0x9 => {
                let (r, c, v) = alu::sub_with_carry(0, b, true);
                (r, true, Some(c), Some(v))
            }
            0xA => {
                let (r, c, v) = alu::sub_with_carry(a, b, true);
                (r, false, Some(c), Some(v))
            }
            0xB => {
                let (r, c, v) = alu::add_with_carry(a, b, false);
                (r, false, Some(c), Some(v))
            }
            0xC => (a | b, true, None, None),
            0xD => (a.wrapping_mul(b), true, None, None),
            0xE => (a & !b, true, None, None),
            _ => (!b, true, None, None),
        };

        if writes {
            self.regs.write(rd, result)?;
        }
        let cpsr = self.regs.cpsr_mut();
        cpsr.set_nz(result);
        if let Some(c) = c {
            cpsr.set_c(c);
        }
        if let Some(v) = v {
            cpsr.set_v(v);
        }
        Ok(())
    }

    fn thumb_hi_register<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let rd = low_reg(instr, 0) | if bit(instr, 7) { 8 } else { 0 };
        let rs = low_reg(instr, 3) | if bit(instr, 6) { 8 } else { 0 };
        let value = self.regs.read(rs)?;

        match (instr >> 8) & 0x3 {
            0 => {
                let sum = self.regs.read(rd)?.wrapping_add(value);
                self.set_reg(bus, rd, sum)
            }
            1 => {
                let (r, c, v) = alu::sub_with_carry(self.regs.read(rd)?, value, true);
                self.set_arith_flags(r, c, v);
                Ok(())
            }
            2 => self.set_reg(bus, rd, value),
            _ => {
                let state = if value & 1 != 0 { CpuState::Thumb } else { CpuState::Arm };
                self.regs.cpsr_mut().set_state(state);
                self.branch_to(bus, value);
                Ok(())
            }
        }
    }

    fn thumb_load_store_register<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let rd = low_reg(instr, 0);
        let addr = self.regs.read(low_reg(instr, 3))?.wrapping_add(self.regs.read(low_reg(instr, 6))?);
        match (bit(instr, 11), bit(instr, 10)) {
            (false, false) => bus.write32(addr, self.regs.read(rd)?),
            (false, true) => bus.write8(addr, self.regs.read(rd)? as u8),
            (true, false) => {
                let value = bus.read32(addr);
                self.regs.write(rd, value)?;
            }
            (true, true) => {
                let value = bus.read8(addr) as u32;
                self.regs.write(rd, value)?;
            }
        }
        Ok(())
    }

    fn thumb_load_store_signed<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let rd = low_reg(instr, 0);
        let addr = self.regs.read(low_reg(instr, 3))?.wrapping_add(self.regs.read(low_reg(instr, 6))?);
        // (S, H)
        let value = match (bit(instr, 10), bit(instr, 11)) {
            (false, false) => {
                bus.write16(addr, self.regs.read(rd)? as u16);
                return Ok(());
            }
            (false, true) => (bus.read16(addr & !1) as u32).rotate_right((addr & 1) * 8),
            (true, false) => bus.read8(addr) as i8 as i32 as u32,
            (true, true) if addr & 1 != 0 => bus.read8(addr) as i8 as i32 as u32,
            (true, true) => bus.read16(addr) as i16 as i32 as u32,
        };
        self.regs.write(rd, value)
    }

    fn thumb_load_store_immediate<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let rd = low_reg(instr, 0);
        let byte = bit(instr, 12);
        let offset = (instr >> 6) & 0x1F;
        let base = self.regs.read(low_reg(instr, 3))?;
        let addr = base.wrapping_add(if byte { offset } else { offset << 2 });

        match (bit(instr, 11), byte) {
            (false, false) => bus.write32(addr, self.regs.read(rd)?),
            (false, true) => bus.write8(addr, self.regs.read(rd)? as u8),
            (true, false) => {
                let value = bus.read32(addr);
                self.regs.write(rd, value)?;
            }
            (true, true) => {
                let value = bus.read8(addr) as u32;
                self.regs.write(rd, value)?;
            }
        }
        Ok(())
    }

    fn thumb_push_pop<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let list = instr & 0xFF;
        let extra = bit(instr, 8);
        let count = list.count_ones() + extra as u32;
        let sp = self.regs.read(SP)?;

        if bit(instr, 11) {
            let mut addr = sp;
            for i in (0..8).filter(|i| list & (1 << i) != 0) {
                let value = bus.read32(addr & !3);
                self.regs.write(i, value)?;
                addr = addr.wrapping_add(4);
            }
            let pc = if extra {
                let value = bus.read32(addr & !3);
                addr = addr.wrapping_add(4);
                Some(value)
            } else {
                None
            };
            self.regs.write(SP, addr)?;
            if let Some(target) = pc {
                self.branch_to(bus, target);
            }
        } else {
            let start = sp.wrapping_sub(count * 4);
            let mut addr = start;
            for i in (0..8).filter(|i| list & (1 << i) != 0) {
                bus.write32(addr & !3, self.regs.read(i)?);
                addr = addr.wrapping_add(4);
            }
            if extra {
                bus.write32(addr & !3, self.regs.read(LR)?);
            }
            self.regs.write(SP, start)?;
        }
        Ok(())
    }

    fn thumb_multiple<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let rb = low_reg(instr, 8);
        let list = instr & 0xFF;
        let base = self.regs.read(rb)?;

        if list == 0 {
            // R15 alone, base steps by 16 words
            if bit(instr, 11) {
                let target = bus.read32(base & !3);
                self.regs.write(rb, base.wrapping_add(0x40))?;
                self.branch_to(bus, target);
            } else {
                bus.write32(base & !3, self.regs.pc().wrapping_add(2));
                self.regs.write(rb, base.wrapping_add(0x40))?;
            }
            return Ok(());
        }

        let new_base = base.wrapping_add(list.count_ones() * 4);
        let mut addr = base;
        if bit(instr, 11) {
            self.regs.write(rb, new_base)?;
            for i in (0..8).filter(|i| list & (1 << i) != 0) {
                let value = bus.read32(addr & !3);
                self.regs.write(i, value)?;
                addr = addr.wrapping_add(4);
            }
        } else {
            for (n, i) in (0..8).filter(|i| list & (1 << i) != 0).enumerate() {
                bus.write32(addr & !3, self.regs.read(i)?);
                addr = addr.wrapping_add(4);
                if n == 0 {
                    self.regs.write(rb, new_base)?;
                }
            }
        }
        Ok(())
    }

    fn thumb_long_branch<B: BusAccess>(&mut self, bus: &mut B, instr: u32) -> Result<(), CpuError> {
        let offset = instr & 0x7FF;
        if !bit(instr, 11) {
            let high = (((offset << 21) as i32) >> 9) as u32;
            self.regs.write(LR, self.regs.pc().wrapping_add(high))
        } else {
            let target = self.regs.read(LR)?.wrapping_add(offset << 1);
            let next = self.regs.pc().wrapping_sub(2);
            self.regs.write(LR, next | 1)?;
            self.set_reg(bus, PC, target)
        }
    }
}
