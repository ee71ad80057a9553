//! Dispatch tables for both encodings.
//!
//! ARM: 12-bit index from bits 27..20 and 7..4 (4096 entries).
//! Thumb: 10-bit index from bits 15..6 (1024 entries).
//! Every slot starts out as `Undefined`, then is classified in order of
//! specificity.

pub const ARM_TABLE_SIZE: usize = 4096;
pub const THUMB_TABLE_SIZE: usize = 1024;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ArmOp {
    DataProcessing,
    Multiply,
    MultiplyLong,
    SingleDataSwap,
    BranchExchange,
    HalfwordDataTransfer,
    PsrTransfer,
    SingleDataTransfer,
    BlockDataTransfer,
    Branch,
    CoprocessorDataTransfer,
    CoprocessorDataOperation,
    CoprocessorRegisterTransfer,
    SoftwareInterrupt,
    Undefined,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ThumbOp {
    MoveShiftedRegister,
    AddSubtract,
    MoveCompareAddSubtractImmediate,
    AluOperations,
    HiRegisterOperations,
    PcRelativeLoad,
    LoadStoreRegisterOffset,
    LoadStoreSignExtended,
    LoadStoreImmediateOffset,
    LoadStoreHalfword,
    SpRelativeLoadStore,
    LoadAddress,
    AddOffsetToSp,
    PushPopRegisters,
    MultipleLoadStore,
    ConditionalBranch,
    SoftwareInterrupt,
    UnconditionalBranch,
    LongBranchWithLink,
    Undefined,
}

pub fn arm_index(instr: u32) -> usize {
    ((((instr >> 20) & 0xFF) << 4) | ((instr >> 4) & 0xF)) as usize
}

pub fn thumb_index(instr: u16) -> usize {
    (instr >> 6) as usize
}

pub fn classify_arm(index: usize) -> ArmOp {
    let hi = (index >> 4) & 0xFF; // bits 27..20
    let lo = index & 0xF; // bits 7..4

    match hi >> 6 {
        0b00 => {
            if hi & 0xFC == 0x00 && lo == 0x9 {
                ArmOp::Multiply
            } else if hi & 0xF8 == 0x08 && lo == 0x9 {
                ArmOp::MultiplyLong
            } else if hi & 0xFB == 0x10 && lo == 0x9 {
                ArmOp::SingleDataSwap
            } else if hi == 0x12 && lo == 0x1 {
                ArmOp::BranchExchange
            } else if hi & 0xE0 == 0x00 && lo & 0x9 == 0x9 {
                // SH = 00 with bit 7 and 4 set is only ever MUL/SWP
                if lo == 0x9 { ArmOp::Undefined } else { ArmOp::HalfwordDataTransfer }
            } else if hi & 0xFB == 0x10 && lo == 0x0 {
                // MRS
                ArmOp::PsrTransfer
            } else if hi & 0xFB == 0x12 && lo == 0x0 {
                // MSR, register operand
                ArmOp::PsrTransfer
            } else if hi & 0xFB == 0x32 {
                // MSR, immediate operand
                ArmOp::PsrTransfer
            } else {
                ArmOp::DataProcessing
            }
        }
        0b01 => {
            if hi & 0xE0 == 0x60 && lo & 0x1 == 0x1 {
                ArmOp::Undefined
            } else {
                ArmOp::SingleDataTransfer
            }
        }
        _ => match hi >> 5 {
            0b100 => ArmOp::BlockDataTransfer,
            0b101 => ArmOp::Branch,
            0b110 => ArmOp::CoprocessorDataTransfer,
            _ if hi >> 4 == 0xF => ArmOp::SoftwareInterrupt,
            _ if lo & 0x1 == 0 => ArmOp::CoprocessorDataOperation,
            _ => ArmOp::CoprocessorRegisterTransfer,
        },
    }
}

pub fn classify_thumb(index: usize) -> ThumbOp {
    let instr = (index as u32) << 6;
    let top = |bits: u32| instr >> (16 - bits);

    if top(5) == 0b00011 {
        ThumbOp::AddSubtract
    } else if top(3) == 0b000 {
        ThumbOp::MoveShiftedRegister
    } else if top(3) == 0b001 {
        ThumbOp::MoveCompareAddSubtractImmediate
    } else if top(6) == 0b010000 {
        ThumbOp::AluOperations
    } else if top(6) == 0b010001 {
        ThumbOp::HiRegisterOperations
    } else if top(5) == 0b01001 {
        ThumbOp::PcRelativeLoad
    } else if top(4) == 0b0101 {
        if instr & (1 << 9) == 0 {
            ThumbOp::LoadStoreRegisterOffset
        } else {
            ThumbOp::LoadStoreSignExtended
        }
    } else if top(3) == 0b011 {
        ThumbOp::LoadStoreImmediateOffset
    } else if top(4) == 0b1000 {
        ThumbOp::LoadStoreHalfword
    } else if top(4) == 0b1001 {
        ThumbOp::SpRelativeLoadStore
    } else if top(4) == 0b1010 {
        ThumbOp::LoadAddress
    } else if top(8) == 0b1011_0000 {
        ThumbOp::AddOffsetToSp
    } else if top(4) == 0b1011 && (instr >> 9) & 0x3 == 0b10 {
        ThumbOp::PushPopRegisters
    } else if top(4) == 0b1100 {
        ThumbOp::MultipleLoadStore
    } else if top(8) == 0b1101_1111 {
        ThumbOp::SoftwareInterrupt
    } else if top(8) == 0b1101_1110 {
        ThumbOp::Undefined
    } else if top(4) == 0b1101 {
        ThumbOp::ConditionalBranch
    } else if top(5) == 0b11100 {
        ThumbOp::UnconditionalBranch
    } else if top(4) == 0b1111 {
        ThumbOp::LongBranchWithLink
    } else {
        ThumbOp::Undefined
    }
}

/// Both dispatch tables, fully populated on construction.
#[derive(Clone)]
pub struct DecodeTables {
    arm: [ArmOp; ARM_TABLE_SIZE],
    thumb: [ThumbOp; THUMB_TABLE_SIZE],
}

impl Default for DecodeTables {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeTables {
    pub fn new() -> Self {
        let mut tables = Self {
            arm: [ArmOp::Undefined; ARM_TABLE_SIZE],
            thumb: [ThumbOp::Undefined; THUMB_TABLE_SIZE],
        };
        for (i, slot) in tables.arm.iter_mut().enumerate() {
            *slot = classify_arm(i);
        }
        for (i, slot) in tables.thumb.iter_mut().enumerate() {
            *slot = classify_thumb(i);
        }
        tables
    }

    pub fn arm(&self, instr: u32) -> ArmOp {
        self.arm[arm_index(instr)]
    }

    pub fn thumb(&self, instr: u16) -> ThumbOp {
        self.thumb[thumb_index(instr)]
    }

    pub fn arm_entries(&self) -> &[ArmOp] { &self.arm }
    pub fn thumb_entries(&self) -> &[ThumbOp] { &self.thumb }
}
