//! Barrel shifter and adder flag rules shared by both encodings.

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ShiftType { Lsl, Lsr, Asr, Ror }

impl ShiftType {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => ShiftType::Lsl,
            1 => ShiftType::Lsr,
            2 => ShiftType::Asr,
            _ => ShiftType::Ror,
        }
    }
}

/// Shift `value` and return `(result, carry_out)`.
///
/// `immediate` selects the 5-bit-immediate encoding, where an amount of 0
/// means LSR #32, ASR #32 or RRX for the right shifts. A register-specified
/// amount of 0 leaves both value and carry untouched.
pub fn barrel_shift(kind: ShiftType, value: u32, amount: u32, carry_in: bool, immediate: bool) -> (u32, bool) {
    match kind {
        ShiftType::Lsl => lsl_with_carry(value, amount, carry_in),
        ShiftType::Lsr => lsr_with_carry(value, amount, carry_in, immediate),
        ShiftType::Asr => asr_with_carry(value, amount, carry_in, immediate),
        ShiftType::Ror => ror_with_carry(value, amount, carry_in, immediate),
    }
}

pub fn lsl_with_carry(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry_in),
        1..=31 => (value << amount, (value >> (32 - amount)) & 1 != 0),
        32 => (0, value & 1 != 0),
        _ => (0, false),
    }
}

pub fn lsr_with_carry(value: u32, amount: u32, carry_in: bool, immediate: bool) -> (u32, bool) {
    match amount {
        0 if immediate => (0, value >> 31 != 0),
        0 => (value, carry_in),
        1..=31 => (value >> amount, (value >> (amount - 1)) & 1 != 0),
        32 => (0, value >> 31 != 0),
        _ => (0, false),
    }
}

pub fn asr_with_carry(value: u32, amount: u32, carry_in: bool, immediate: bool) -> (u32, bool) {
    let sign = value >> 31 != 0;
    let fill = if sign { u32::MAX } else { 0 };
    match amount {
        0 if immediate => (fill, sign),
        0 => (value, carry_in),
        1..=31 => (((value as i32) >> amount) as u32, (value >> (amount - 1)) & 1 != 0),
        _ => (fill, sign),
    }
}

pub fn ror_with_carry(value: u32, amount: u32, carry_in: bool, immediate: bool) -> (u32, bool) {
    if amount == 0 {
        if immediate {
            // RRX
            return (((carry_in as u32) << 31) | (value >> 1), value & 1 != 0);
        }
        return (value, carry_in);
    }
    let n = amount & 31;
    if n == 0 {
        (value, value >> 31 != 0)
    } else {
        let result = value.rotate_right(n);
        (result, result >> 31 != 0)
    }
}

/// 8-bit immediate rotated right by twice the 4-bit rotate field.
/// Carry-out is bit 31 of the result when the rotation is non-zero.
pub fn rotated_immediate(imm8: u32, rotate: u32, carry_in: bool) -> (u32, bool) {
    let rot = (rotate & 0xF) * 2;
    if rot == 0 {
        (imm8, carry_in)
    } else {
        let value = imm8.rotate_right(rot);
        (value, value >> 31 != 0)
    }
}

/// `a + b + carry_in` with `(result, carry, overflow)`.
pub fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let (partial, c1) = a.overflowing_add(b);
    let (result, c2) = partial.overflowing_add(carry_in as u32);
    // Overflow when both operands share a sign the result does not.
    let overflow = (!(a ^ b) & (a ^ result)) >> 31 != 0;
    (result, c1 || c2, overflow)
}

/// `a - b - !carry_in` with `(result, carry, overflow)`; carry is NOT borrow.
pub fn sub_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let (partial, b1) = a.overflowing_sub(b);
    let (result, b2) = partial.overflowing_sub((!carry_in) as u32);
    let overflow = ((a ^ b) & (a ^ result)) >> 31 != 0;
    (result, !(b1 || b2), overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsl_edges() {
        assert_eq!(lsl_with_carry(0x1234_5678, 0, true), (0x1234_5678, true));
        assert_eq!(lsl_with_carry(0x1234_5678, 0, false), (0x1234_5678, false));
        assert_eq!(lsl_with_carry(0x8000_0001, 1, false), (0x0000_0002, true));
        assert_eq!(lsl_with_carry(0x0000_0001, 32, false), (0, true));
        assert_eq!(lsl_with_carry(0x0000_0002, 32, true), (0, false));
        assert_eq!(lsl_with_carry(0xFFFF_FFFF, 33, true), (0, false));
    }

    #[test]
    fn lsr_edges() {
        // LSR #0 in the immediate form is LSR #32
        assert_eq!(lsr_with_carry(0x8000_0000, 0, false, true), (0, true));
        assert_eq!(lsr_with_carry(0x8000_0000, 0, false, false), (0x8000_0000, false));
        assert_eq!(lsr_with_carry(0x0000_0003, 1, false, true), (1, true));
        assert_eq!(lsr_with_carry(0x8000_0000, 32, false, false), (0, true));
        assert_eq!(lsr_with_carry(0x8000_0000, 40, true, false), (0, false));
    }

    #[test]
    fn asr_edges() {
        assert_eq!(asr_with_carry(0x8000_0000, 0, false, true), (0xFFFF_FFFF, true));
        assert_eq!(asr_with_carry(0x4000_0000, 0, true, true), (0, false));
        assert_eq!(asr_with_carry(0x8000_0004, 2, false, true), (0xE000_0001, false));
        assert_eq!(asr_with_carry(0x8000_0000, 200, false, false), (0xFFFF_FFFF, true));
        assert_eq!(asr_with_carry(0x1234, 0, true, false), (0x1234, true));
    }

    #[test]
    fn ror_and_rrx() {
        // ROR #0 immediate is RRX: carry enters bit 31, bit 0 leaves as carry
        assert_eq!(ror_with_carry(0x0000_0003, 0, true, true), (0x8000_0001, true));
        assert_eq!(ror_with_carry(0x0000_0002, 0, false, true), (0x0000_0001, false));
        assert_eq!(ror_with_carry(0x0000_0001, 1, false, true), (0x8000_0000, true));
        assert_eq!(ror_with_carry(0x8000_0001, 32, false, false), (0x8000_0001, true));
        assert_eq!(ror_with_carry(0x0000_0010, 36, false, false), (0x0000_0001, false));
        assert_eq!(ror_with_carry(0xABCD, 0, true, false), (0xABCD, true));
    }

    #[test]
    fn rotated_immediate_carry() {
        assert_eq!(rotated_immediate(0xFF, 0, true), (0xFF, true));
        assert_eq!(rotated_immediate(0xFF, 0, false), (0xFF, false));
        assert_eq!(rotated_immediate(0x02, 1, false), (0x8000_0000, true));
        assert_eq!(rotated_immediate(0x01, 4, true), (0x0100_0000, false));
    }

    #[test]
    fn add_flags() {
        assert_eq!(add_with_carry(1, 2, false), (3, false, false));
        assert_eq!(add_with_carry(0xFFFF_FFFF, 1, false), (0, true, false));
        assert_eq!(add_with_carry(0x7FFF_FFFF, 1, false), (0x8000_0000, false, true));
        assert_eq!(add_with_carry(0xFFFF_FFFF, 0, true), (0, true, false));
        assert_eq!(add_with_carry(0x8000_0000, 0x8000_0000, false), (0, true, true));
    }

    #[test]
    fn sub_flags() {
        assert_eq!(sub_with_carry(5, 5, true), (0, true, false));
        assert_eq!(sub_with_carry(3, 5, true), (0xFFFF_FFFE, false, false));
        assert_eq!(sub_with_carry(0x8000_0000, 1, true), (0x7FFF_FFFF, true, true));
        // SBC with carry clear subtracts one more
        assert_eq!(sub_with_carry(5, 5, false), (0xFFFF_FFFF, false, false));
        assert_eq!(sub_with_carry(0, 0, false), (0xFFFF_FFFF, false, false));
    }
}
