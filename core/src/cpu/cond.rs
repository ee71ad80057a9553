use super::psr::Psr;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Condition {
    Eq, // Z
    Ne, // !Z
    Cs, // C
    Cc, // !C
    Mi, // N
    Pl, // !N
    Vs, // V
    Vc, // !V
    Hi, // C && !Z
    Ls, // !C || Z
    Ge, // N == V
    Lt, // N != V
    Gt, // !Z && N == V
    Le, // Z || N != V
    Al,
    Nv,
}

impl Condition {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0xF {
            0x0 => Condition::Eq,
            0x1 => Condition::Ne,
            0x2 => Condition::Cs,
            0x3 => Condition::Cc,
            0x4 => Condition::Mi,
            0x5 => Condition::Pl,
            0x6 => Condition::Vs,
            0x7 => Condition::Vc,
            0x8 => Condition::Hi,
            0x9 => Condition::Ls,
            0xA => Condition::Ge,
            0xB => Condition::Lt,
            0xC => Condition::Gt,
            0xD => Condition::Le,
            0xE => Condition::Al,
            _ => Condition::Nv,
        }
    }

    pub fn passed(self, psr: Psr) -> bool {
        let (n, z, c, v) = (psr.n(), psr.z(), psr.c(), psr.v());
        match self {
            Condition::Eq => z,
            Condition::Ne => !z,
            Condition::Cs => c,
            Condition::Cc => !c,
            Condition::Mi => n,
            Condition::Pl => !n,
            Condition::Vs => v,
            Condition::Vc => !v,
            Condition::Hi => c && !z,
            Condition::Ls => !c || z,
            Condition::Ge => n == v,
            Condition::Lt => n != v,
            Condition::Gt => !z && n == v,
            Condition::Le => z || n != v,
            Condition::Al => true,
            Condition::Nv => false,
        }
    }
}
