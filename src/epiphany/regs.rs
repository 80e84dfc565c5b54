// This module defines the Epiphany register file as the backend sees it: sixty-four
// 32-bit general registers with the ABI roles fixed by the Epiphany SDK (r11 frame
// pointer, r12 intra-procedure scratch, r13 stack pointer, r14 link register), the
// register classes used to pick load/store opcodes, and the architecture-defined
// callee-saved order. The callee-saved order matters: the callee-save emitter pairs
// neighbouring entries, so the list ascends through r4..r11 and ends with the link
// register, giving contiguous slots to the registers most likely to pair.

//! Epiphany registers and register classes.

use std::fmt;

/// One Epiphany register, identified by its architectural number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub u8);

impl Reg {
    pub fn num(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FP => write!(f, "fp"),
            SP => write!(f, "sp"),
            LR => write!(f, "lr"),
            Reg(n) => write!(f, "r{}", n),
        }
    }
}

pub const R0: Reg = Reg(0);
pub const R1: Reg = Reg(1);
pub const R2: Reg = Reg(2);
pub const R3: Reg = Reg(3);
pub const R4: Reg = Reg(4);
pub const R5: Reg = Reg(5);
pub const R6: Reg = Reg(6);
pub const R7: Reg = Reg(7);
pub const R8: Reg = Reg(8);
pub const R9: Reg = Reg(9);
pub const R10: Reg = Reg(10);

/// Frame pointer (r11 in the Epiphany ABI).
pub const FP: Reg = Reg(11);
/// Intra-procedure scratch register, free for prologue/epilogue use.
pub const IP: Reg = Reg(12);
/// Stack pointer.
pub const SP: Reg = Reg(13);
/// Link register holding the return address.
pub const LR: Reg = Reg(14);

/// Register classes. Epiphany's floating-point unit operates on the general
/// register file, so `Fpr32` is a view used for operand legality, not a
/// separate bank; both classes spill 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    Gpr32,
    Fpr32,
}

impl RegClass {
    /// Spill slot size in bytes for one register of this class.
    pub fn spill_size(&self) -> u64 {
        4
    }

    pub fn name(&self) -> &'static str {
        match self {
            RegClass::Gpr32 => "GPR32",
            RegClass::Fpr32 => "FPR32",
        }
    }

    /// Primary class of a physical register, used for callee-save bookkeeping.
    pub fn of(_reg: Reg) -> RegClass {
        RegClass::Gpr32
    }
}

/// Callee-saved registers in the architecture-defined save order.
///
/// The emitter never reorders this list, only decides pairing boundaries.
pub const CALLEE_SAVED: &[Reg] = &[R4, R5, R6, R7, R8, R9, R10, FP, LR];
