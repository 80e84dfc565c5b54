// This module contains the Epiphany instruction metadata the selector and frame
// lowering consume: the opcode set, per-opcode addressing constraints for the
// immediate-offset load/store family, the LoadStoreMethod table that unifies
// callee-save spilling and restoring by naming the paired and single opcode for
// each register class, instruction sizes, and the register/stack-pointer update
// emitters that split or materialize adjustments too wide for one add-immediate.
// In the full toolchain most of this is generated from the architecture
// description; here it is the hand-maintained equivalent with the same interface.

//! Epiphany instruction descriptors and encoding limits.

use log::debug;

use crate::core::error::{CodegenError, CodegenResult};
use crate::core::mir::{MachineBasicBlock, MachineFunction, MachineInst, MachineOperand, MiFlag};
use crate::epiphany::regs::{Reg, RegClass};

/// Offsets of the load/store immediate family, in scaled units. The encoding
/// has 11 immediate bits; the accepted magnitude is `(2 << 10) - 1 = 2047`,
/// applied symmetrically, so the range is `[-2047, 2047]` rather than the
/// natural signed `[-2048, 2047]`. Kept exactly as the architecture code has
/// always had it; see DESIGN.md.
pub const LDST_IMM_BOUND: i64 = (2 << 10) - 1;

/// Signed 11-bit add-immediate range used by stack adjustments.
pub const ADD_IMM_MAX: i64 = (1 << 10) - 1;
pub const ADD_IMM_MIN: i64 = -(1 << 10);

/// Epiphany machine opcodes used by this backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Load low 16 bits of an immediate, zero-extended.
    MovRi,
    /// Merge the high 16 bits of an immediate into a previous MovRi result.
    MovtRi,
    /// Float variants of the pair above, operating on raw single bits.
    MovRiF,
    MovtRiF,
    MovRr,

    AddRi,
    AddRr,
    SubRi,
    SubRr,
    ImulRr,
    AndRr,
    OrrRr,
    EorRr,
    LslRr,
    LsrRr,
    AsrRr,

    FAddRr,
    FSubRr,
    FMulRr,

    Ldr8,
    Ldr16,
    Ldr32,
    /// Doubleword load, restoring a register pair from adjacent slots.
    LdrD,
    Str8,
    Str16,
    Str32,
    /// Doubleword store, saving a register pair to adjacent slots.
    StrD,

    B,
    Ret,

    /// Call-frame pseudos, eliminated before emission.
    AdjCallStackDown,
    AdjCallStackUp,
}

impl Opcode {
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::MovRi => "MovRi",
            Opcode::MovtRi => "MovtRi",
            Opcode::MovRiF => "MovRiF",
            Opcode::MovtRiF => "MovtRiF",
            Opcode::MovRr => "MovRr",
            Opcode::AddRi => "AddRi",
            Opcode::AddRr => "AddRr",
            Opcode::SubRi => "SubRi",
            Opcode::SubRr => "SubRr",
            Opcode::ImulRr => "ImulRr",
            Opcode::AndRr => "AndRr",
            Opcode::OrrRr => "OrrRr",
            Opcode::EorRr => "EorRr",
            Opcode::LslRr => "LslRr",
            Opcode::LsrRr => "LsrRr",
            Opcode::AsrRr => "AsrRr",
            Opcode::FAddRr => "FAddRr",
            Opcode::FSubRr => "FSubRr",
            Opcode::FMulRr => "FMulRr",
            Opcode::Ldr8 => "Ldr8",
            Opcode::Ldr16 => "Ldr16",
            Opcode::Ldr32 => "Ldr32",
            Opcode::LdrD => "LdrD",
            Opcode::Str8 => "Str8",
            Opcode::Str16 => "Str16",
            Opcode::Str32 => "Str32",
            Opcode::StrD => "StrD",
            Opcode::B => "B",
            Opcode::Ret => "Ret",
            Opcode::AdjCallStackDown => "AdjCallStackDown",
            Opcode::AdjCallStackUp => "AdjCallStackUp",
        }
    }

    pub fn is_load(&self) -> bool {
        matches!(self, Opcode::Ldr8 | Opcode::Ldr16 | Opcode::Ldr32 | Opcode::LdrD)
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Opcode::Str8 | Opcode::Str16 | Opcode::Str32 | Opcode::StrD)
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(self, Opcode::AdjCallStackDown | Opcode::AdjCallStackUp)
    }
}

/// Constraint on the immediate offset of one load/store form.
///
/// A candidate byte offset `imm` is legal iff `imm % access_scale == 0` and
/// `min_offset <= imm / access_scale <= max_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressingConstraint {
    pub access_scale: i64,
    pub min_offset: i64,
    pub max_offset: i64,
}

impl AddressingConstraint {
    pub fn accepts(&self, imm: i64) -> bool {
        imm % self.access_scale == 0
            && imm / self.access_scale >= self.min_offset
            && imm / self.access_scale <= self.max_offset
    }
}

/// Which instructions to use for callee-save memory operations on one register
/// class. An array of these drives `emit_frame_mem_ops` so that spilling and
/// restoring share a single implementation.
#[derive(Debug, Clone, Copy)]
pub struct LoadStoreMethod {
    pub reg_class: RegClass,
    /// The preferred instruction, covering two registers at once.
    pub pair_opcode: Opcode,
    /// Sometimes only a single register can be handled.
    pub single_opcode: Opcode,
}

/// Store methods per register class. The floating-point view shares the
/// general-purpose memory instructions; Epiphany has a unified register file.
pub const STORE_METHODS: &[LoadStoreMethod] = &[
    LoadStoreMethod {
        reg_class: RegClass::Gpr32,
        pair_opcode: Opcode::StrD,
        single_opcode: Opcode::Str32,
    },
    LoadStoreMethod {
        reg_class: RegClass::Fpr32,
        pair_opcode: Opcode::StrD,
        single_opcode: Opcode::Str32,
    },
];

pub const LOAD_METHODS: &[LoadStoreMethod] = &[
    LoadStoreMethod {
        reg_class: RegClass::Gpr32,
        pair_opcode: Opcode::LdrD,
        single_opcode: Opcode::Ldr32,
    },
    LoadStoreMethod {
        reg_class: RegClass::Fpr32,
        pair_opcode: Opcode::LdrD,
        single_opcode: Opcode::Ldr32,
    },
];

/// Look up the load/store method for a class.
pub fn load_store_method(class: RegClass, is_store: bool) -> LoadStoreMethod {
    let table = if is_store { STORE_METHODS } else { LOAD_METHODS };
    table
        .iter()
        .copied()
        .find(|m| m.reg_class == class)
        .unwrap_or(table[0])
}

/// Epiphany implementation of the target instruction information hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct EpiphanyInstrInfo;

impl EpiphanyInstrInfo {
    pub fn new() -> Self {
        EpiphanyInstrInfo
    }

    /// For loads and stores taking an immediate offset, the constraints the
    /// immediate must satisfy. Pure; `None` for non-memory opcodes.
    pub fn address_constraints(&self, opcode: Opcode) -> Option<AddressingConstraint> {
        let access_scale = match opcode {
            Opcode::Ldr8 | Opcode::Str8 => 1,
            Opcode::Ldr16 | Opcode::Str16 => 2,
            Opcode::Ldr32 | Opcode::Str32 => 4,
            Opcode::LdrD | Opcode::StrD => 8,
            _ => return None,
        };
        Some(AddressingConstraint {
            access_scale,
            min_offset: -LDST_IMM_BOUND,
            max_offset: LDST_IMM_BOUND,
        })
    }

    /// Size of one instruction in bytes. Pseudos occupy no space.
    pub fn inst_size_in_bytes(&self, inst: &MachineInst) -> u32 {
        if inst.opcode.is_pseudo() {
            0
        } else {
            4
        }
    }

    /// Largest frame still addressable from SP by every memory instruction the
    /// function actually uses, without a scavenged base register.
    pub fn estimate_rs_stack_limit(&self, mf: &MachineFunction) -> u64 {
        let mut limit = (LDST_IMM_BOUND * 8) as u64;
        for block in &mf.blocks {
            for inst in &block.insts {
                if let Some(c) = self.address_constraints(inst.opcode) {
                    limit = limit.min((c.max_offset * c.access_scale) as u64);
                }
            }
        }
        limit
    }

    /// Emit a plain register-to-register copy.
    pub fn copy_phys_reg(
        &self,
        bb: &mut MachineBasicBlock,
        idx: usize,
        dst: Reg,
        src: Reg,
        kill_src: bool,
    ) {
        bb.insert(
            idx,
            MachineInst::new(
                Opcode::MovRr,
                vec![
                    MachineOperand::reg_def(dst),
                    MachineOperand::reg_use_kill(src, kill_src),
                ],
            ),
        );
    }

    /// Spill one register to an abstract stack slot.
    pub fn store_reg_to_stack_slot(
        &self,
        bb: &mut MachineBasicBlock,
        idx: usize,
        reg: Reg,
        is_kill: bool,
        frame_idx: i32,
        class: RegClass,
    ) {
        let m = load_store_method(class, true);
        bb.insert(
            idx,
            MachineInst::new(
                m.single_opcode,
                vec![
                    MachineOperand::reg_use_kill(reg, is_kill),
                    MachineOperand::FrameIndex(frame_idx),
                ],
            ),
        );
    }

    /// Reload one register from an abstract stack slot.
    pub fn load_reg_from_stack_slot(
        &self,
        bb: &mut MachineBasicBlock,
        idx: usize,
        reg: Reg,
        frame_idx: i32,
        class: RegClass,
    ) {
        let m = load_store_method(class, false);
        bb.insert(
            idx,
            MachineInst::new(
                m.single_opcode,
                vec![
                    MachineOperand::reg_def(reg),
                    MachineOperand::FrameIndex(frame_idx),
                ],
            ),
        );
    }
}

/// Append `dst = src + num_bytes` to `seq`.
///
/// Fits the adjustment into one add-immediate when the 11-bit range allows;
/// otherwise materializes the displacement into `scratch` with a MovRi/MovtRi
/// pair and adds the registers. The scratch register must not alias `src`.
pub fn emit_reg_update(
    seq: &mut Vec<MachineInst>,
    dst: Reg,
    src: Reg,
    scratch: Reg,
    num_bytes: i64,
    flag: MiFlag,
) -> CodegenResult<()> {
    if num_bytes == 0 && dst == src {
        return Ok(());
    }

    if (ADD_IMM_MIN..=ADD_IMM_MAX).contains(&num_bytes) {
        seq.push(MachineInst::with_flag(
            Opcode::AddRi,
            vec![
                MachineOperand::reg_def(dst),
                MachineOperand::reg_use(src),
                MachineOperand::Imm(num_bytes),
            ],
            flag,
        ));
        return Ok(());
    }

    if scratch == src {
        return Err(CodegenError::FrameLowering {
            reason: format!("scratch register {} aliases update source", scratch),
        });
    }

    debug!(
        "reg update of {} bytes exceeds add-immediate range, via scratch {}",
        num_bytes, scratch
    );

    // Two's-complement pattern of the displacement; both halves carry the full
    // value, the encoder extracts its 16 bits.
    let bits = num_bytes as i32 as u32;
    seq.push(MachineInst::with_flag(
        Opcode::MovRi,
        vec![
            MachineOperand::reg_def(scratch),
            MachineOperand::Imm(bits as i64),
        ],
        flag,
    ));
    if bits & 0xFFFF_0000 != 0 {
        seq.push(MachineInst::with_flag(
            Opcode::MovtRi,
            vec![
                MachineOperand::reg_def(scratch),
                MachineOperand::reg_use(scratch),
                MachineOperand::Imm(bits as i64),
            ],
            flag,
        ));
    }
    seq.push(MachineInst::with_flag(
        Opcode::AddRr,
        vec![
            MachineOperand::reg_def(dst),
            MachineOperand::reg_use(src),
            MachineOperand::reg_use_kill(scratch, true),
        ],
        flag,
    ));
    Ok(())
}

/// Append an in-place stack-pointer adjustment to `seq`.
pub fn emit_sp_update(
    seq: &mut Vec<MachineInst>,
    scratch: Reg,
    num_bytes: i64,
    flag: MiFlag,
) -> CodegenResult<()> {
    emit_reg_update(seq, crate::epiphany::regs::SP, crate::epiphany::regs::SP, scratch, num_bytes, flag)
}
