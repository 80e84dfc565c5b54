// This module defines the machine IR the backend emits into: target instructions
// with operand lists (registers carrying def/kill flags, immediates, frame indices
// and literal-pool references with relocation modifiers), basic blocks, and the
// per-function frame bookkeeping the frame lowering consumes (abstract frame
// objects, callee-saved info, stack size). The structures are deliberately thin;
// scheduling and register allocation are the hosting framework's business and only
// the flags and queries those stages need from this backend are modeled. Prologue
// code is prepended to the entry block and epilogue code inserted ahead of each
// return terminator.

//! Machine IR produced by selection and frame lowering.

use crate::epiphany::instr_info::Opcode;
use crate::epiphany::regs::{Reg, RegClass};

/// Relocation modifier on a symbol-like operand.
///
/// Epiphany addresses read-only pool entries through a high/low pair of 16-bit
/// relocations; encoding of the relocation itself is the MC layer's business,
/// this backend only tags operands with the required kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    None,
    Hi16,
    Lo16,
}

/// Flags distinguishing frame setup/teardown instructions from body code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiFlag {
    None,
    FrameSetup,
    FrameDestroy,
}

/// One operand of a machine instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineOperand {
    Reg { reg: Reg, is_def: bool, is_kill: bool },
    Imm(i64),
    /// Raw IEEE-754 single bits.
    FpImm(u32),
    /// Abstract stack slot, resolved late by the frame-index resolver.
    FrameIndex(i32),
    ConstantPool { entry: u32, ref_kind: RefKind },
}

impl MachineOperand {
    pub fn reg_def(reg: Reg) -> Self {
        MachineOperand::Reg {
            reg,
            is_def: true,
            is_kill: false,
        }
    }

    pub fn reg_use(reg: Reg) -> Self {
        MachineOperand::Reg {
            reg,
            is_def: false,
            is_kill: false,
        }
    }

    pub fn reg_use_kill(reg: Reg, is_kill: bool) -> Self {
        MachineOperand::Reg {
            reg,
            is_def: false,
            is_kill,
        }
    }
}

/// One target instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInst {
    pub opcode: Opcode,
    pub operands: Vec<MachineOperand>,
    pub flag: MiFlag,
}

impl MachineInst {
    pub fn new(opcode: Opcode, operands: Vec<MachineOperand>) -> Self {
        Self {
            opcode,
            operands,
            flag: MiFlag::None,
        }
    }

    pub fn with_flag(opcode: Opcode, operands: Vec<MachineOperand>, flag: MiFlag) -> Self {
        Self {
            opcode,
            operands,
            flag,
        }
    }

    /// Whether this instruction reads `reg` (a non-def register operand).
    pub fn reads_reg(&self, reg: Reg) -> bool {
        self.operands.iter().any(|op| {
            matches!(op, MachineOperand::Reg { reg: r, is_def: false, .. } if *r == reg)
        })
    }

    /// Whether this instruction defines `reg`.
    pub fn defs_reg(&self, reg: Reg) -> bool {
        self.operands.iter().any(|op| {
            matches!(op, MachineOperand::Reg { reg: r, is_def: true, .. } if *r == reg)
        })
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self.opcode, Opcode::Ret | Opcode::B)
    }
}

/// A straight-line run of machine instructions.
#[derive(Debug, Default, Clone)]
pub struct MachineBasicBlock {
    pub insts: Vec<MachineInst>,
}

impl MachineBasicBlock {
    pub fn new() -> Self {
        Self { insts: Vec::new() }
    }

    pub fn push(&mut self, inst: MachineInst) {
        self.insts.push(inst);
    }

    pub fn insert(&mut self, idx: usize, inst: MachineInst) {
        self.insts.insert(idx, inst);
    }

    /// Index of the first terminator, or the block length if there is none.
    pub fn first_terminator_idx(&self) -> usize {
        self.insts
            .iter()
            .position(|i| i.is_terminator())
            .unwrap_or(self.insts.len())
    }
}

/// An abstract stack slot before layout assigns it a concrete offset.
#[derive(Debug, Clone, Copy)]
pub struct FrameObject {
    pub size: u64,
    pub align: u64,
    /// Byte offset from the post-prologue stack pointer, once assigned.
    pub offset: Option<i64>,
}

/// One callee-saved register the function must preserve.
///
/// Order in [`FrameInfo::callee_saved`] is architecture-defined and must not be
/// changed by the emitter: paired stores rely on neighbouring entries having
/// adjacent slots.
#[derive(Debug, Clone, Copy)]
pub struct CalleeSavedInfo {
    pub reg: Reg,
    pub class: RegClass,
    pub frame_idx: i32,
    /// Byte offset of the assigned slot from the post-prologue stack pointer.
    pub offset: i64,
}

/// Per-function frame bookkeeping.
#[derive(Debug, Default, Clone)]
pub struct FrameInfo {
    objects: Vec<FrameObject>,
    /// Total static frame size in bytes, set by the frame layout planner.
    pub stack_size: u64,
    pub has_var_sized_objects: bool,
    pub callee_saved: Vec<CalleeSavedInfo>,
    /// Bytes occupied by the callee-save region at the bottom of the frame.
    pub callee_saved_region_size: u64,
}

impl FrameInfo {
    /// Create a new abstract stack slot and return its frame index.
    pub fn create_frame_object(&mut self, size: u64, align: u64) -> i32 {
        let idx = self.objects.len() as i32;
        self.objects.push(FrameObject {
            size,
            align,
            offset: None,
        });
        idx
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object(&self, frame_idx: i32) -> &FrameObject {
        &self.objects[frame_idx as usize]
    }

    pub fn set_object_offset(&mut self, frame_idx: i32, offset: i64) {
        self.objects[frame_idx as usize].offset = Some(offset);
    }

    pub fn objects(&self) -> impl Iterator<Item = (i32, &FrameObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, o)| (i as i32, o))
    }
}

/// One function being lowered.
#[derive(Debug, Clone)]
pub struct MachineFunction {
    pub name: String,
    pub blocks: Vec<MachineBasicBlock>,
    pub frame: FrameInfo,
    /// Set when the function takes the address of its own return (e.g. via a
    /// returnaddress intrinsic) even if no explicit LR read appears in the body.
    pub return_address_taken: bool,
    pub needs_realignment: bool,
    /// Register allocation reserved a frame pointer for this function.
    pub fp_reserved_by_ra: bool,
    /// Callee-saved registers the allocator actually used, unordered.
    pub used_callee_saved: Vec<Reg>,
}

impl MachineFunction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blocks: vec![MachineBasicBlock::new()],
            frame: FrameInfo::default(),
            return_address_taken: false,
            needs_realignment: false,
            fp_reserved_by_ra: false,
            used_callee_saved: Vec::new(),
        }
    }

    pub fn entry_block(&self) -> &MachineBasicBlock {
        &self.blocks[0]
    }

    pub fn entry_block_mut(&mut self) -> &mut MachineBasicBlock {
        &mut self.blocks[0]
    }

    /// Whether any instruction in the body reads `reg`.
    pub fn body_reads_reg(&self, reg: Reg) -> bool {
        self.blocks
            .iter()
            .flat_map(|b| b.insts.iter())
            .any(|i| i.reads_reg(reg))
    }
}
