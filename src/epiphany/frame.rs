// This module implements the Epiphany-specific parts of frame lowering: deciding
// frame-pointer necessity, computing the frame layout and splitting the total
// stack adjustment into an encodable initial part and a residual part, emitting
// the prologue and epilogue including the callee-save spill/restore sequences,
// pairing adjacent same-class callee-saved registers into doubleword memory
// operations, resolving abstract frame indices to a concrete base register plus
// offset, and eliminating the call-frame pseudo instructions. The operations
// involved in setting up and tearing down the frame are similar enough that the
// spills and restores share one implementation parameterized on direction.

//! Epiphany frame lowering.
//!
//! Layout, with the stack growing downward and all offsets measured upward from
//! the stack pointer after the full prologue adjustment:
//!
//! ```text
//!   old SP ->  +-----------------------+
//!              |  padding              |
//!              |  locals               |  local slot at csr_size + offset
//!              |  callee-save region   |  slot j at offset 4*j
//!   new SP ->  +-----------------------+
//! ```
//!
//! The total adjustment is split into an initial part that one add-immediate
//! can encode and a residual applied by a second instruction, so the stack
//! pointer moves monotonically: grow then grow again on entry, shrink then
//! shrink again in reverse order on exit. No intermediate state ever leaves
//! saved data above the stack pointer.

use log::debug;

use crate::core::error::{CodegenError, CodegenResult};
use crate::core::mir::{
    CalleeSavedInfo, MachineFunction, MachineInst, MachineOperand, MiFlag,
};
use crate::core::session::CompilationSession;
use crate::epiphany::instr_info::{
    emit_sp_update, load_store_method, EpiphanyInstrInfo, Opcode, ADD_IMM_MAX,
};
use crate::epiphany::regs::{self, Reg, RegClass};

/// Stack alignment in bytes.
pub const STACK_ALIGN: u64 = 8;

/// Alignment maintained while the stack is transiently adjusted around calls.
pub const TRANSIENT_STACK_ALIGN: u64 = 4;

fn align_to(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// Stack layout decisions for one function.
///
/// Invariant: `initial + residual == total_size`, `initial` is encodable by a
/// single add-immediate, `residual >= 0`. Created once during
/// prologue/epilogue insertion; the residual may be recomputed if the frame
/// size changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub total_size: u64,
    pub initial: u64,
    pub residual: u64,
    pub has_fp: bool,
    /// Offset of the first local slot: the callee-save region sits below.
    pub local_offset_base: i64,
    pub callee_save_region_size: u64,
}

/// Epiphany implementation of the frame lowering hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct EpiphanyFrameLowering {
    tii: EpiphanyInstrInfo,
}

impl EpiphanyFrameLowering {
    pub fn new() -> Self {
        Self {
            tii: EpiphanyInstrInfo::new(),
        }
    }

    /// Whether the function needs a frame pointer: stack realignment,
    /// variable-sized allocations, or the allocator reserved one.
    pub fn has_fp(&self, mf: &MachineFunction) -> bool {
        mf.needs_realignment || mf.frame.has_var_sized_objects || mf.fp_reserved_by_ra
    }

    /// Whether frame references should be based on FP rather than SP.
    pub fn use_fp_for_addressing(&self, mf: &MachineFunction) -> bool {
        self.has_fp(mf)
    }

    /// The call frame is folded into the fixed frame unless allocations of
    /// variable size move the stack pointer unpredictably.
    pub fn has_reserved_call_frame(&self, mf: &MachineFunction) -> bool {
        !mf.frame.has_var_sized_objects
    }

    /// Decide how much stack adjustment to perform in each phase of the
    /// prologue and epilogue.
    pub fn split_sp_adjustments(&self, total: u64) -> (u64, u64) {
        if total <= ADD_IMM_MAX as u64 {
            return (total, 0);
        }
        let initial = (ADD_IMM_MAX as u64) & !(STACK_ALIGN - 1);
        (initial, total - initial)
    }

    /// Runs before the generic framework scans for callee-saved registers:
    /// reserves the frame pointer if the function needs one and assigns each
    /// used callee-saved register a slot in architecture order.
    pub fn process_function_before_callee_saved_scan(&self, mf: &mut MachineFunction) {
        if self.has_fp(mf) && !mf.used_callee_saved.contains(&regs::FP) {
            mf.used_callee_saved.push(regs::FP);
        }

        let mut callee_saved = Vec::new();
        let mut offset: i64 = 0;
        for &reg in regs::CALLEE_SAVED {
            if !mf.used_callee_saved.contains(&reg) {
                continue;
            }
            let class = RegClass::of(reg);
            let frame_idx = mf
                .frame
                .create_frame_object(class.spill_size(), class.spill_size());
            mf.frame.set_object_offset(frame_idx, offset);
            callee_saved.push(CalleeSavedInfo {
                reg,
                class,
                frame_idx,
                offset,
            });
            offset += class.spill_size() as i64;
        }

        mf.frame.callee_saved_region_size = align_to(offset as u64, STACK_ALIGN);
        mf.frame.callee_saved = callee_saved;
    }

    /// Assign offsets to the remaining frame objects and fix the frame size.
    ///
    /// May run again after optimization creates more frame objects: placed
    /// slots keep their offsets and new slots go above the current high-water
    /// mark, so the total only ever grows.
    pub fn compute_layout(&self, mf: &mut MachineFunction) -> FrameLayout {
        let csr_size = mf.frame.callee_saved_region_size;

        // Local slots are laid out relative to the top of the callee-save
        // region; the frame-index resolver adds the region size back in.
        // Callee-save slots are placed in SP-relative coordinates and must not
        // feed the local high-water mark.
        let cs_slots: Vec<i32> = mf.frame.callee_saved.iter().map(|c| c.frame_idx).collect();
        let mut running: u64 = 0;
        for (idx, obj) in mf.frame.objects() {
            if cs_slots.contains(&idx) {
                continue;
            }
            if let Some(off) = obj.offset {
                running = running.max(off as u64 + obj.size);
            }
        }

        let mut pending = Vec::new();
        for (idx, obj) in mf.frame.objects() {
            if obj.offset.is_some() {
                continue; // already placed
            }
            running = align_to(running, obj.align);
            pending.push((idx, running as i64));
            running += obj.size;
        }
        for (idx, off) in pending {
            mf.frame.set_object_offset(idx, off);
        }

        let total_size = align_to(csr_size + align_to(running, STACK_ALIGN), STACK_ALIGN);
        let (initial, residual) = self.split_sp_adjustments(total_size);
        mf.frame.stack_size = total_size;

        FrameLayout {
            total_size,
            initial,
            residual,
            has_fp: self.has_fp(mf),
            local_offset_base: csr_size as i64,
            callee_save_region_size: csr_size,
        }
    }

    /// If the register is LR and the return address is used in the function
    /// then the callee-save store doesn't actually kill the register,
    /// otherwise it does.
    pub fn determine_prologue_death(&self, mf: &MachineFunction, reg: Reg) -> bool {
        if reg == regs::LR && (mf.return_address_taken || mf.body_reads_reg(regs::LR)) {
            return false;
        }
        true
    }

    /// Emit the loads or stores required during prologue and epilogue as
    /// efficiently as possible: consecutive same-class registers with adjacent
    /// slots share one paired instruction, everything else goes singly. The
    /// save order is fixed by the caller; only pairing boundaries are decided
    /// here. Restores come out in reverse order.
    pub fn emit_frame_mem_ops(
        &self,
        session: &CompilationSession<'_>,
        mf: &MachineFunction,
        is_store: bool,
    ) -> CodegenResult<Vec<MachineInst>> {
        let csi = &mf.frame.callee_saved;
        let flag = if is_store {
            MiFlag::FrameSetup
        } else {
            MiFlag::FrameDestroy
        };

        let mut seq = Vec::new();
        let mut i = 0;
        while i < csi.len() {
            let a = csi[i];
            let method = load_store_method(a.class, is_store);
            let spill = a.class.spill_size() as i64;

            let pair = csi.get(i + 1).copied().filter(|b| {
                b.class == a.class && b.offset == a.offset + spill && a.offset % (2 * spill) == 0
            });

            if let Some(b) = pair {
                let operands = if is_store {
                    vec![
                        MachineOperand::reg_use_kill(a.reg, self.determine_prologue_death(mf, a.reg)),
                        MachineOperand::reg_use_kill(b.reg, self.determine_prologue_death(mf, b.reg)),
                        MachineOperand::FrameIndex(a.frame_idx),
                    ]
                } else {
                    vec![
                        MachineOperand::reg_def(a.reg),
                        MachineOperand::reg_def(b.reg),
                        MachineOperand::FrameIndex(a.frame_idx),
                    ]
                };
                seq.push(MachineInst::with_flag(method.pair_opcode, operands, flag));
                session.record_pair_emitted();
                i += 2;
            } else {
                let operands = if is_store {
                    vec![
                        MachineOperand::reg_use_kill(a.reg, self.determine_prologue_death(mf, a.reg)),
                        MachineOperand::FrameIndex(a.frame_idx),
                    ]
                } else {
                    vec![
                        MachineOperand::reg_def(a.reg),
                        MachineOperand::FrameIndex(a.frame_idx),
                    ]
                };
                seq.push(MachineInst::with_flag(method.single_opcode, operands, flag));
                session.record_single_emitted();
                i += 1;
            }
        }

        if !is_store {
            seq.reverse();
        }
        Ok(seq)
    }

    /// Insert prologue code into the function's entry block: the split stack
    /// adjustment, then the callee-save stores, then frame-pointer setup.
    pub fn emit_prologue(
        &self,
        session: &CompilationSession<'_>,
        mf: &mut MachineFunction,
        layout: &FrameLayout,
    ) -> CodegenResult<()> {
        debug!(
            "prologue for {}: total {} = initial {} + residual {}",
            mf.name, layout.total_size, layout.initial, layout.residual
        );

        let mut seq = Vec::new();
        if layout.initial > 0 {
            emit_sp_update(&mut seq, regs::IP, -(layout.initial as i64), MiFlag::FrameSetup)?;
        }
        if layout.residual > 0 {
            emit_sp_update(&mut seq, regs::IP, -(layout.residual as i64), MiFlag::FrameSetup)?;
        }

        seq.extend(self.emit_frame_mem_ops(session, mf, true)?);

        if layout.has_fp {
            seq.push(MachineInst::with_flag(
                Opcode::AddRi,
                vec![
                    MachineOperand::reg_def(regs::FP),
                    MachineOperand::reg_use(regs::SP),
                    MachineOperand::Imm(0),
                ],
                MiFlag::FrameSetup,
            ));
        }

        mf.entry_block_mut().insts.splice(0..0, seq);
        session.record_frame_lowered(layout.total_size);
        Ok(())
    }

    /// Insert epilogue code ahead of the block's terminator: callee-save loads
    /// in reverse order, then the stack adjustments undone in reverse.
    pub fn emit_epilogue(
        &self,
        session: &CompilationSession<'_>,
        mf: &mut MachineFunction,
        block_idx: usize,
        layout: &FrameLayout,
    ) -> CodegenResult<()> {
        let mut seq = Vec::new();

        if layout.has_fp && mf.frame.has_var_sized_objects {
            // SP is not statically known here; recover it from FP first.
            seq.push(MachineInst::with_flag(
                Opcode::MovRr,
                vec![
                    MachineOperand::reg_def(regs::SP),
                    MachineOperand::reg_use(regs::FP),
                ],
                MiFlag::FrameDestroy,
            ));
        }

        seq.extend(self.emit_frame_mem_ops(session, mf, false)?);

        if layout.residual > 0 {
            emit_sp_update(&mut seq, regs::IP, layout.residual as i64, MiFlag::FrameDestroy)?;
        }
        if layout.initial > 0 {
            emit_sp_update(&mut seq, regs::IP, layout.initial as i64, MiFlag::FrameDestroy)?;
        }

        let bb = &mut mf.blocks[block_idx];
        let at = bb.first_terminator_idx();
        bb.insts.splice(at..at, seq);
        Ok(())
    }

    /// Map an abstract stack slot reference to a base register and offset.
    ///
    /// `sp_adj` is the net stack-pointer movement already applied by stack
    /// adjusting pseudos between function entry and the reference point, as
    /// tracked by the generic framework. Callee-save operations address their
    /// slots directly; every other reference sits above the callee-save region
    /// and has its size added. Offsets the using instruction cannot encode are
    /// an internal consistency violation and fail fatally.
    pub fn resolve_frame_index(
        &self,
        mf: &MachineFunction,
        layout: &FrameLayout,
        frame_idx: i32,
        sp_adj: i64,
        is_callee_save_op: bool,
        user: Option<Opcode>,
    ) -> CodegenResult<(Reg, i64)> {
        let slot = mf
            .frame
            .object(frame_idx)
            .offset
            .ok_or_else(|| CodegenError::FrameLowering {
                reason: format!("frame index {} has no assigned offset", frame_idx),
            })?;

        let mut offset = sp_adj + slot;
        if !is_callee_save_op {
            offset += layout.callee_save_region_size as i64;
        }

        if let Some(opcode) = user {
            if let Some(constraint) = self.tii.address_constraints(opcode) {
                if !constraint.accepts(offset) {
                    return Err(CodegenError::FrameOffsetOutOfRange {
                        opcode: opcode.name(),
                        frame_index: frame_idx,
                        offset,
                    });
                }
            }
        }

        let base = if self.use_fp_for_addressing(mf) {
            regs::FP
        } else {
            regs::SP
        };
        Ok((base, offset))
    }

    /// Replace a call-frame pseudo with real stack adjustment code, or just
    /// drop it when the call frame is reserved inside the fixed frame.
    pub fn eliminate_call_frame_pseudo(
        &self,
        mf: &mut MachineFunction,
        block_idx: usize,
        inst_idx: usize,
    ) -> CodegenResult<()> {
        let inst = mf.blocks[block_idx].insts[inst_idx].clone();
        let amount = match inst.operands.first() {
            Some(MachineOperand::Imm(v)) => *v,
            _ => {
                return Err(CodegenError::FrameLowering {
                    reason: "call-frame pseudo without an immediate amount".to_string(),
                })
            }
        };

        let adjustment = match inst.opcode {
            Opcode::AdjCallStackDown => -amount,
            Opcode::AdjCallStackUp => amount,
            _ => {
                return Err(CodegenError::FrameLowering {
                    reason: format!("{} is not a call-frame pseudo", inst.opcode.name()),
                })
            }
        };

        mf.blocks[block_idx].insts.remove(inst_idx);

        if self.has_reserved_call_frame(mf) || adjustment == 0 {
            return Ok(());
        }

        let aligned = if adjustment < 0 {
            -(align_to(adjustment.unsigned_abs(), TRANSIENT_STACK_ALIGN) as i64)
        } else {
            align_to(adjustment as u64, TRANSIENT_STACK_ALIGN) as i64
        };

        let mut seq = Vec::new();
        emit_sp_update(&mut seq, regs::IP, aligned, MiFlag::None)?;
        mf.blocks[block_idx].insts.splice(inst_idx..inst_idx, seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sp_adjustments_invariants() {
        let tfl = EpiphanyFrameLowering::new();
        for total in [0u64, 8, 16, 512, 1016, 1023, 1024, 2048, 4096, 65536] {
            let (initial, residual) = tfl.split_sp_adjustments(total);
            assert_eq!(initial + residual, total, "total {}", total);
            assert!(initial <= ADD_IMM_MAX as u64);
        }
    }

    #[test]
    fn test_split_small_total_is_single_phase() {
        let tfl = EpiphanyFrameLowering::new();
        assert_eq!(tfl.split_sp_adjustments(0), (0, 0));
        assert_eq!(tfl.split_sp_adjustments(64), (64, 0));
        assert_eq!(tfl.split_sp_adjustments(1023), (1023, 0));
    }

    #[test]
    fn test_split_large_total_leaves_residual() {
        let tfl = EpiphanyFrameLowering::new();
        let (initial, residual) = tfl.split_sp_adjustments(4096);
        assert_eq!(initial, 1016); // largest aligned add-immediate
        assert_eq!(residual, 3080);
    }

    #[test]
    fn test_has_fp_conditions() {
        let tfl = EpiphanyFrameLowering::new();
        let mut mf = MachineFunction::new("f");
        assert!(!tfl.has_fp(&mf));

        mf.needs_realignment = true;
        assert!(tfl.has_fp(&mf));
        mf.needs_realignment = false;

        mf.frame.has_var_sized_objects = true;
        assert!(tfl.has_fp(&mf));
        mf.frame.has_var_sized_objects = false;

        mf.fp_reserved_by_ra = true;
        assert!(tfl.has_fp(&mf));
    }

    #[test]
    fn test_callee_saved_scan_orders_and_places_slots() {
        let tfl = EpiphanyFrameLowering::new();
        let mut mf = MachineFunction::new("f");
        // Deliberately unordered input from the allocator.
        mf.used_callee_saved = vec![regs::R6, regs::R4, regs::LR];

        tfl.process_function_before_callee_saved_scan(&mut mf);

        let regs_in_order: Vec<Reg> =
            mf.frame.callee_saved.iter().map(|c| c.reg).collect();
        assert_eq!(regs_in_order, vec![regs::R4, regs::R6, regs::LR]);

        let offsets: Vec<i64> = mf.frame.callee_saved.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(mf.frame.callee_saved_region_size, 16); // 12 aligned up
    }

    #[test]
    fn test_fp_reserved_when_frame_pointer_needed() {
        let tfl = EpiphanyFrameLowering::new();
        let mut mf = MachineFunction::new("f");
        mf.frame.has_var_sized_objects = true;
        tfl.process_function_before_callee_saved_scan(&mut mf);
        assert!(mf.frame.callee_saved.iter().any(|c| c.reg == regs::FP));
    }

    #[test]
    fn test_determine_prologue_death() {
        let tfl = EpiphanyFrameLowering::new();
        let mut mf = MachineFunction::new("f");

        // No LR read: the store kills.
        assert!(tfl.determine_prologue_death(&mf, regs::LR));
        assert!(tfl.determine_prologue_death(&mf, regs::R4));

        // Explicit return-address use keeps LR alive past the store.
        mf.return_address_taken = true;
        assert!(!tfl.determine_prologue_death(&mf, regs::LR));
        assert!(tfl.determine_prologue_death(&mf, regs::R4));

        // A body read of LR has the same effect.
        let mut mf = MachineFunction::new("g");
        mf.entry_block_mut().push(MachineInst::new(
            Opcode::MovRr,
            vec![
                MachineOperand::reg_def(regs::R0),
                MachineOperand::reg_use(regs::LR),
            ],
        ));
        assert!(!tfl.determine_prologue_death(&mf, regs::LR));
    }

    #[test]
    fn test_layout_places_locals_above_callee_saves() {
        let tfl = EpiphanyFrameLowering::new();
        let mut mf = MachineFunction::new("f");
        mf.used_callee_saved = vec![regs::R4, regs::R5];
        tfl.process_function_before_callee_saved_scan(&mut mf);

        let a = mf.frame.create_frame_object(4, 4);
        let b = mf.frame.create_frame_object(8, 8);
        let layout = tfl.compute_layout(&mut mf);

        assert_eq!(layout.callee_save_region_size, 8);
        assert_eq!(layout.local_offset_base, 8);
        // Locals are relative to the top of the callee-save region.
        assert_eq!(mf.frame.object(a).offset, Some(0));
        assert_eq!(mf.frame.object(b).offset, Some(8));
        assert_eq!(layout.total_size, 24);
        assert_eq!(layout.initial + layout.residual, layout.total_size);
    }

    #[test]
    fn test_layout_recompute_keeps_placed_slots() {
        let tfl = EpiphanyFrameLowering::new();
        let mut mf = MachineFunction::new("f");
        mf.used_callee_saved = vec![regs::R4, regs::R5];
        tfl.process_function_before_callee_saved_scan(&mut mf);

        let a = mf.frame.create_frame_object(8, 8);
        let first = tfl.compute_layout(&mut mf);
        assert_eq!(mf.frame.object(a).offset, Some(0));

        // A slot created after layout lands above the existing one.
        let b = mf.frame.create_frame_object(8, 8);
        let second = tfl.compute_layout(&mut mf);
        assert_eq!(mf.frame.object(a).offset, Some(0));
        assert_eq!(mf.frame.object(b).offset, Some(8));
        assert_eq!(second.total_size, first.total_size + 8);
    }

    #[test]
    fn test_resolve_frame_index_adds_region_for_locals_only() {
        let tfl = EpiphanyFrameLowering::new();
        let mut mf = MachineFunction::new("f");
        mf.used_callee_saved = vec![regs::R4, regs::R5];
        tfl.process_function_before_callee_saved_scan(&mut mf);
        let local = mf.frame.create_frame_object(4, 4);
        let layout = tfl.compute_layout(&mut mf);

        let cs_idx = mf.frame.callee_saved[1].frame_idx;
        let (base, off) = tfl
            .resolve_frame_index(&mf, &layout, cs_idx, 0, true, Some(Opcode::Str32))
            .unwrap();
        assert_eq!(base, regs::SP);
        assert_eq!(off, 4);

        let (_, off) = tfl
            .resolve_frame_index(&mf, &layout, local, 0, false, Some(Opcode::Ldr32))
            .unwrap();
        assert_eq!(off, 8); // 0 + callee-save region

        // A pending call adjustment shifts the reference.
        let (_, off) = tfl
            .resolve_frame_index(&mf, &layout, local, 16, false, Some(Opcode::Ldr32))
            .unwrap();
        assert_eq!(off, 24);
    }

    #[test]
    fn test_resolve_frame_index_rejects_unencodable_offset() {
        let tfl = EpiphanyFrameLowering::new();
        let mut mf = MachineFunction::new("f");
        let local = mf.frame.create_frame_object(4, 4);
        let layout = tfl.compute_layout(&mut mf);

        // Offset beyond what a word load can encode.
        let err = tfl.resolve_frame_index(&mf, &layout, local, 9000, false, Some(Opcode::Ldr32));
        assert!(matches!(
            err,
            Err(CodegenError::FrameOffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn test_frame_pointer_base_when_addressing_through_fp() {
        let tfl = EpiphanyFrameLowering::new();
        let mut mf = MachineFunction::new("f");
        mf.frame.has_var_sized_objects = true;
        let local = mf.frame.create_frame_object(4, 4);
        let layout = tfl.compute_layout(&mut mf);

        let (base, _) = tfl
            .resolve_frame_index(&mf, &layout, local, 0, false, None)
            .unwrap();
        assert_eq!(base, regs::FP);
    }
}
