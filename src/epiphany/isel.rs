// This module implements the Epiphany instruction selector: a single rewrite pass
// over the function's selection DAG that replaces each generic node with machine
// nodes. The hand-written rules cover exactly the cases the architecture needs
// special logic for -- frame-index references (rewritten to frame-base plus zero,
// deferring the real offset to the frame-index resolver), literal-pool references
// (a purely representational retargeting), and integer/floating-point constant
// materialization through the MovRi/MovtRi instruction pair. Everything else falls
// through to the pattern table. Materialization failures are fatal by contract;
// the literal-pool fallback is retained as documented, currently-unreachable code
// so that re-enabling it stays a local change.

//! Epiphany DAG-to-DAG instruction selection.
//!
//! The selector walks nodes uses-before-definitions, skipping nodes that are
//! already target-specific and nodes killed by earlier replacements. Once a
//! node reaches the custom-rule switch the outcome is contractually success or
//! a fatal error; only the default pattern-table path has an expected-miss
//! case, and its failure policy belongs to the generic framework.

use log::trace;

use crate::core::dag::{NodeId, NodeKind, SelectionDag, ValueType};
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::mir::RefKind;
use crate::core::session::CompilationSession;
use crate::epiphany::instr_info::{Opcode, LDST_IMM_BOUND};
use crate::epiphany::patterns;
use crate::epiphany::target::EpiphanyTargetMachine;

/// Epiphany specific code to select Epiphany machine instructions for the
/// generic computation graph.
pub struct EpiphanyDagToDagISel<'s, 'arena> {
    session: &'s CompilationSession<'arena>,
    tm: &'s EpiphanyTargetMachine,
}

impl<'s, 'arena> EpiphanyDagToDagISel<'s, 'arena> {
    pub fn new(session: &'s CompilationSession<'arena>, tm: &'s EpiphanyTargetMachine) -> Self {
        Self { session, tm }
    }

    pub fn pass_name(&self) -> &'static str {
        "Epiphany Instruction Selection"
    }

    /// Select every node of the DAG, uses before definitions.
    pub fn run(&mut self, dag: &mut SelectionDag<'arena>) -> CodegenResult<()> {
        for id in (0..dag.len() as NodeId).rev() {
            if dag.is_dead(id) {
                continue;
            }
            self.select(dag, id)?;
        }
        Ok(())
    }

    /// Offset predicate for the immediate load/store family: accepts a constant
    /// byte offset divisible by `mem_size` whose scaled value fits the 11-bit
    /// bound, and returns the scaled immediate.
    pub fn select_offset_imm11(
        &self,
        dag: &SelectionDag<'arena>,
        n: NodeId,
        mem_size: i64,
    ) -> Option<i64> {
        let maxv = LDST_IMM_BOUND;
        let bits = match dag.node(n).kind {
            NodeKind::Constant { bits } => bits,
            _ => return None,
        };
        let value = bits as u32 as i32 as i64;
        if value % mem_size != 0 || !(value / mem_size >= -maxv && value / mem_size <= maxv) {
            return None;
        }
        Some(value / mem_size)
    }

    fn select(&mut self, dag: &mut SelectionDag<'arena>, id: NodeId) -> CodegenResult<()> {
        let kind = dag.node(id).kind;
        let vt = dag.node(id).vt;
        trace!("selecting node {}: {}", id, kind.name());

        if kind.is_selected() {
            trace!("== node {} already selected", id);
            return Ok(());
        }

        match kind {
            NodeKind::FrameIndex { index } => {
                // Compute address = frame-base + 0; the frame-index resolver
                // substitutes the concrete base register and offset late.
                let tfi = dag.add_node(NodeKind::TargetFrameIndex { index }, vt, &[]);
                let zero = dag.add_node(NodeKind::TargetConstant { bits: 0 }, vt, &[]);
                dag.morph_node_to(id, Opcode::AddRi, &[tfi, zero]);
                self.session.record_node_selected(Opcode::AddRi.name());
                Ok(())
            }
            NodeKind::ConstantPool { entry } => {
                // Constant pools are fine, just create a target entry.
                let cp = dag.add_node(
                    NodeKind::TargetConstantPool {
                        entry,
                        ref_kind: RefKind::None,
                    },
                    vt,
                    &[],
                );
                dag.replace_all_uses(id, cp);
                Ok(())
            }
            NodeKind::Constant { .. } | NodeKind::ConstantFp { .. } => {
                // No working pool fallback for integers: materialization either
                // succeeds or compilation of the function stops.
                self.try_select_move_imm(dag, id)?;
                Ok(())
            }
            _ => {
                let opcode = patterns::match_generic(kind, vt).ok_or(CodegenError::NoPattern {
                    kind: kind.name(),
                })?;
                let ops: Vec<NodeId> = dag.node(id).ops.iter().copied().collect();
                dag.morph_node_to(id, opcode, &ops);
                self.session.record_node_selected(opcode.name());
                Ok(())
            }
        }
    }

    /// Materialize a 32-bit constant with at most two move instructions.
    ///
    /// Integers: MovRi carries the low 16 bits zero-extended; when any upper
    /// bit is set a MovtRi merges the high half, i.e. LUi(LLi(val{15-0}),
    /// val{31-16}). Floats share the shape, except the merge is skipped
    /// precisely for the positive-zero bit pattern.
    fn try_select_move_imm(
        &mut self,
        dag: &mut SelectionDag<'arena>,
        id: NodeId,
    ) -> CodegenResult<NodeId> {
        let node = dag.node(id);
        let vt = node.vt;
        let kind = node.kind;

        let dest_width = vt.size_in_bits();
        if dest_width != 32 {
            return Err(CodegenError::UnsupportedWidth {
                operation: "move-immediate",
                width: dest_width,
            });
        }

        let res = match kind {
            NodeKind::Constant { bits } => {
                if bits & !0xFFFF_FFFF != 0 {
                    return Err(CodegenError::OversizedConstant { bits });
                }

                // 0 or 16 lower bits
                let imm = dag.add_node(NodeKind::TargetConstant { bits }, vt, &[]);
                let mut res = dag.add_node(NodeKind::Machine { opcode: Opcode::MovRi }, vt, &[imm]);
                self.session.record_node_selected(Opcode::MovRi.name());
                let mut count = 1;

                if bits & 0xFFFF_0000 != 0 {
                    // 16 upper bits
                    let imm = dag.add_node(NodeKind::TargetConstant { bits }, vt, &[]);
                    res = dag.add_node(
                        NodeKind::Machine { opcode: Opcode::MovtRi },
                        vt,
                        &[res, imm],
                    );
                    self.session.record_node_selected(Opcode::MovtRi.name());
                    count = 2;
                }
                self.session.record_constant_materialized(count);
                res
            }
            NodeKind::ConstantFp { bits } => {
                let imm = dag.add_node(NodeKind::TargetConstantFp { bits }, vt, &[]);
                let mut res =
                    dag.add_node(NodeKind::Machine { opcode: Opcode::MovRiF }, vt, &[imm]);
                self.session.record_node_selected(Opcode::MovRiF.name());
                let mut count = 1;

                // Exact positive zero is the only single-instruction pattern;
                // negative zero still needs the high half merged.
                if bits != 0x0000_0000 {
                    let imm = dag.add_node(NodeKind::TargetConstantFp { bits }, vt, &[]);
                    res = dag.add_node(
                        NodeKind::Machine { opcode: Opcode::MovtRiF },
                        vt,
                        &[res, imm],
                    );
                    self.session.record_node_selected(Opcode::MovtRiF.name());
                    count = 2;
                }
                self.session.record_constant_materialized(count);
                res
            }
            _ => {
                return Err(CodegenError::UnreachableFallback {
                    context: "move-immediate on a non-constant node",
                })
            }
        };

        dag.replace_all_uses(id, res);
        Ok(res)
    }

    /// Materialize an integer constant through the read-only literal pool,
    /// addressed via a hi16/lo16 relocation pair.
    ///
    /// Retained fallback: the move-immediate path currently always succeeds for
    /// well-formed 32-bit constants, so nothing reaches this. It stays here
    /// because re-enabling pool materialization is the plausible extension for
    /// constants that stop being cheap to synthesize.
    #[allow(dead_code)]
    fn select_to_lit_pool(
        &mut self,
        dag: &mut SelectionDag<'arena>,
        id: NodeId,
    ) -> CodegenResult<NodeId> {
        let node = dag.node(id);
        let vt = node.vt;
        let bits = match node.kind {
            NodeKind::Constant { bits } => bits,
            _ => {
                return Err(CodegenError::UnreachableFallback {
                    context: "literal-pool lowering of a non-constant node",
                })
            }
        };

        let entry = dag.add_pool_entry(bits, 4);
        let hi = dag.add_node(
            NodeKind::TargetConstantPool { entry, ref_kind: RefKind::Hi16 },
            ValueType::I32,
            &[],
        );
        let lo = dag.add_node(
            NodeKind::TargetConstantPool { entry, ref_kind: RefKind::Lo16 },
            ValueType::I32,
            &[],
        );
        let addr = dag.add_node(NodeKind::PoolWrapper, ValueType::I32, &[hi, lo]);

        // The pool access uses generic nodes on purpose so selection would
        // continue from the freshly created load.
        let load = dag.add_node(NodeKind::Load, vt, &[addr]);
        dag.replace_all_uses(id, load);
        Ok(load)
    }

    /// Floating-point twin of [`Self::select_to_lit_pool`]; reachable only in
    /// theory because the two-instruction move path always succeeds.
    #[allow(dead_code)]
    fn lower_to_fp_lit_pool(
        &mut self,
        dag: &mut SelectionDag<'arena>,
        id: NodeId,
    ) -> CodegenResult<NodeId> {
        debug_assert!(
            self.tm.code_model_small(),
            "only the small code model is supported"
        );

        let node = dag.node(id);
        let vt = node.vt;
        let bits = match node.kind {
            NodeKind::ConstantFp { bits } => bits,
            _ => {
                return Err(CodegenError::UnreachableFallback {
                    context: "fp literal-pool lowering of a non-fp node",
                })
            }
        };

        let entry = dag.add_pool_entry(bits as u64, 4);
        let hi = dag.add_node(
            NodeKind::TargetConstantPool { entry, ref_kind: RefKind::Hi16 },
            ValueType::I32,
            &[],
        );
        let lo = dag.add_node(
            NodeKind::TargetConstantPool { entry, ref_kind: RefKind::Lo16 },
            ValueType::I32,
            &[],
        );
        let addr = dag.add_node(NodeKind::PoolWrapper, ValueType::I32, &[hi, lo]);
        let load = dag.add_node(NodeKind::Load, vt, &[addr]);
        dag.replace_all_uses(id, load);
        Ok(load)
    }
}
