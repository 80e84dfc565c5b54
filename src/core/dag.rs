// This module implements the per-function selection DAG the instruction selector
// rewrites. Nodes are stored in insertion order and their operand lists live in the
// session's bumpalo arena; use edges are plain node indices. Replacement follows the
// "new node replaces old node, old node becomes dead" discipline: redirect every
// incoming index to the new node and mark the old one dead so the selector never
// visits it again. Nodes are immutable once created except for in-place morphing
// into a machine node (which preserves the node's identity and therefore all of its
// uses). The DAG also owns the function's read-only literal pool entries, which
// constant-pool nodes reference by index.

//! Selection DAG for one function.
//!
//! The graph is acyclic by construction: operands always refer to nodes created
//! earlier, so a node's index is a valid topological position. The selector
//! visits nodes in reverse insertion order (uses before definitions) and skips
//! dead nodes left behind by replacement.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;

use crate::core::mir::RefKind;
use crate::core::session::CompilationSession;
use crate::epiphany::instr_info::Opcode;

/// Index of a node inside its [`SelectionDag`].
pub type NodeId = u32;

/// Sentinel for "no node".
pub const INVALID_NODE: NodeId = u32::MAX;

/// Value kind produced by a node.
///
/// The Epiphany data layout is 32-bit (`e-p:32:32-...`); 64-bit kinds exist so
/// that malformed inputs are representable and can be rejected with a fatal
/// diagnostic rather than silently truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    pub fn size_in_bits(&self) -> u32 {
        match self {
            ValueType::I32 | ValueType::F32 => 32,
            ValueType::I64 | ValueType::F64 => 64,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, ValueType::I32 | ValueType::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ValueType::F32 | ValueType::F64)
    }
}

/// Operation performed by a DAG node.
///
/// Generic kinds come from the architecture-neutral graph handed to the
/// selector; `Target*`, [`NodeKind::PoolWrapper`] and [`NodeKind::Machine`]
/// nodes only appear as selection output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Integer constant, zero-extended bit pattern.
    Constant { bits: u64 },
    /// Floating-point constant as raw IEEE-754 single bits.
    ConstantFp { bits: u32 },
    /// Abstract reference to a stack slot.
    FrameIndex { index: i32 },
    /// Reference to a read-only literal pool entry.
    ConstantPool { entry: u32 },
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Srl,
    Sra,
    FAdd,
    FSub,
    FMul,
    Load,
    Store,
    Ret,

    /// Immediate operand of a machine node, full original bit pattern.
    TargetConstant { bits: u64 },
    /// Floating-point immediate operand of a machine node.
    TargetConstantFp { bits: u32 },
    /// Frame index operand of a machine node, resolved late.
    TargetFrameIndex { index: i32 },
    /// Literal pool operand with a relocation modifier.
    TargetConstantPool { entry: u32, ref_kind: RefKind },
    /// Address formation pairing hi16/lo16 pool references.
    PoolWrapper,
    /// Already-selected target instruction.
    Machine { opcode: Opcode },
}

impl NodeKind {
    /// Stable name for diagnostics and statistics.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Constant { .. } => "Constant",
            NodeKind::ConstantFp { .. } => "ConstantFp",
            NodeKind::FrameIndex { .. } => "FrameIndex",
            NodeKind::ConstantPool { .. } => "ConstantPool",
            NodeKind::Add => "Add",
            NodeKind::Sub => "Sub",
            NodeKind::Mul => "Mul",
            NodeKind::And => "And",
            NodeKind::Or => "Or",
            NodeKind::Xor => "Xor",
            NodeKind::Shl => "Shl",
            NodeKind::Srl => "Srl",
            NodeKind::Sra => "Sra",
            NodeKind::FAdd => "FAdd",
            NodeKind::FSub => "FSub",
            NodeKind::FMul => "FMul",
            NodeKind::Load => "Load",
            NodeKind::Store => "Store",
            NodeKind::Ret => "Ret",
            NodeKind::TargetConstant { .. } => "TargetConstant",
            NodeKind::TargetConstantFp { .. } => "TargetConstantFp",
            NodeKind::TargetFrameIndex { .. } => "TargetFrameIndex",
            NodeKind::TargetConstantPool { .. } => "TargetConstantPool",
            NodeKind::PoolWrapper => "PoolWrapper",
            NodeKind::Machine { .. } => "Machine",
        }
    }

    /// True for nodes selection must skip: already-selected machine nodes and
    /// the target-side operands they carry.
    pub fn is_selected(&self) -> bool {
        matches!(
            self,
            NodeKind::TargetConstant { .. }
                | NodeKind::TargetConstantFp { .. }
                | NodeKind::TargetFrameIndex { .. }
                | NodeKind::TargetConstantPool { .. }
                | NodeKind::PoolWrapper
                | NodeKind::Machine { .. }
        )
    }
}

/// One node of the selection DAG.
pub struct Node<'arena> {
    pub kind: NodeKind,
    pub vt: ValueType,
    /// Operand edges, indices of earlier nodes.
    pub ops: BumpVec<'arena, NodeId>,
    dead: bool,
}

impl<'arena> Node<'arena> {
    pub fn is_dead(&self) -> bool {
        self.dead
    }
}

/// Entry of the function's read-only literal pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEntry {
    pub bits: u64,
    pub align: u32,
}

/// The per-function computation graph.
pub struct SelectionDag<'arena> {
    arena: &'arena Bump,
    nodes: Vec<Node<'arena>>,
    pool: Vec<PoolEntry>,
}

impl<'arena> SelectionDag<'arena> {
    /// Create an empty DAG whose node storage lives in the session arena.
    pub fn new(session: &CompilationSession<'arena>) -> Self {
        Self {
            arena: session.arena(),
            nodes: Vec::new(),
            pool: Vec::new(),
        }
    }

    /// Number of nodes ever created, dead ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a node. Operands must refer to already-created nodes, which keeps
    /// the graph acyclic.
    pub fn add_node(&mut self, kind: NodeKind, vt: ValueType, ops: &[NodeId]) -> NodeId {
        let id = self.nodes.len() as NodeId;
        debug_assert!(ops.iter().all(|&op| op < id), "operand edge must point backwards");
        let mut op_list = BumpVec::with_capacity_in(ops.len(), self.arena);
        op_list.extend_from_slice(ops);
        self.nodes.push(Node {
            kind,
            vt,
            ops: op_list,
            dead: false,
        });
        id
    }

    /// Register a literal pool entry and return its index.
    pub fn add_pool_entry(&mut self, bits: u64, align: u32) -> u32 {
        let id = self.pool.len() as u32;
        self.pool.push(PoolEntry { bits, align });
        id
    }

    pub fn pool_entry(&self, entry: u32) -> PoolEntry {
        self.pool[entry as usize]
    }

    pub fn node(&self, id: NodeId) -> &Node<'arena> {
        &self.nodes[id as usize]
    }

    pub fn is_dead(&self, id: NodeId) -> bool {
        self.nodes[id as usize].dead
    }

    /// Redirect every use of `old` to `new` and mark `old` dead.
    ///
    /// The old node is never visited again; its operand edges are left in place
    /// so shared operands stay reachable through their other users.
    pub fn replace_all_uses(&mut self, old: NodeId, new: NodeId) {
        debug_assert_ne!(old, new);
        for (idx, node) in self.nodes.iter_mut().enumerate() {
            if idx as NodeId == old || node.dead {
                continue;
            }
            for op in node.ops.iter_mut() {
                if *op == old {
                    *op = new;
                }
            }
        }
        self.nodes[old as usize].dead = true;
    }

    /// Morph a node in place into a machine node, keeping its identity so all
    /// existing uses remain valid.
    pub fn morph_node_to(&mut self, id: NodeId, opcode: Opcode, ops: &[NodeId]) {
        let mut op_list = BumpVec::with_capacity_in(ops.len(), self.arena);
        op_list.extend_from_slice(ops);
        let node = &mut self.nodes[id as usize];
        node.kind = NodeKind::Machine { opcode };
        node.ops = op_list;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn test_node_creation_and_operands() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut dag = SelectionDag::new(&session);

        let a = dag.add_node(NodeKind::Constant { bits: 1 }, ValueType::I32, &[]);
        let b = dag.add_node(NodeKind::Constant { bits: 2 }, ValueType::I32, &[]);
        let add = dag.add_node(NodeKind::Add, ValueType::I32, &[a, b]);

        assert_eq!(dag.len(), 3);
        assert_eq!(dag.node(add).ops.as_slice(), &[a, b]);
        assert!(!dag.is_dead(a));
    }

    #[test]
    fn test_replace_all_uses_redirects_and_kills() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut dag = SelectionDag::new(&session);

        let c = dag.add_node(NodeKind::Constant { bits: 7 }, ValueType::I32, &[]);
        let add = dag.add_node(NodeKind::Add, ValueType::I32, &[c, c]);
        let imm = dag.add_node(NodeKind::TargetConstant { bits: 7 }, ValueType::I32, &[]);
        let mov = dag.add_node(
            NodeKind::Machine { opcode: Opcode::MovRi },
            ValueType::I32,
            &[imm],
        );

        dag.replace_all_uses(c, mov);

        assert!(dag.is_dead(c));
        assert!(!dag.is_dead(mov));
        assert_eq!(dag.node(add).ops.as_slice(), &[mov, mov]);
    }

    #[test]
    fn test_morph_keeps_identity() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut dag = SelectionDag::new(&session);

        let fi = dag.add_node(NodeKind::FrameIndex { index: 0 }, ValueType::I32, &[]);
        let load = dag.add_node(NodeKind::Load, ValueType::I32, &[fi]);

        let tfi = dag.add_node(NodeKind::TargetFrameIndex { index: 0 }, ValueType::I32, &[]);
        let zero = dag.add_node(NodeKind::TargetConstant { bits: 0 }, ValueType::I32, &[]);
        dag.morph_node_to(fi, Opcode::AddRi, &[tfi, zero]);

        // Uses did not move: the load still points at the same node id.
        assert_eq!(dag.node(load).ops.as_slice(), &[fi]);
        assert!(matches!(
            dag.node(fi).kind,
            NodeKind::Machine { opcode: Opcode::AddRi }
        ));
        assert!(!dag.is_dead(fi));
    }

    #[test]
    fn test_pool_entries() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut dag = SelectionDag::new(&session);

        let e = dag.add_pool_entry(0xDEAD_BEEF, 4);
        assert_eq!(e, 0);
        assert_eq!(dag.pool_entry(e).bits, 0xDEAD_BEEF);
        assert_eq!(dag.pool_entry(e).align, 4);
    }

    #[test]
    fn test_selected_kind_predicate() {
        assert!(NodeKind::Machine { opcode: Opcode::Ret }.is_selected());
        assert!(NodeKind::TargetConstant { bits: 0 }.is_selected());
        assert!(!NodeKind::Add.is_selected());
        assert!(!NodeKind::Constant { bits: 0 }.is_selected());
    }
}
