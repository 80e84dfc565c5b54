//! Integration tests for Epiphany instruction selection.
//!
//! These exercise the selector end to end on small DAGs: constant
//! materialization instruction counts and bit-exactness, frame-index and
//! constant-pool rewrites, and the default pattern-table path.

use bumpalo::Bump;
use epiphany_backend::core::{CompilationSession, NodeId, NodeKind, SelectionDag, ValueType};
use epiphany_backend::epiphany::{EpiphanyDagToDagISel, EpiphanyTargetMachine, Opcode};
use epiphany_backend::CodegenError;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn machine_opcode(dag: &SelectionDag, id: NodeId) -> Option<Opcode> {
    match dag.node(id).kind {
        NodeKind::Machine { opcode } => Some(opcode),
        _ => None,
    }
}

/// Decode the value produced by a materialized move sequence rooted at `id`.
fn decode_materialized(dag: &SelectionDag, id: NodeId) -> u32 {
    match machine_opcode(dag, id) {
        Some(Opcode::MovRi) | Some(Opcode::MovRiF) => {
            let ops: Vec<NodeId> = dag.node(id).ops.iter().copied().collect();
            let bits = target_bits(dag, ops[0]);
            bits & 0xFFFF
        }
        Some(Opcode::MovtRi) | Some(Opcode::MovtRiF) => {
            let ops: Vec<NodeId> = dag.node(id).ops.iter().copied().collect();
            let low = decode_materialized(dag, ops[0]);
            let bits = target_bits(dag, ops[1]);
            (bits & 0xFFFF_0000) | (low & 0xFFFF)
        }
        other => panic!("unexpected materialization root {:?}", other),
    }
}

fn target_bits(dag: &SelectionDag, id: NodeId) -> u32 {
    match dag.node(id).kind {
        NodeKind::TargetConstant { bits } => bits as u32,
        NodeKind::TargetConstantFp { bits } => bits,
        other => panic!("expected a target constant, got {:?}", other),
    }
}

/// Materialize one integer constant and return (root, instruction count).
fn materialize_int(bits: u64) -> (u32, usize) {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let tm = EpiphanyTargetMachine::default();
    let mut dag = SelectionDag::new(&session);

    let c = dag.add_node(NodeKind::Constant { bits }, ValueType::I32, &[]);
    let ret = dag.add_node(NodeKind::Ret, ValueType::I32, &[c]);

    let mut isel = EpiphanyDagToDagISel::new(&session, &tm);
    isel.run(&mut dag).unwrap();

    let ops: Vec<NodeId> = dag.node(ret).ops.iter().copied().collect();
    let value = decode_materialized(&dag, ops[0]);
    (value, session.stats().materialization_insts)
}

fn materialize_float(bits: u32) -> usize {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let tm = EpiphanyTargetMachine::default();
    let mut dag = SelectionDag::new(&session);

    let c = dag.add_node(NodeKind::ConstantFp { bits }, ValueType::F32, &[]);
    dag.add_node(NodeKind::Ret, ValueType::F32, &[c]);

    let mut isel = EpiphanyDagToDagISel::new(&session, &tm);
    isel.run(&mut dag).unwrap();
    session.stats().materialization_insts
}

#[test]
fn test_integer_materialization_reproduces_bit_patterns() {
    init_logging();
    for &v in &[
        0u32,
        1,
        0x7FFF,
        0xFFFF,
        0x1_0000 - 1,
        0x1_0000,
        0x1234_0000,
        0xDEAD_BEEF,
        0x8000_0000,
        0xFFFF_FFFF,
    ] {
        let (out, count) = materialize_int(v as u64);
        assert_eq!(out, v, "pattern {:#x} not reproduced", v);
        let expected = if v & 0xFFFF_0000 == 0 { 1 } else { 2 };
        assert_eq!(count, expected, "instruction count for {:#x}", v);
    }
}

#[test]
fn test_float_materialization_counts() {
    init_logging();
    // Only the exact positive-zero pattern is a single instruction.
    assert_eq!(materialize_float(0x0000_0000), 1);
    assert_eq!(materialize_float(0x8000_0000), 2); // negative zero
    assert_eq!(materialize_float(1.0f32.to_bits()), 2);
    assert_eq!(materialize_float(1.5f32.to_bits()), 2);
    // A pattern with empty high half still takes two: the special case is
    // positive zero, not "fits in 16 bits".
    assert_eq!(materialize_float(0x0000_1234), 2);
}

#[test]
fn test_non_word_width_is_fatal() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let tm = EpiphanyTargetMachine::default();
    let mut dag = SelectionDag::new(&session);

    dag.add_node(NodeKind::Constant { bits: 5 }, ValueType::I64, &[]);
    let mut isel = EpiphanyDagToDagISel::new(&session, &tm);
    let err = isel.run(&mut dag).unwrap_err();
    assert!(matches!(err, CodegenError::UnsupportedWidth { width: 64, .. }));
}

#[test]
fn test_store_through_frame_index_selects_fully() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let tm = EpiphanyTargetMachine::default();
    let mut dag = SelectionDag::new(&session);

    let value = dag.add_node(NodeKind::Constant { bits: 42 }, ValueType::I32, &[]);
    let addr = dag.add_node(NodeKind::FrameIndex { index: 0 }, ValueType::I32, &[]);
    let store = dag.add_node(NodeKind::Store, ValueType::I32, &[value, addr]);

    let mut isel = EpiphanyDagToDagISel::new(&session, &tm);
    isel.run(&mut dag).unwrap();

    assert_eq!(machine_opcode(&dag, store), Some(Opcode::Str32));
    // The address operand morphed in place to frame-base + 0.
    assert_eq!(machine_opcode(&dag, addr), Some(Opcode::AddRi));
    // The constant operand was replaced by a materialized move.
    let ops: Vec<NodeId> = dag.node(store).ops.iter().copied().collect();
    assert_eq!(machine_opcode(&dag, ops[0]), Some(Opcode::MovRi));
    assert!(dag.is_dead(value));
}

#[test]
fn test_selection_is_idempotent_for_machine_nodes() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let tm = EpiphanyTargetMachine::default();
    let mut dag = SelectionDag::new(&session);

    let a = dag.add_node(NodeKind::Constant { bits: 3 }, ValueType::I32, &[]);
    let b = dag.add_node(NodeKind::Constant { bits: 4 }, ValueType::I32, &[]);
    dag.add_node(NodeKind::Add, ValueType::I32, &[a, b]);

    let mut isel = EpiphanyDagToDagISel::new(&session, &tm);
    isel.run(&mut dag).unwrap();
    let selected = session.stats().nodes_selected;

    // A second pass only sees machine and target nodes and changes nothing.
    isel.run(&mut dag).unwrap();
    assert_eq!(session.stats().nodes_selected, selected);
}
