// This module is the default selection path: the mapping from generic operation
// shapes to Epiphany instruction templates. In the full toolchain this table is
// generated from the architecture description; the backend only hand-writes the
// custom rules in isel.rs and falls through to this table for everything else.
// A miss here is the generic framework's expected-miss case, surfaced as a
// distinct error whose policy belongs to the caller, not to the custom rules.

//! Generated-pattern stand-in mapping generic nodes to Epiphany opcodes.

use crate::core::dag::{NodeKind, ValueType};
use crate::epiphany::instr_info::Opcode;

/// Match a generic node shape against the pattern table.
///
/// Returns the machine opcode template, or `None` when no pattern covers the
/// shape (the caller decides the failure policy).
pub fn match_generic(kind: NodeKind, vt: ValueType) -> Option<Opcode> {
    let opcode = match kind {
        NodeKind::Add => Opcode::AddRr,
        NodeKind::Sub => Opcode::SubRr,
        NodeKind::Mul => Opcode::ImulRr,
        NodeKind::And => Opcode::AndRr,
        NodeKind::Or => Opcode::OrrRr,
        NodeKind::Xor => Opcode::EorRr,
        NodeKind::Shl => Opcode::LslRr,
        NodeKind::Srl => Opcode::LsrRr,
        NodeKind::Sra => Opcode::AsrRr,
        NodeKind::FAdd => Opcode::FAddRr,
        NodeKind::FSub => Opcode::FSubRr,
        NodeKind::FMul => Opcode::FMulRr,
        NodeKind::Load => match vt {
            ValueType::I32 | ValueType::F32 => Opcode::Ldr32,
            ValueType::I64 | ValueType::F64 => Opcode::LdrD,
        },
        NodeKind::Store => match vt {
            ValueType::I32 | ValueType::F32 => Opcode::Str32,
            ValueType::I64 | ValueType::F64 => Opcode::StrD,
        },
        NodeKind::Ret => Opcode::Ret,
        _ => return None,
    };
    Some(opcode)
}
