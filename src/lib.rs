//! Epiphany code-generation backend.
//!
//! This crate lowers a legalized, architecture-neutral computation graph for one
//! function into Adapteva Epiphany machine instructions, and produces the
//! function's prologue/epilogue including callee-saved register preservation and
//! stack-pointer maintenance. It is one target backend inside a retargetable
//! compiler; scheduling, register allocation and the generic pass pipeline live
//! in the hosting framework and only call into the hooks defined here.
//!
//! # Primary Usage
//!
//! ```ignore
//! use epiphany_backend::core::CompilationSession;
//! use epiphany_backend::epiphany::{EpiphanyTargetMachine, EpiphanyDagToDagISel};
//! use bumpalo::Bump;
//!
//! // Target description is built once and shared read-only.
//! let tm = EpiphanyTargetMachine::new(Default::default());
//!
//! // Per-function state lives in an arena-backed session.
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let mut isel = EpiphanyDagToDagISel::new(&session, &tm);
//! isel.run(&mut dag)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Shared infrastructure (session, selection DAG, machine IR, errors)
//! - [`epiphany`] - Epiphany specific code (selector, frame lowering, registers)

pub mod core;
pub mod epiphany;

// Re-export common types from organized modules
pub use crate::core::{
    // Session management
    CompilationSession, SessionStats,
    // Selection DAG
    SelectionDag, Node, NodeId, NodeKind, ValueType,
    // Machine IR
    MachineFunction, MachineBasicBlock, MachineInst, MachineOperand,
    // Error handling
    CodegenError, CodegenResult,
};
pub use crate::epiphany::{
    EpiphanyTargetMachine, EpiphanyDagToDagISel, EpiphanyFrameLowering,
    EpiphanyInstrInfo, Opcode,
};
