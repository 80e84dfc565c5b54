// This module serves as the central hub for the backend's target-independent
// infrastructure, providing the building blocks the Epiphany-specific code operates
// on. It exports and organizes the key subsystems: session management (arena-based
// memory allocation and lowering statistics), the selection DAG (arena-allocated
// computation graph nodes with index-based use edges and explicit replacement),
// the machine IR (target instructions, basic blocks, frame objects and callee-saved
// bookkeeping), and error handling (fatal lowering diagnostics via thiserror).
// Everything here is single-threaded per function; the only state shared between
// function pipelines is the read-only target description owned by the caller.

//! Core backend infrastructure.
//!
//! This module provides the fundamental building blocks the instruction selector
//! and frame lowering operate on. All per-function data is allocated in a
//! `bumpalo` arena owned by the caller and threaded through
//! [`CompilationSession`]; nothing here holds state across functions.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based memory allocation using `bumpalo`
//! - Lowering statistics and per-function bookkeeping
//!
//! ## Selection DAG (`dag`)
//! - Arena-allocated computation graph nodes
//! - Use edges represented as node indices
//! - Replacement implemented by redirecting incoming edges
//!
//! ## Machine IR (`mir`)
//! - Target instructions with def/kill-flagged register operands
//! - Basic blocks, frame objects and callee-saved info
//!
//! ## Error Handling (`error`)
//! - Fatal, non-recoverable lowering diagnostics

pub mod session;
pub mod dag;
pub mod mir;
pub mod error;

// Re-export core components
pub use session::{CompilationSession, SessionStats};

pub use dag::{SelectionDag, Node, NodeId, NodeKind, ValueType, INVALID_NODE};

pub use mir::{
    MachineFunction, MachineBasicBlock, MachineInst, MachineOperand,
    MiFlag, RefKind, FrameInfo, FrameObject, CalleeSavedInfo,
};

pub use error::{CodegenError, CodegenResult};
