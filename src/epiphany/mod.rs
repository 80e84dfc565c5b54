// This module tree holds everything Epiphany-specific: the register and
// register-class metadata, instruction descriptors with their addressing
// constraints, the hand-maintained stand-in for the generated pattern table, the
// DAG-to-DAG instruction selector with its immediate materializer, the frame
// lowering (layout planning, SP-adjustment splitting, callee-save spill/restore
// pairing, frame-index resolution), and the once-per-compilation target machine
// description shared read-only across function pipelines.

//! Epiphany target implementation.
//!
//! # Key Components
//!
//! - `regs` - register identities, classes and the callee-saved order
//! - `instr_info` - opcodes, addressing constraints, load/store method tables
//! - `patterns` - default selection table for generic operations
//! - `isel` - instruction selector and immediate materializer
//! - `frame` - frame layout, prologue/epilogue and callee-save emission
//! - `target` - read-only target machine description

pub mod regs;
pub mod instr_info;
pub mod patterns;
pub mod isel;
pub mod frame;
pub mod target;

pub use regs::{Reg, RegClass};
pub use instr_info::{AddressingConstraint, EpiphanyInstrInfo, LoadStoreMethod, Opcode};
pub use isel::EpiphanyDagToDagISel;
pub use frame::{EpiphanyFrameLowering, FrameLayout};
pub use target::{EpiphanyTargetMachine, TargetOptions};
