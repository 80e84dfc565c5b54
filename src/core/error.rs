// This module defines error types for the Epiphany backend using the thiserror crate
// for idiomatic Rust error handling. CodegenError is the main error enum covering the
// fatal lowering failures: constant materialization with a destination width other
// than the single supported machine word, oversized constant bit patterns, the
// retained-but-unreachable literal pool fallback being reached, frame offsets that
// the addressing mode cannot represent, and generic pattern table misses. Each
// variant carries relevant context (operation names, widths, raw bit patterns,
// offsets) for diagnostics. The module also provides CodegenResult<T> as a
// convenience alias. There is no retry or partial-result semantics: propagating one
// of these errors aborts compilation of the current function.

//! Error types for the Epiphany backend.
//!
//! Using thiserror for more idiomatic error handling. Every variant is fatal:
//! a function is either fully and correctly lowered, or its compilation stops.

use thiserror::Error;

/// Main error type for Epiphany lowering.
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("Unsupported {width}-bit destination for {operation}; only 32-bit is supported")]
    UnsupportedWidth {
        operation: &'static str,
        width: u32,
    },

    #[error("Constant bit pattern {bits:#x} does not fit the 32-bit machine word")]
    OversizedConstant {
        bits: u64,
    },

    #[error("Unreachable fallback path reached: {context}")]
    UnreachableFallback {
        context: &'static str,
    },

    #[error("No pattern for generic node {kind}")]
    NoPattern {
        kind: &'static str,
    },

    #[error("Frame offset {offset} for slot {frame_index} not representable by {opcode}")]
    FrameOffsetOutOfRange {
        opcode: &'static str,
        frame_index: i32,
        offset: i64,
    },

    #[error("Frame lowering failed: {reason}")]
    FrameLowering {
        reason: String,
    },
}

/// Result type alias for lowering operations.
pub type CodegenResult<T> = Result<T, CodegenError>;
