// This module holds the once-per-compilation Epiphany target description:
// the data layout string, the subtarget feature toggles, and the shared
// instruction-info and frame-lowering instances. The description is built once
// before any function is processed and afterwards only read; independent
// per-function pipelines may borrow it concurrently without synchronization.
// Target registration, command-line plumbing and pass scheduling are the
// hosting framework's concern and intentionally absent here.

//! Epiphany target machine description.

use crate::epiphany::frame::EpiphanyFrameLowering;
use crate::epiphany::instr_info::EpiphanyInstrInfo;

/// Code model; only small is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeModel {
    #[default]
    Small,
}

/// Subtarget feature toggles.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetOptions {
    /// Enable double loads and stores in the optimizer (off by default).
    pub enable_double_ls: bool,
    pub code_model: CodeModel,
}

fn compute_data_layout() -> &'static str {
    "e-p:32:32-i8:8:8-i16:16:16-i32:32:32-f32:32:32-i64:64:64-f64:64:64-s64:64:64-S64:64:64-a0:32:32"
}

/// Read-only target description shared by every per-function pipeline.
#[derive(Debug, Clone, Copy)]
pub struct EpiphanyTargetMachine {
    options: TargetOptions,
    instr_info: EpiphanyInstrInfo,
    frame_lowering: EpiphanyFrameLowering,
}

impl EpiphanyTargetMachine {
    pub fn new(options: TargetOptions) -> Self {
        Self {
            options,
            instr_info: EpiphanyInstrInfo::new(),
            frame_lowering: EpiphanyFrameLowering::new(),
        }
    }

    pub fn data_layout(&self) -> &'static str {
        compute_data_layout()
    }

    pub fn options(&self) -> &TargetOptions {
        &self.options
    }

    pub fn instr_info(&self) -> &EpiphanyInstrInfo {
        &self.instr_info
    }

    pub fn frame_lowering(&self) -> &EpiphanyFrameLowering {
        &self.frame_lowering
    }

    pub fn code_model_small(&self) -> bool {
        self.options.code_model == CodeModel::Small
    }
}

impl Default for EpiphanyTargetMachine {
    fn default() -> Self {
        Self::new(TargetOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_layout_is_32_bit_little_endian() {
        let tm = EpiphanyTargetMachine::default();
        assert!(tm.data_layout().starts_with("e-p:32:32"));
    }

    #[test]
    fn test_description_is_shareable_across_pipelines() {
        // The description is Copy + Sync: two pipelines may hold it at once.
        fn assert_sync<T: Sync>(_: &T) {}
        let tm = EpiphanyTargetMachine::default();
        assert_sync(&tm);

        let a = &tm;
        let b = &tm;
        assert_eq!(a.data_layout(), b.data_layout());
    }

    #[test]
    fn test_default_options() {
        let tm = EpiphanyTargetMachine::default();
        assert!(!tm.options().enable_double_ls);
        assert!(tm.code_model_small());
    }
}
