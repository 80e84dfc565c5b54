// This module provides arena-based compilation session management using the bumpalo
// crate to simplify lifetime management in the backend. CompilationSession owns the
// reference to the arena allocator and tracks per-function lowering state with a
// unified lifetime: selection statistics (nodes visited, constants materialized,
// per-opcode machine instruction counts), interned strings for symbol-like operands,
// and the name of the function currently being lowered. All graph and instruction
// storage is allocated in the arena and shares the session lifetime, eliminating
// complex lifetime annotations. One session serves exactly one function pipeline at
// a time; independent pipelines may each own a session without synchronization.

//! Arena-based compilation session management.
//!
//! All per-function lowering objects are tied to the session lifetime. The
//! session is also where lowering statistics accumulate, which the hosting
//! framework may read after each function for diagnostics.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena-based compilation session.
///
/// Holds the arena every selection DAG node and operand list is allocated in,
/// plus bookkeeping for the function currently being lowered. The session holds
/// no state across functions except through [`CompilationSession::reset`].
pub struct CompilationSession<'arena> {
    /// Arena allocator for lowering objects.
    arena: &'arena Bump,

    /// Lowering statistics for debugging and tuning.
    stats: RefCell<SessionStats>,

    /// String interning for symbol-like operands.
    interned_strings: RefCell<HashMap<String, &'arena str>>,

    /// Current function being lowered.
    current_function: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            current_function: RefCell::new(None),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate an object in the session arena.
    pub fn alloc<T>(&self, value: T) -> &'arena mut T {
        self.arena.alloc(value)
    }

    /// Allocate a slice in the session arena.
    pub fn alloc_slice<T>(&self, slice: &[T]) -> &'arena [T]
    where
        T: Clone,
    {
        self.arena.alloc_slice_clone(slice)
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Set current function being lowered.
    pub fn set_current_function(&self, name: &str) {
        *self.current_function.borrow_mut() = Some(name.to_string());
    }

    /// Name of the function currently being lowered, if any.
    pub fn current_function(&self) -> Option<String> {
        self.current_function.borrow().clone()
    }

    /// Clear per-function state between lowering runs.
    pub fn reset(&self) {
        *self.current_function.borrow_mut() = None;
    }

    /// Record that a graph node was visited by the selector.
    pub fn record_node_selected(&self, opcode: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.nodes_selected += 1;
        *stats
            .machine_opcode_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }

    /// Record a constant materialized into a register sequence.
    pub fn record_constant_materialized(&self, insts: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.constants_materialized += 1;
        stats.materialization_insts += insts;
    }

    /// Record a finished frame lowering (prologue plus epilogues).
    pub fn record_frame_lowered(&self, frame_size: u64) {
        let mut stats = self.stats.borrow_mut();
        stats.frames_lowered += 1;
        if stats.largest_frame_size < frame_size {
            stats.largest_frame_size = frame_size;
        }
    }

    /// Record a callee-save paired store/load.
    pub fn record_pair_emitted(&self) {
        self.stats.borrow_mut().callee_save_pairs += 1;
    }

    /// Record a callee-save single store/load.
    pub fn record_single_emitted(&self) {
        self.stats.borrow_mut().callee_save_singles += 1;
    }

    /// Get lowering statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Lowering statistics for one session.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Graph nodes rewritten by the selector.
    pub nodes_selected: usize,

    /// Count of each machine opcode produced.
    pub machine_opcode_counts: HashMap<String, usize>,

    /// Constants materialized via move-immediate sequences.
    pub constants_materialized: usize,

    /// Total instructions spent on materialization.
    pub materialization_insts: usize,

    /// Functions whose frame was lowered.
    pub frames_lowered: usize,

    /// Largest frame seen (bytes).
    pub largest_frame_size: u64,

    /// Callee-save paired memory operations emitted.
    pub callee_save_pairs: usize,

    /// Callee-save single memory operations emitted.
    pub callee_save_singles: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Lowering Session Statistics:")?;
        writeln!(f, "  Nodes selected: {}", self.nodes_selected)?;
        writeln!(f, "  Constants materialized: {}", self.constants_materialized)?;
        writeln!(
            f,
            "  Materialization instructions: {}",
            self.materialization_insts
        )?;
        writeln!(f, "  Frames lowered: {}", self.frames_lowered)?;
        writeln!(f, "  Largest frame: {} bytes", self.largest_frame_size)?;
        writeln!(f, "  Callee-save pairs: {}", self.callee_save_pairs)?;
        writeln!(f, "  Callee-save singles: {}", self.callee_save_singles)?;

        if !self.machine_opcode_counts.is_empty() {
            writeln!(f, "  Machine opcode breakdown:")?;
            let mut sorted: Vec<_> = self.machine_opcode_counts.iter().collect();
            sorted.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.nodes_selected, 0);
        assert_eq!(stats.constants_materialized, 0);
        assert_eq!(stats.frames_lowered, 0);
    }

    #[test]
    fn test_arena_allocation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let value = session.alloc(42);
        assert_eq!(*value, 42);

        let slice = session.alloc_slice(&[1, 2, 3, 4]);
        assert_eq!(slice, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let s1 = session.intern_str(".LCPI0_0");
        let s2 = session.intern_str(".LCPI0_0");
        let s3 = session.intern_str(".LCPI0_1");

        assert_eq!(s1.as_ptr(), s2.as_ptr()); // Same string interned
        assert_ne!(s1.as_ptr(), s3.as_ptr()); // Different strings
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_node_selected("AddRr");
        session.record_node_selected("MovRi");
        session.record_node_selected("AddRr");
        session.record_constant_materialized(2);
        session.record_frame_lowered(128);
        session.record_pair_emitted();
        session.record_single_emitted();

        let stats = session.stats();
        assert_eq!(stats.nodes_selected, 3);
        assert_eq!(stats.machine_opcode_counts["AddRr"], 2);
        assert_eq!(stats.machine_opcode_counts["MovRi"], 1);
        assert_eq!(stats.constants_materialized, 1);
        assert_eq!(stats.materialization_insts, 2);
        assert_eq!(stats.frames_lowered, 1);
        assert_eq!(stats.largest_frame_size, 128);
        assert_eq!(stats.callee_save_pairs, 1);
        assert_eq!(stats.callee_save_singles, 1);
    }

    #[test]
    fn test_statistics_display() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_node_selected("MovRi");
        session.record_frame_lowered(64);

        let output = format!("{}", session.stats());
        assert!(output.contains("Nodes selected: 1"));
        assert!(output.contains("Frames lowered: 1"));
        assert!(output.contains("MovRi: 1"));
    }

    #[test]
    fn test_current_function_tracking() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        assert_eq!(session.current_function(), None);
        session.set_current_function("main");
        assert_eq!(session.current_function().as_deref(), Some("main"));
        session.reset();
        assert_eq!(session.current_function(), None);
    }
}
