// Error types for the two failure modes the interpreter can report:
// compile-time diagnostics and runtime faults. Both are plain enums with
// hand-written `Display`, in the teacher's own style (`vm::Error` in
// `vm.rs` is matched directly by tests, never wrapped in a derive-macro
// error type).

use std::fmt;

/// A single compile-time diagnostic, already formatted the way §6 of the
/// spec requires: `"[line N] Error at '<lexeme>': <msg>"` or the `at end` /
/// synthetic-error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError(pub String);

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CompileError {}

/// A runtime fault. `message` is the primary line; `trace` holds the
/// already-formatted backtrace lines (innermost frame first), printed
/// immediately after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub message: String,
    pub trace: Vec<String>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> RuntimeError {
        RuntimeError {
            message: message.into(),
            trace: Vec::new(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        for line in &self.trace {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// Overall outcome of `interpret()`, per spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

impl InterpretResult {
    /// sysexits(3)-style process exit code, per spec.md §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            InterpretResult::Ok => 0,
            InterpretResult::CompileError => 65,
            InterpretResult::RuntimeError => 70,
        }
    }
}
