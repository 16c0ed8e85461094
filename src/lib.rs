// A single-pass bytecode compiler and stack-based virtual machine for a
// dynamically-typed, class-based scripting language, per spec.md §1.
//
// Module layout mirrors the pipeline a source string travels through:
// `scanner` tokenizes, `compiler` emits bytecode into a `chunk`, `vm`
// executes it against a `heap` of garbage-collected `object`s, with
// `table` as the shared hash-table primitive and `gc` as the collector
// `vm` drives.

pub mod chunk;
pub mod compiler;
pub mod disassembler;
pub mod error;
pub mod gc;
pub mod heap;
pub mod native;
pub mod object;
pub mod scanner;
pub mod table;
#[macro_use]
pub mod util;
pub mod value;
pub mod vm;

pub use error::{CompileError, InterpretResult, RuntimeError};
pub use vm::VM;

/// Runs one source string to completion in a fresh VM. Handy for tests
/// and one-shot callers; a REPL should keep its own long-lived `VM` so
/// globals and classes persist across lines.
pub fn interpret(source: &str) -> InterpretResult {
    let mut vm = VM::new();
    vm.interpret(source)
}
