// Built-in native functions, per spec.md §6: a single `clock()` returning
// seconds-since-process-start.
//
// Grounded in the teacher's `clock.rs::Clock` (an `Instant`-based seconds
// counter), generalized from a struct a renderer polls each frame into a
// `NativeFn` the VM can call through `OP_CALL` like any other callable.

use crate::error::RuntimeError;
use crate::object::NativeFn;
use crate::value::Value;
use crate::vm::VM;
use std::time::Instant;

lazy_static::lazy_static! {
    static ref PROCESS_START: Instant = Instant::now();
}

/// Registers a native under `name` in the VM's globals, the way
/// `VM::new` wires up every built-in.
pub fn install(vm: &mut VM, name: &str, function: NativeFn) {
    vm.define_native(name, function);
}

pub fn clock(_args: &[Value]) -> Result<Value, RuntimeError> {
    let elapsed = PROCESS_START.elapsed();
    Ok(Value::Number(
        elapsed.as_secs() as f64 + elapsed.subsec_nanos() as f64 / 1e9,
    ))
}
