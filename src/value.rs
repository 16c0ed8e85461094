// Dynamically-typed value cell: nil, bool, number, or a handle into the
// heap. This is representation (a) from spec.md §3 — a discriminated
// tagged union — rather than NaN-boxing; see DESIGN.md for why.
//
// Generalizes the teacher's own `Value` enum (`vm.rs`) from its fixed
// Bool/Int/Float/Str/List/Map/Addr set to nil/bool/number/object, and its
// `operator!` macro-generated arithmetic to the arithmetic this language's
// opcode set actually needs (§4.5/§4.6).

use crate::heap::{Heap, ObjRef};
use crate::object::Obj;

#[derive(Debug, Clone, Copy)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Obj(ObjRef),
}

impl Value {
    /// Exactly `nil` and `false` are falsy (spec.md §4.6, §8).
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(*r),
            _ => None,
        }
    }

    pub fn is_string(&self, heap: &Heap) -> bool {
        match self {
            Value::Obj(r) => matches!(heap.get(*r), Obj::String(_)),
            _ => false,
        }
    }

    /// `==`: strict type match; objects compare by identity (their
    /// `ObjRef`), which is correct for strings because of interning, and
    /// is simply the language's semantics for every other object kind
    /// (functions, classes, instances are never structurally equal).
    pub fn values_equal(a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::Obj(x), Value::Obj(y)) => x == y,
            _ => false,
        }
    }

    pub fn type_name(&self, heap: &Heap) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Obj(r) => heap.get(*r).type_name(),
        }
    }

    /// User-facing `print`/`to_string` rendering. Requires the heap to
    /// resolve object contents (string bytes, function/class names).
    pub fn format(&self, heap: &Heap) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Obj(r) => heap.get(*r).format(heap),
        }
    }
}

/// Numbers print without a trailing `.0` for integral values, matching
/// the conventional clox-family `printf("%g", ...)` behavior.
pub fn format_number(n: f64) -> String {
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n.is_nan() {
        return "nan".to_string();
    }
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
