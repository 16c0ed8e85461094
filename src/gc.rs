// Tri-color mark-sweep primitives, per spec.md §4.7. `VM::collect_garbage`
// (in `vm.rs`) owns the root set and orchestrates the phases; this module
// holds the reusable "mark a value/object, blacken an object's children"
// mechanics so they don't get tangled up with VM bookkeeping.

use crate::heap::{Heap, ObjRef};
use crate::object::Obj;
use crate::table::Table;
use crate::value::Value;

/// Marks `r` and, if this is the first time, pushes it onto the gray
/// worklist so its children get blackened later.
pub fn mark_ref(r: ObjRef, heap: &mut Heap, gray: &mut Vec<ObjRef>) {
    if heap.mark(r) {
        gray.push(r);
    }
}

pub fn mark_value(v: Value, heap: &mut Heap, gray: &mut Vec<ObjRef>) {
    if let Value::Obj(r) = v {
        mark_ref(r, heap, gray);
    }
}

/// Marks every key and value a table holds. Keys matter too: a class's
/// method table or an instance's field table holds interned strings as
/// keys, and those must stay reachable or the intern-table sweep (which
/// only looks at its *own* roots) would otherwise let them be collected
/// out from under the table that still names them.
pub fn mark_table(table: &Table, heap: &mut Heap, gray: &mut Vec<ObjRef>) {
    let entries: Vec<(ObjRef, Value)> = table.iter().collect();
    for (k, v) in entries {
        mark_ref(k, heap, gray);
        mark_value(v, heap, gray);
    }
}

/// Marks the direct children of the object at `r`. The object's own data
/// is read out into owned locals first so the subsequent marking calls
/// can borrow `heap` mutably.
pub fn blacken(r: ObjRef, heap: &mut Heap, gray: &mut Vec<ObjRef>) {
    let mut child_refs: Vec<ObjRef> = Vec::new();
    let mut child_vals: Vec<Value> = Vec::new();

    match heap.get(r) {
        Obj::Function(f) => {
            if let Some(name) = f.name {
                child_refs.push(name);
            }
            child_vals.extend(f.chunk.constants.iter().copied());
        }
        Obj::Closure(c) => {
            child_refs.push(c.function);
            child_refs.extend(c.upvalues.iter().copied());
        }
        Obj::Upvalue(u) => {
            child_vals.push(u.closed);
        }
        Obj::Class(cl) => {
            child_refs.push(cl.name);
            for (k, v) in cl.methods.iter() {
                child_refs.push(k);
                child_vals.push(v);
            }
        }
        Obj::Instance(inst) => {
            child_refs.push(inst.class);
            for (k, v) in inst.fields.iter() {
                child_refs.push(k);
                child_vals.push(v);
            }
        }
        Obj::BoundMethod(b) => {
            child_refs.push(b.method);
            child_vals.push(b.receiver);
        }
        Obj::String(_) | Obj::Native(_) => {}
    }

    for rr in child_refs {
        mark_ref(rr, heap, gray);
    }
    for v in child_vals {
        mark_value(v, heap, gray);
    }
}
