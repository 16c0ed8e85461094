// Heap object kinds, per spec.md §3: string, function, closure, upvalue,
// class, instance, bound method, native. Each variant owns exactly what
// spec.md's lifecycle rules say it owns (a function owns its chunk; a
// closure shares its function and upvalues; an upvalue, once closed, owns
// its captured value).
//
// Generalizes the teacher's closed `Value::{Str,List,Map}` object set
// (`vm.rs`) to the full class-and-closure object graph this language
// needs.

use crate::chunk::Chunk;
use crate::error::RuntimeError;
use crate::heap::{Heap, ObjRef};
use crate::table::Table;
use crate::value::Value;

pub struct ObjString {
    pub chars: String,
    pub hash: u32,
}

/// FNV-1a, per spec.md §3.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

pub struct ObjFunction {
    pub arity: u8,
    pub upvalue_count: u8,
    /// `None` for the implicit top-level script function.
    pub name: Option<ObjRef>,
    pub chunk: Chunk,
}

impl ObjFunction {
    pub fn new() -> ObjFunction {
        ObjFunction {
            arity: 0,
            upvalue_count: 0,
            name: None,
            chunk: Chunk::new(),
        }
    }
}

#[derive(Clone, Copy)]
pub enum UpvalueState {
    /// Points at a live slot on the VM value stack.
    Open(usize),
    /// The variable's scope has ended; the value now lives inline.
    Closed,
}

pub struct ObjUpvalue {
    pub state: UpvalueState,
    pub closed: Value,
}

pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

pub struct ObjClass {
    pub name: ObjRef,
    pub methods: Table,
}

impl ObjClass {
    pub fn new(name: ObjRef) -> ObjClass {
        ObjClass {
            name,
            methods: Table::new(),
        }
    }
}

pub struct ObjInstance {
    pub class: ObjRef,
    pub fields: Table,
}

impl ObjInstance {
    pub fn new(class: ObjRef) -> ObjInstance {
        ObjInstance {
            class,
            fields: Table::new(),
        }
    }
}

pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}

pub type NativeFn = fn(&[Value]) -> Result<Value, RuntimeError>;

pub struct ObjNative {
    pub name: &'static str,
    pub function: NativeFn,
}

pub enum Obj {
    String(ObjString),
    Function(ObjFunction),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
    Native(ObjNative),
}

impl Obj {
    pub fn type_name(&self) -> &'static str {
        match self {
            Obj::String(_) => "string",
            Obj::Function(_) => "function",
            Obj::Closure(_) => "closure",
            Obj::Upvalue(_) => "upvalue",
            Obj::Class(_) => "class",
            Obj::Instance(_) => "instance",
            Obj::BoundMethod(_) => "bound method",
            Obj::Native(_) => "native function",
        }
    }

    fn fn_name(heap: &Heap, name: Option<ObjRef>) -> String {
        match name {
            Some(r) => match heap.get(r) {
                Obj::String(s) => s.chars.clone(),
                _ => "?".to_string(),
            },
            None => "<script>".to_string(),
        }
    }

    pub fn format(&self, heap: &Heap) -> String {
        match self {
            Obj::String(s) => s.chars.clone(),
            Obj::Function(f) => format!("<fn {}>", Self::fn_name(heap, f.name)),
            Obj::Closure(c) => match heap.get(c.function) {
                Obj::Function(f) => format!("<fn {}>", Self::fn_name(heap, f.name)),
                _ => unreachable!("closure must wrap a function"),
            },
            Obj::Upvalue(_) => "<upvalue>".to_string(),
            Obj::Class(c) => match heap.get(c.name) {
                Obj::String(s) => s.chars.clone(),
                _ => unreachable!("class name must be a string"),
            },
            Obj::Instance(i) => match heap.get(i.class) {
                Obj::Class(c) => match heap.get(c.name) {
                    Obj::String(s) => format!("{} instance", s.chars),
                    _ => unreachable!("class name must be a string"),
                },
                _ => unreachable!("instance must reference a class"),
            },
            Obj::BoundMethod(b) => match heap.get(b.method) {
                Obj::Closure(c) => match heap.get(c.function) {
                    Obj::Function(f) => format!("<fn {}>", Self::fn_name(heap, f.name)),
                    _ => unreachable!("closure must wrap a function"),
                },
                _ => unreachable!("bound method must wrap a closure"),
            },
            Obj::Native(n) => format!("<native fn {}>", n.name),
        }
    }
}
