// Stack-based virtual machine: dispatch loop, value stack, call-frame
// stack, upvalue list, and the allocator/GC entry points every other
// module goes through to put something on the heap, per spec.md §4.6.
//
// Grounded in the teacher's `vm::VM` (`vm.rs`): same overall shape (a
// `run()` dispatch loop over an opcode enum, a `trace!`-gated per-step
// printer, sysexits-flavored error reporting), generalized from its flat
// value stack with no call frames to the full call-frame/closure/class
// machinery this language needs.

use crate::chunk::{combine_u16, OpCode};
use crate::compiler;
use crate::error::{InterpretResult, RuntimeError};
use crate::gc;
use crate::heap::{Heap, ObjRef};
use crate::native;
use crate::object::{
    fnv1a, NativeFn, Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjInstance, ObjNative, ObjString,
    ObjUpvalue, UpvalueState,
};
use crate::table::Table;
use crate::value::Value;
use crate::{trace, trace_gc};

pub const FRAMES_MAX: usize = 64;
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// Per-call activation record: the closure executing, an instruction
/// pointer into its function's chunk, and the stack index at which this
/// call's local-variable window begins (spec.md §4.6).
pub struct CallFrame {
    pub closure: ObjRef,
    pub ip: usize,
    pub slots: usize,
}

pub struct VM {
    pub heap: Heap,
    pub stack: Vec<Value>,
    pub frames: Vec<CallFrame>,
    pub globals: Table,
    pub strings: Table,
    /// Sorted by descending stack index, per spec.md invariant 3.
    pub open_upvalues: Vec<ObjRef>,
    pub init_string: ObjRef,
    /// In-progress functions belonging to the active chain of compiler
    /// contexts — a GC root while compilation is underway (spec.md §4.7).
    pub compiler_roots: Vec<ObjRef>,
    next_gc: usize,
    pub stress_gc: bool,
    pub trace_exec: bool,
    pub trace_gc: bool,
    pub disassemble: bool,
}

impl VM {
    pub fn new() -> VM {
        let mut heap = Heap::new();
        let mut strings = Table::new();
        let init_hash = fnv1a(b"init");
        let init_string = heap.alloc(Obj::String(ObjString {
            chars: "init".to_string(),
            hash: init_hash,
        }));
        strings.set(&heap, init_string, Value::Nil);

        let mut vm = VM {
            heap,
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            strings,
            open_upvalues: Vec::new(),
            init_string,
            compiler_roots: Vec::new(),
            next_gc: 1024 * 1024,
            stress_gc: false,
            trace_exec: false,
            trace_gc: false,
            disassemble: false,
        };
        native::install(&mut vm, "clock", native::clock);
        vm
    }

    pub fn set_stress_gc(&mut self, on: bool) {
        self.stress_gc = on;
    }

    pub fn set_trace_exec(&mut self, on: bool) {
        self.trace_exec = on;
    }

    pub fn set_trace_gc(&mut self, on: bool) {
        self.trace_gc = on;
    }

    pub fn set_disassemble(&mut self, on: bool) {
        self.disassemble = on;
    }

    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        let name_ref = self.intern_string(name);
        let leaked: &'static str = Box::leak(name.to_string().into_boxed_str());
        let native_ref = self.alloc(Obj::Native(ObjNative { name: leaked, function }));
        self.globals.set(&self.heap, name_ref, Value::Obj(native_ref));
    }

    /// Compiles and runs one source unit against this VM's persistent
    /// state (globals, intern table, heap survive across calls — what
    /// the REPL relies on).
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let function_ref = match compiler::compile(source, self) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("{}", e);
                return InterpretResult::CompileError;
            }
        };

        if self.disassemble {
            if let Obj::Function(f) = self.heap.get(function_ref) {
                crate::disassembler::disassemble_chunk(&f.chunk, &self.heap, "<script>");
            }
        }

        self.stack.push(Value::Obj(function_ref));
        let closure_ref = self.alloc(Obj::Closure(ObjClosure {
            function: function_ref,
            upvalues: Vec::new(),
        }));
        self.stack.pop();
        self.stack.push(Value::Obj(closure_ref));

        if self.call_closure(closure_ref, 0).is_err() {
            self.stack.clear();
            self.frames.clear();
            return InterpretResult::RuntimeError;
        }

        match self.run() {
            Ok(()) => InterpretResult::Ok,
            Err(e) => {
                eprint!("{}", e);
                InterpretResult::RuntimeError
            }
        }
    }

    // ---- allocation -----------------------------------------------------

    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        if self.stress_gc || self.heap.bytes_allocated >= self.next_gc {
            self.collect_garbage();
        }
        self.heap.alloc(obj)
    }

    /// Interns `s`, pushing the newly-allocated string onto the stack
    /// around the table insertion so the GC sees it as a root mid-alloc
    /// (spec.md §4.1/§4.7's push/pop pattern).
    pub fn intern_string(&mut self, s: &str) -> ObjRef {
        let hash = fnv1a(s.as_bytes());
        if let Some(r) = self.strings.find_string(&self.heap, s, hash) {
            return r;
        }
        let r = self.alloc(Obj::String(ObjString {
            chars: s.to_string(),
            hash,
        }));
        self.stack.push(Value::Obj(r));
        self.strings.set(&self.heap, r, Value::Nil);
        self.stack.pop();
        r
    }

    fn collect_garbage(&mut self) {
        trace_gc!(self.trace_gc, "-- gc begin");
        let mut gray: Vec<ObjRef> = Vec::new();

        for v in self.stack.clone() {
            gc::mark_value(v, &mut self.heap, &mut gray);
        }
        for i in 0..self.frames.len() {
            gc::mark_ref(self.frames[i].closure, &mut self.heap, &mut gray);
        }
        gc::mark_table(&self.globals, &mut self.heap, &mut gray);
        for i in 0..self.open_upvalues.len() {
            gc::mark_ref(self.open_upvalues[i], &mut self.heap, &mut gray);
        }
        gc::mark_ref(self.init_string, &mut self.heap, &mut gray);
        for i in 0..self.compiler_roots.len() {
            gc::mark_ref(self.compiler_roots[i], &mut self.heap, &mut gray);
        }

        while let Some(r) = gray.pop() {
            gc::blacken(r, &mut self.heap, &mut gray);
        }

        self.strings.remove_unmarked(&self.heap);
        self.heap.sweep();
        self.next_gc = (self.heap.bytes_allocated * 2).max(1024 * 1024);
        trace_gc!(self.trace_gc, "-- gc end");
    }

    // ---- stack helpers ---------------------------------------------------

    fn pop(&mut self) -> Value {
        self.stack
            .pop()
            .expect("value stack underflow: compiler emitted unbalanced bytecode")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn string_contents(&self, r: ObjRef) -> String {
        match self.heap.get(r) {
            Obj::String(s) => s.chars.clone(),
            other => unreachable!("expected a string object, got {}", other.type_name()),
        }
    }

    // ---- bytecode readers -------------------------------------------------

    fn frame_function(&self, frame_index: usize) -> ObjRef {
        match self.heap.get(self.frames[frame_index].closure) {
            Obj::Closure(c) => c.function,
            _ => unreachable!("call frame closure must be a closure object"),
        }
    }

    fn read_byte(&mut self) -> u8 {
        let idx = self.frames.len() - 1;
        let function_ref = self.frame_function(idx);
        let ip = self.frames[idx].ip;
        self.frames[idx].ip += 1;
        match self.heap.get(function_ref) {
            Obj::Function(f) => f.chunk.code[ip],
            _ => unreachable!(),
        }
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        combine_u16(hi, lo)
    }

    fn read_constant(&mut self) -> Value {
        let idx = self.read_byte() as usize;
        let frame_idx = self.frames.len() - 1;
        let function_ref = self.frame_function(frame_idx);
        match self.heap.get(function_ref) {
            Obj::Function(f) => f.chunk.constants[idx],
            _ => unreachable!(),
        }
    }

    fn read_constant_obj_ref(&mut self) -> ObjRef {
        self.read_constant()
            .as_obj()
            .expect("constant must be an object reference")
    }

    // ---- calls -------------------------------------------------------------

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), RuntimeError> {
        if let Value::Obj(r) = callee {
            match self.heap.get(r) {
                Obj::Closure(_) => return self.call_closure(r, arg_count),
                Obj::Native(_) => return self.call_native(r, arg_count),
                Obj::Class(_) => return self.call_class(r, arg_count),
                Obj::BoundMethod(_) => return self.call_bound_method(r, arg_count),
                _ => {}
            }
        }
        Err(self.runtime_error("Can only call functions and classes."))
    }

    fn call_closure(&mut self, closure_ref: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let function_ref = match self.heap.get(closure_ref) {
            Obj::Closure(c) => c.function,
            _ => unreachable!(),
        };
        let arity = match self.heap.get(function_ref) {
            Obj::Function(f) => f.arity,
            _ => unreachable!(),
        };
        if arg_count != arity {
            return Err(self.runtime_error(format!(
                "Expected {} arguments but got {}.",
                arity, arg_count
            )));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }
        let slots = self.stack.len() - arg_count as usize - 1;
        self.frames.push(CallFrame {
            closure: closure_ref,
            ip: 0,
            slots,
        });
        Ok(())
    }

    fn call_native(&mut self, native_ref: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let function = match self.heap.get(native_ref) {
            Obj::Native(n) => n.function,
            _ => unreachable!(),
        };
        let arg_start = self.stack.len() - arg_count as usize;
        let result = function(&self.stack[arg_start..])?;
        self.stack.truncate(arg_start - 1);
        self.stack.push(result);
        Ok(())
    }

    fn call_class(&mut self, class_ref: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let instance_ref = self.alloc(Obj::Instance(ObjInstance::new(class_ref)));
        let callee_slot = self.stack.len() - arg_count as usize - 1;
        self.stack[callee_slot] = Value::Obj(instance_ref);

        let init_hash = Table::hash_of(&self.heap, self.init_string);
        let init = match self.heap.get(class_ref) {
            Obj::Class(c) => c.methods.get_with_hash(self.init_string, init_hash),
            _ => unreachable!(),
        };
        match init {
            Some(Value::Obj(method_ref)) => self.call_closure(method_ref, arg_count),
            Some(_) => unreachable!("init must be bound to a closure"),
            None => {
                if arg_count != 0 {
                    return Err(self.runtime_error(format!(
                        "Expected 0 arguments but got {}.",
                        arg_count
                    )));
                }
                Ok(())
            }
        }
    }

    fn call_bound_method(&mut self, bound_ref: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let (receiver, method_ref) = match self.heap.get(bound_ref) {
            Obj::BoundMethod(b) => (b.receiver, b.method),
            _ => unreachable!(),
        };
        let callee_slot = self.stack.len() - arg_count as usize - 1;
        self.stack[callee_slot] = receiver;
        self.call_closure(method_ref, arg_count)
    }

    fn invoke(&mut self, name_ref: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let receiver = self.peek(arg_count as usize);
        let instance_ref = match receiver {
            Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
            _ => return Err(self.runtime_error("Only instances have methods.")),
        };

        let hash = Table::hash_of(&self.heap, name_ref);
        let field = match self.heap.get(instance_ref) {
            Obj::Instance(inst) => inst.fields.get_with_hash(name_ref, hash),
            _ => unreachable!(),
        };
        if let Some(value) = field {
            let slot = self.stack.len() - arg_count as usize - 1;
            self.stack[slot] = value;
            return self.call_value(value, arg_count);
        }

        let class_ref = match self.heap.get(instance_ref) {
            Obj::Instance(inst) => inst.class,
            _ => unreachable!(),
        };
        self.invoke_from_class(class_ref, name_ref, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class_ref: ObjRef,
        name_ref: ObjRef,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        let hash = Table::hash_of(&self.heap, name_ref);
        let method = match self.heap.get(class_ref) {
            Obj::Class(c) => c.methods.get_with_hash(name_ref, hash),
            _ => unreachable!(),
        };
        match method {
            Some(Value::Obj(method_ref)) => self.call_closure(method_ref, arg_count),
            _ => Err(self.runtime_error(format!(
                "Undefined property '{}'.",
                self.string_contents(name_ref)
            ))),
        }
    }

    // ---- upvalues -----------------------------------------------------------

    fn upvalue_location(&self, r: ObjRef) -> usize {
        match self.heap.get(r) {
            Obj::Upvalue(u) => match u.state {
                UpvalueState::Open(idx) => idx,
                UpvalueState::Closed => usize::MAX,
            },
            _ => unreachable!(),
        }
    }

    fn capture_upvalue(&mut self, stack_index: usize) -> ObjRef {
        let mut insert_at = self.open_upvalues.len();
        for (i, &r) in self.open_upvalues.iter().enumerate() {
            let loc = self.upvalue_location(r);
            if loc == stack_index {
                return r;
            }
            if loc < stack_index {
                insert_at = i;
                break;
            }
        }
        let new_ref = self.alloc(Obj::Upvalue(ObjUpvalue {
            state: UpvalueState::Open(stack_index),
            closed: Value::Nil,
        }));
        self.open_upvalues.insert(insert_at, new_ref);
        new_ref
    }

    /// Closes every open upvalue at or above `from` on the value stack.
    fn close_upvalues(&mut self, from: usize) {
        while let Some(&r) = self.open_upvalues.first() {
            let loc = self.upvalue_location(r);
            if loc < from {
                break;
            }
            let value = self.stack[loc];
            if let Obj::Upvalue(u) = self.heap.get_mut(r) {
                u.closed = value;
                u.state = UpvalueState::Closed;
            }
            self.open_upvalues.remove(0);
        }
    }

    fn upvalue_get(&self, closure_ref: ObjRef, index: usize) -> Value {
        let upvalue_ref = match self.heap.get(closure_ref) {
            Obj::Closure(c) => c.upvalues[index],
            _ => unreachable!(),
        };
        match self.heap.get(upvalue_ref) {
            Obj::Upvalue(u) => match u.state {
                UpvalueState::Open(slot) => self.stack[slot],
                UpvalueState::Closed => u.closed,
            },
            _ => unreachable!(),
        }
    }

    fn upvalue_set(&mut self, closure_ref: ObjRef, index: usize, value: Value) {
        let upvalue_ref = match self.heap.get(closure_ref) {
            Obj::Closure(c) => c.upvalues[index],
            _ => unreachable!(),
        };
        let slot = match self.heap.get(upvalue_ref) {
            Obj::Upvalue(u) => match u.state {
                UpvalueState::Open(slot) => Some(slot),
                UpvalueState::Closed => None,
            },
            _ => unreachable!(),
        };
        match slot {
            Some(slot) => self.stack[slot] = value,
            None => {
                if let Obj::Upvalue(u) = self.heap.get_mut(upvalue_ref) {
                    u.closed = value;
                }
            }
        }
    }

    // ---- errors -------------------------------------------------------------

    /// Unwraps a numeric operand or raises a properly traced runtime error,
    /// so every arithmetic/comparison opcode reports a backtrace the same
    /// way `call_value`/property access already do.
    fn expect_number(&mut self, v: Value, msg: &str) -> Result<f64, RuntimeError> {
        v.as_number().ok_or_else(|| self.runtime_error(msg))
    }

    fn runtime_error(&mut self, message: impl Into<String>) -> RuntimeError {
        let message = message.into();
        let mut trace = Vec::new();
        for frame in self.frames.iter().rev() {
            let function_ref = match self.heap.get(frame.closure) {
                Obj::Closure(c) => c.function,
                _ => unreachable!(),
            };
            let (line, name) = match self.heap.get(function_ref) {
                Obj::Function(f) => (f.chunk.line_at(frame.ip.saturating_sub(1)), f.name),
                _ => unreachable!(),
            };
            let suffix = match name {
                Some(n) => format!("{}()", self.string_contents(n)),
                None => "script".to_string(),
            };
            trace.push(format!("[line {}] in {}", line, suffix));
        }
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
        RuntimeError { message, trace }
    }

    // ---- dispatch -----------------------------------------------------------

    fn trace_instruction(&self) {
        let mut line = String::from("          ");
        for v in &self.stack {
            line.push_str(&format!("[ {} ]", v.format(&self.heap)));
        }
        trace!(self.trace_exec, "{}", line);
        let idx = self.frames.len() - 1;
        let function_ref = self.frame_function(idx);
        if let Obj::Function(f) = self.heap.get(function_ref) {
            crate::disassembler::disassemble_instruction(&f.chunk, &self.heap, self.frames[idx].ip);
        }
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            if self.trace_exec {
                self.trace_instruction();
            }

            let op = OpCode::from_byte(self.read_byte());
            match op {
                OpCode::Constant => {
                    let v = self.read_constant();
                    self.stack.push(v);
                }
                OpCode::Nil => self.stack.push(Value::Nil),
                OpCode::True => self.stack.push(Value::Bool(true)),
                OpCode::False => self.stack.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames[self.frames.len() - 1].slots;
                    self.stack.push(self.stack[base + slot]);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames[self.frames.len() - 1].slots;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let name_ref = self.read_constant_obj_ref();
                    match self.globals.get(&self.heap, name_ref) {
                        Some(v) => self.stack.push(v),
                        None => {
                            return Err(self.runtime_error(format!(
                                "Undefined variable '{}'.",
                                self.string_contents(name_ref)
                            )))
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name_ref = self.read_constant_obj_ref();
                    let value = self.pop();
                    self.globals.set(&self.heap, name_ref, value);
                }
                OpCode::SetGlobal => {
                    let name_ref = self.read_constant_obj_ref();
                    let value = self.peek(0);
                    if self.globals.set(&self.heap, name_ref, value) {
                        self.globals.delete(&self.heap, name_ref);
                        return Err(self.runtime_error(format!(
                            "Undefined variable '{}'.",
                            self.string_contents(name_ref)
                        )));
                    }
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let closure_ref = self.frames[self.frames.len() - 1].closure;
                    self.stack.push(self.upvalue_get(closure_ref, slot));
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let closure_ref = self.frames[self.frames.len() - 1].closure;
                    let value = self.peek(0);
                    self.upvalue_set(closure_ref, slot, value);
                }
                OpCode::GetProperty => {
                    let name_ref = self.read_constant_obj_ref();
                    let receiver = self.peek(0);
                    let instance_ref = match receiver {
                        Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
                        _ => return Err(self.runtime_error("Only instances have properties.")),
                    };
                    let hash = Table::hash_of(&self.heap, name_ref);
                    let field = match self.heap.get(instance_ref) {
                        Obj::Instance(inst) => inst.fields.get_with_hash(name_ref, hash),
                        _ => unreachable!(),
                    };
                    if let Some(value) = field {
                        self.pop();
                        self.stack.push(value);
                    } else {
                        let class_ref = match self.heap.get(instance_ref) {
                            Obj::Instance(inst) => inst.class,
                            _ => unreachable!(),
                        };
                        let method = match self.heap.get(class_ref) {
                            Obj::Class(c) => c.methods.get_with_hash(name_ref, hash),
                            _ => unreachable!(),
                        };
                        match method {
                            Some(Value::Obj(method_ref)) => {
                                self.pop();
                                let bound = self.alloc(Obj::BoundMethod(ObjBoundMethod {
                                    receiver,
                                    method: method_ref,
                                }));
                                self.stack.push(Value::Obj(bound));
                            }
                            _ => {
                                return Err(self.runtime_error(format!(
                                    "Undefined property '{}'.",
                                    self.string_contents(name_ref)
                                )))
                            }
                        }
                    }
                }
                OpCode::SetProperty => {
                    let name_ref = self.read_constant_obj_ref();
                    let receiver = self.peek(1);
                    let instance_ref = match receiver {
                        Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
                        _ => return Err(self.runtime_error("Only instances have fields.")),
                    };
                    let value = self.peek(0);
                    let hash = Table::hash_of(&self.heap, name_ref);
                    if let Obj::Instance(inst) = self.heap.get_mut(instance_ref) {
                        inst.fields.set_with_hash(name_ref, hash, value);
                    }
                    let value = self.pop();
                    self.pop();
                    self.stack.push(value);
                }
                OpCode::GetSuper => {
                    let name_ref = self.read_constant_obj_ref();
                    let superclass_val = self.pop();
                    let receiver = self.pop();
                    let superclass_ref = superclass_val
                        .as_obj()
                        .expect("super must resolve to a class object");
                    let hash = Table::hash_of(&self.heap, name_ref);
                    let method = match self.heap.get(superclass_ref) {
                        Obj::Class(c) => c.methods.get_with_hash(name_ref, hash),
                        _ => unreachable!(),
                    };
                    match method {
                        Some(Value::Obj(method_ref)) => {
                            let bound = self.alloc(Obj::BoundMethod(ObjBoundMethod {
                                receiver,
                                method: method_ref,
                            }));
                            self.stack.push(Value::Obj(bound));
                        }
                        _ => {
                            return Err(self.runtime_error(format!(
                                "Undefined property '{}'.",
                                self.string_contents(name_ref)
                            )))
                        }
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::Bool(Value::values_equal(a, b)));
                }
                OpCode::Greater => {
                    let b = self.pop();
                    let a = self.pop();
                    let bn = self.expect_number(b, "Operands must be numbers.")?;
                    let an = self.expect_number(a, "Operands must be numbers.")?;
                    self.stack.push(Value::Bool(an > bn));
                }
                OpCode::Less => {
                    let b = self.pop();
                    let a = self.pop();
                    let bn = self.expect_number(b, "Operands must be numbers.")?;
                    let an = self.expect_number(a, "Operands must be numbers.")?;
                    self.stack.push(Value::Bool(an < bn));
                }
                OpCode::Add => {
                    let b = self.peek(0);
                    let a = self.peek(1);
                    if a.is_number() && b.is_number() {
                        let bn = self.pop().as_number().unwrap();
                        let an = self.pop().as_number().unwrap();
                        self.stack.push(Value::Number(an + bn));
                    } else if a.is_string(&self.heap) && b.is_string(&self.heap) {
                        let a_str = self.string_contents(a.as_obj().unwrap());
                        let b_str = self.string_contents(b.as_obj().unwrap());
                        let concatenated = format!("{}{}", a_str, b_str);
                        let result_ref = self.intern_string(&concatenated);
                        self.pop();
                        self.pop();
                        self.stack.push(Value::Obj(result_ref));
                    } else {
                        return Err(
                            self.runtime_error("Operands must be two numbers or two strings.")
                        );
                    }
                }
                OpCode::Subtract => {
                    let b = self.pop();
                    let a = self.pop();
                    let bn = self.expect_number(b, "Operands must be numbers.")?;
                    let an = self.expect_number(a, "Operands must be numbers.")?;
                    self.stack.push(Value::Number(an - bn));
                }
                OpCode::Multiply => {
                    let b = self.pop();
                    let a = self.pop();
                    let bn = self.expect_number(b, "Operands must be numbers.")?;
                    let an = self.expect_number(a, "Operands must be numbers.")?;
                    self.stack.push(Value::Number(an * bn));
                }
                OpCode::Divide => {
                    let b = self.pop();
                    let a = self.pop();
                    let bn = self.expect_number(b, "Operands must be numbers.")?;
                    let an = self.expect_number(a, "Operands must be numbers.")?;
                    self.stack.push(Value::Number(an / bn));
                }
                OpCode::Not => {
                    let v = self.pop();
                    self.stack.push(Value::Bool(v.is_falsey()));
                }
                OpCode::Negate => {
                    let v = self.peek(0);
                    let n = self.expect_number(v, "Operand must be a number.")?;
                    self.pop();
                    self.stack.push(Value::Number(-n));
                }
                OpCode::Print => {
                    let v = self.pop();
                    println!("{}", v.format(&self.heap));
                }
                OpCode::Jump => {
                    let offset = self.read_u16();
                    let idx = self.frames.len() - 1;
                    self.frames[idx].ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16();
                    if self.peek(0).is_falsey() {
                        let idx = self.frames.len() - 1;
                        self.frames[idx].ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16();
                    let idx = self.frames.len() - 1;
                    self.frames[idx].ip -= offset as usize;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte();
                    let callee = self.peek(arg_count as usize);
                    self.call_value(callee, arg_count)?;
                }
                OpCode::Invoke => {
                    let name_ref = self.read_constant_obj_ref();
                    let arg_count = self.read_byte();
                    self.invoke(name_ref, arg_count)?;
                }
                OpCode::SuperInvoke => {
                    let name_ref = self.read_constant_obj_ref();
                    let arg_count = self.read_byte();
                    let superclass_val = self.pop();
                    let superclass_ref = superclass_val
                        .as_obj()
                        .expect("super must resolve to a class object");
                    self.invoke_from_class(superclass_ref, name_ref, arg_count)?;
                }
                OpCode::Closure => {
                    let function_ref = self.read_constant_obj_ref();
                    let upvalue_count = match self.heap.get(function_ref) {
                        Obj::Function(f) => f.upvalue_count,
                        _ => unreachable!(),
                    };
                    let mut upvalues = Vec::with_capacity(upvalue_count as usize);
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() != 0;
                        let index = self.read_byte() as usize;
                        if is_local {
                            let base = self.frames[self.frames.len() - 1].slots;
                            upvalues.push(self.capture_upvalue(base + index));
                        } else {
                            let enclosing = self.frames[self.frames.len() - 1].closure;
                            let r = match self.heap.get(enclosing) {
                                Obj::Closure(c) => c.upvalues[index],
                                _ => unreachable!(),
                            };
                            upvalues.push(r);
                        }
                    }
                    let closure_ref = self.alloc(Obj::Closure(ObjClosure {
                        function: function_ref,
                        upvalues,
                    }));
                    self.stack.push(Value::Obj(closure_ref));
                }
                OpCode::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().unwrap();
                    self.close_upvalues(frame.slots);
                    if self.frames.is_empty() {
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(frame.slots);
                    self.stack.push(result);
                }
                OpCode::Class => {
                    let name_ref = self.read_constant_obj_ref();
                    let class_ref = self.alloc(Obj::Class(ObjClass::new(name_ref)));
                    self.stack.push(Value::Obj(class_ref));
                }
                OpCode::Inherit => {
                    let superclass_val = self.peek(1);
                    let subclass_val = self.peek(0);
                    let superclass_ref = match superclass_val {
                        Value::Obj(r) if matches!(self.heap.get(r), Obj::Class(_)) => r,
                        _ => return Err(self.runtime_error("Superclass must be a class.")),
                    };
                    let subclass_ref = subclass_val.as_obj().expect("subclass must be a class");
                    let inherited: Vec<(ObjRef, u32, Value)> = match self.heap.get(superclass_ref) {
                        Obj::Class(c) => c.methods.iter_with_hash().collect(),
                        _ => unreachable!(),
                    };
                    if let Obj::Class(sub) = self.heap.get_mut(subclass_ref) {
                        for (k, h, v) in inherited {
                            sub.methods.set_with_hash(k, h, v);
                        }
                    }
                    self.pop();
                }
                OpCode::Method => {
                    let name_ref = self.read_constant_obj_ref();
                    let method_val = self.peek(0);
                    let class_val = self.peek(1);
                    let class_ref = class_val.as_obj().expect("method target must be a class");
                    let hash = Table::hash_of(&self.heap, name_ref);
                    if let Obj::Class(c) = self.heap.get_mut(class_ref) {
                        c.methods.set_with_hash(name_ref, hash, method_val);
                    }
                    self.pop();
                }
            }
        }
    }
}
