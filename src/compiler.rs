// Single-pass Pratt parser, per spec.md §4.4. Every token kind has a row
// `{prefix, infix, precedence}`; `parse_precedence` drives expression
// parsing, `declaration`/`statement` drive the rest. Nested function
// bodies push a fresh `FunctionContext`; nested class bodies push a
// fresh `ClassContext` so `this`/`super` can be validated at compile
// time.
//
// Grounded in spec.md §4.4's algorithm directly (this crate has no
// teacher precedent for an operator-precedence parser); opcode naming
// follows other_examples' `qatam` chunk module.

use crate::chunk::{split_u16, OpCode};
use crate::error::CompileError;
use crate::heap::ObjRef;
use crate::object::{Obj, ObjFunction};
use crate::scanner::{Scanner, Token, TokenKind};
use crate::value::Value;
use crate::vm::VM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn<'src, 'vm> = fn(&mut Compiler<'src, 'vm>, bool);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
}

struct Local {
    name: String,
    depth: i32, // -1 = declared but not yet initialized
    is_captured: bool,
}

struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

/// One nested function body's worth of compile-time state, per spec.md
/// §4.4's "compiler context (stacked)".
struct FunctionContext {
    function: ObjRef,
    function_type: FunctionType,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueDesc>,
    scope_depth: i32,
}

/// Tracks whether the class body being compiled has a superclass, so
/// `super` can be rejected at compile time instead of at runtime.
struct ClassContext {
    has_superclass: bool,
}

struct Compiler<'src, 'vm> {
    vm: &'vm mut VM,
    scanner: Scanner<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<String>,
    contexts: Vec<FunctionContext>,
    classes: Vec<ClassContext>,
}

pub fn compile(source: &str, vm: &mut VM) -> Result<ObjRef, CompileError> {
    let mut compiler = Compiler::new(source, vm);
    compiler.begin_function(FunctionType::Script, None);
    compiler.advance();
    while !compiler.check(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.consume(TokenKind::Eof, "Expect end of expression.");
    let (function_ref, _upvalues) = compiler.end_function();

    if compiler.had_error {
        Err(CompileError(compiler.errors.join("\n")))
    } else {
        Ok(function_ref)
    }
}

impl<'src, 'vm> Compiler<'src, 'vm> {
    fn new(source: &'src str, vm: &'vm mut VM) -> Compiler<'src, 'vm> {
        let sentinel = Token {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 0,
        };
        Compiler {
            vm,
            scanner: Scanner::new(source),
            previous: sentinel,
            current: sentinel,
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
            contexts: Vec::new(),
            classes: Vec::new(),
        }
    }

    // ---- token stream ------------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.to_string();
            self.error_at_current(&message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let location = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!(" at '{}'", token.lexeme),
        };
        self.errors
            .push(format!("[line {}] Error{}: {}", token.line, location, message));
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- bytecode emission ---------------------------------------------------

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        let function_ref = self.contexts.last().unwrap().function;
        if let Obj::Function(f) = self.vm.heap.get_mut(function_ref) {
            f.chunk.write(byte, line);
        }
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_bytes(&mut self, a: u8, b: u8) {
        self.emit_byte(a);
        self.emit_byte(b);
    }

    fn emit_return(&mut self) {
        if self.contexts.last().unwrap().function_type == FunctionType::Initializer {
            self.emit_bytes(OpCode::GetLocal as u8, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    fn current_chunk_len(&self) -> usize {
        let function_ref = self.contexts.last().unwrap().function;
        match self.vm.heap.get(function_ref) {
            Obj::Function(f) => f.chunk.code.len(),
            _ => unreachable!(),
        }
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk_len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let jump = self.current_chunk_len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
            return;
        }
        let (hi, lo) = split_u16(jump as u16);
        let function_ref = self.contexts.last().unwrap().function;
        if let Obj::Function(f) = self.vm.heap.get_mut(function_ref) {
            f.chunk.code[offset] = hi;
            f.chunk.code[offset + 1] = lo;
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.current_chunk_len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        let (hi, lo) = split_u16(offset as u16);
        self.emit_byte(hi);
        self.emit_byte(lo);
    }

    /// Pushes `value` onto the VM stack during constant-pool insertion
    /// and pops it after, per spec.md §4.1's GC-safety requirement.
    fn make_constant(&mut self, value: Value) -> u8 {
        self.vm.stack.push(value);
        let function_ref = self.contexts.last().unwrap().function;
        let idx = match self.vm.heap.get_mut(function_ref) {
            Obj::Function(f) => f.chunk.add_constant(value),
            _ => unreachable!(),
        };
        self.vm.stack.pop();
        if idx > 255 {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        idx as u8
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit_bytes(OpCode::Constant as u8, idx);
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let r = self.vm.intern_string(name);
        self.make_constant(Value::Obj(r))
    }

    // ---- compiler contexts -------------------------------------------------

    fn begin_function(&mut self, function_type: FunctionType, name: Option<&str>) {
        let function_ref = self.vm.alloc(Obj::Function(ObjFunction::new()));
        if let Some(n) = name {
            let name_ref = self.vm.intern_string(n);
            if let Obj::Function(f) = self.vm.heap.get_mut(function_ref) {
                f.name = Some(name_ref);
            }
        }
        self.vm.compiler_roots.push(function_ref);

        let slot0_name = if matches!(function_type, FunctionType::Method | FunctionType::Initializer)
        {
            "this"
        } else {
            ""
        };
        self.contexts.push(FunctionContext {
            function: function_ref,
            function_type,
            locals: vec![Local {
                name: slot0_name.to_string(),
                depth: 0,
                is_captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
        });
    }

    fn end_function(&mut self) -> (ObjRef, Vec<UpvalueDesc>) {
        self.emit_return();
        let ctx = self.contexts.pop().unwrap();
        self.vm.compiler_roots.pop();
        (ctx.function, ctx.upvalues)
    }

    fn begin_scope(&mut self) {
        self.contexts.last_mut().unwrap().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let new_depth = self.contexts.last().unwrap().scope_depth - 1;
        self.contexts.last_mut().unwrap().scope_depth = new_depth;

        loop {
            let should_pop = match self.contexts.last().unwrap().locals.last() {
                Some(l) => l.depth > new_depth,
                None => false,
            };
            if !should_pop {
                break;
            }
            let captured = self.contexts.last().unwrap().locals.last().unwrap().is_captured;
            if captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.contexts.last_mut().unwrap().locals.pop();
        }
    }

    // ---- variable resolution -------------------------------------------------

    fn resolve_local(&mut self, ctx_index: usize, name: &str) -> Option<u8> {
        let locals = &self.contexts[ctx_index].locals;
        for i in (0..locals.len()).rev() {
            if locals[i].name == name {
                let uninitialized = locals[i].depth == -1;
                if uninitialized {
                    self.error("Can't read local variable in its own initializer.");
                }
                return Some(i as u8);
            }
        }
        None
    }

    fn resolve_upvalue(&mut self, ctx_index: usize, name: &str) -> Option<u8> {
        if ctx_index == 0 {
            return None;
        }
        let enclosing = ctx_index - 1;
        if let Some(local_slot) = self.resolve_local(enclosing, name) {
            self.contexts[enclosing].locals[local_slot as usize].is_captured = true;
            return Some(self.add_upvalue(ctx_index, local_slot, true));
        }
        if let Some(upvalue_slot) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(ctx_index, upvalue_slot, false));
        }
        None
    }

    fn add_upvalue(&mut self, ctx_index: usize, index: u8, is_local: bool) -> u8 {
        {
            let ctx = &self.contexts[ctx_index];
            for (i, u) in ctx.upvalues.iter().enumerate() {
                if u.index == index && u.is_local == is_local {
                    return i as u8;
                }
            }
            if ctx.upvalues.len() >= 256 {
                self.error("Too many closure variables in function.");
                return 0;
            }
        }
        self.contexts[ctx_index].upvalues.push(UpvalueDesc { index, is_local });
        let count = self.contexts[ctx_index].upvalues.len();
        let function_ref = self.contexts[ctx_index].function;
        if let Obj::Function(f) = self.vm.heap.get_mut(function_ref) {
            f.upvalue_count = count as u8;
        }
        (count - 1) as u8
    }

    fn add_local(&mut self, name: &str) {
        let too_many = self.contexts.last().unwrap().locals.len() >= 256;
        if too_many {
            self.error("Too many local variables in function.");
            return;
        }
        self.contexts.last_mut().unwrap().locals.push(Local {
            name: name.to_string(),
            depth: -1,
            is_captured: false,
        });
    }

    fn declare_variable(&mut self, name: &str) {
        let ctx_index = self.contexts.len() - 1;
        let depth = self.contexts[ctx_index].scope_depth;
        if depth == 0 {
            return;
        }
        let mut duplicate = false;
        for local in self.contexts[ctx_index].locals.iter().rev() {
            if local.depth != -1 && local.depth < depth {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn mark_initialized(&mut self) {
        let ctx = self.contexts.last_mut().unwrap();
        if ctx.scope_depth == 0 {
            return;
        }
        let depth = ctx.scope_depth;
        let last = ctx.locals.len() - 1;
        ctx.locals[last].depth = depth;
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        let name = self.previous.lexeme.to_string();
        self.declare_variable(&name);
        if self.contexts.last().unwrap().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(&name)
    }

    fn define_variable(&mut self, global: u8) {
        if self.contexts.last().unwrap().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_bytes(OpCode::DefineGlobal as u8, global);
    }

    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let ctx_index = self.contexts.len() - 1;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(ctx_index, name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue(ctx_index, name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let idx = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, idx)
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(set_op as u8, arg);
        } else {
            self.emit_bytes(get_op as u8, arg);
        }
    }

    // ---- declarations ---------------------------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous.lexeme.to_string();
        let name_const = self.identifier_constant(&class_name);
        self.declare_variable(&class_name);

        self.emit_bytes(OpCode::Class as u8, name_const);
        self.define_variable(name_const);

        self.classes.push(ClassContext { has_superclass: false });

        if self.match_token(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            let super_name = self.previous.lexeme.to_string();
            self.named_variable(&super_name, false);

            if super_name == class_name {
                self.error("A class can't inherit from itself.");
            }

            self.begin_scope();
            self.add_local("super");
            self.mark_initialized();

            self.named_variable(&class_name, false);
            self.emit_op(OpCode::Inherit);
            self.classes.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(&class_name, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);

        if self.classes.last().unwrap().has_superclass {
            self.end_scope();
        }
        self.classes.pop();
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let method_name = self.previous.lexeme.to_string();
        let name_const = self.identifier_constant(&method_name);
        let function_type = if method_name == "init" {
            FunctionType::Initializer
        } else {
            FunctionType::Method
        };
        self.function(function_type, &method_name);
        self.emit_bytes(OpCode::Method as u8, name_const);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        let name = self.previous.lexeme.to_string();
        self.function(FunctionType::Function, &name);
        self.define_variable(global);
    }

    fn increment_arity(&mut self) {
        let function_ref = self.contexts.last().unwrap().function;
        let arity = match self.vm.heap.get(function_ref) {
            Obj::Function(f) => f.arity,
            _ => unreachable!(),
        };
        if arity == 255 {
            self.error_at_current("Can't have more than 255 parameters.");
        }
        if let Obj::Function(f) = self.vm.heap.get_mut(function_ref) {
            f.arity += 1;
        }
    }

    fn function(&mut self, function_type: FunctionType, name: &str) {
        self.begin_function(function_type, Some(name));
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                self.increment_arity();
                self.consume(TokenKind::Identifier, "Expect parameter name.");
                let pname = self.previous.lexeme.to_string();
                self.declare_variable(&pname);
                self.mark_initialized();
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let (function_ref, upvalues) = self.end_function();
        let const_idx = self.make_constant(Value::Obj(function_ref));
        self.emit_bytes(OpCode::Closure as u8, const_idx);
        for u in &upvalues {
            self.emit_byte(if u.is_local { 1 } else { 0 });
            self.emit_byte(u.index);
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    // ---- statements -------------------------------------------------------------

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk_len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // no initializer clause
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk_len();
        let mut exit_jump: Option<usize> = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk_len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }

        self.end_scope();
    }

    fn return_statement(&mut self) {
        let function_type = self.contexts.last().unwrap().function_type;
        if function_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if function_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    // ---- expressions -------------------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix_rule = match Self::get_rule(self.previous.kind).0 {
            Some(f) => f,
            None => {
                self.error("Expect expression.");
                return;
            }
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix_rule(self, can_assign);

        while precedence <= Self::get_rule(self.current.kind).2 {
            self.advance();
            let infix_rule = Self::get_rule(self.previous.kind).1.unwrap();
            infix_rule(self, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn get_rule(kind: TokenKind) -> (Option<ParseFn<'src, 'vm>>, Option<ParseFn<'src, 'vm>>, Precedence) {
        use TokenKind::*;
        match kind {
            LeftParen => (Some(Compiler::grouping), Some(Compiler::call), Precedence::Call),
            Dot => (None, Some(Compiler::dot), Precedence::Call),
            Minus => (Some(Compiler::unary), Some(Compiler::binary), Precedence::Term),
            Plus => (None, Some(Compiler::binary), Precedence::Term),
            Slash => (None, Some(Compiler::binary), Precedence::Factor),
            Star => (None, Some(Compiler::binary), Precedence::Factor),
            Bang => (Some(Compiler::unary), None, Precedence::None),
            BangEqual => (None, Some(Compiler::binary), Precedence::Equality),
            EqualEqual => (None, Some(Compiler::binary), Precedence::Equality),
            Greater => (None, Some(Compiler::binary), Precedence::Comparison),
            GreaterEqual => (None, Some(Compiler::binary), Precedence::Comparison),
            Less => (None, Some(Compiler::binary), Precedence::Comparison),
            LessEqual => (None, Some(Compiler::binary), Precedence::Comparison),
            Identifier => (Some(Compiler::variable), None, Precedence::None),
            String => (Some(Compiler::string), None, Precedence::None),
            Number => (Some(Compiler::number), None, Precedence::None),
            And => (None, Some(Compiler::and_), Precedence::And),
            Or => (None, Some(Compiler::or_), Precedence::Or),
            False => (Some(Compiler::literal), None, Precedence::None),
            Nil => (Some(Compiler::literal), None, Precedence::None),
            True => (Some(Compiler::literal), None, Precedence::None),
            This => (Some(Compiler::this_), None, Precedence::None),
            Super => (Some(Compiler::super_), None, Precedence::None),
            _ => (None, None, Precedence::None),
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self
            .previous
            .lexeme
            .parse()
            .expect("scanner only produces well-formed number lexemes");
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme;
        let contents = &lexeme[1..lexeme.len() - 1];
        let r = self.vm.intern_string(contents);
        self.emit_constant(Value::Obj(r));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => unreachable!(),
        }
    }

    fn unary(&mut self, _can_assign: bool) {
        let kind = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match kind {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!(),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let rule_prec = Self::get_rule(operator).2;
        self.parse_precedence(rule_prec.next());
        match operator {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            _ => unreachable!(),
        }
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme.to_string();
        self.named_variable(&name, can_assign);
    }

    fn this_(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.named_variable("this", false);
    }

    fn super_(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self.classes.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let method_name = self.previous.lexeme.to_string();
        let name_const = self.identifier_constant(&method_name);

        self.named_variable("this", false);
        if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable("super", false);
            self.emit_bytes(OpCode::SuperInvoke as u8, name_const);
            self.emit_byte(arg_count);
        } else {
            self.named_variable("super", false);
            self.emit_bytes(OpCode::GetSuper as u8, name_const);
        }
    }

    fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_bytes(OpCode::Call as u8, arg_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u32 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count as u8
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.previous.lexeme.to_string();
        let name_const = self.identifier_constant(&name);

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(OpCode::SetProperty as u8, name_const);
        } else if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_bytes(OpCode::Invoke as u8, name_const);
            self.emit_byte(arg_count);
        } else {
            self.emit_bytes(OpCode::GetProperty as u8, name_const);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::VM;

    fn compile_err(source: &str) -> String {
        let mut vm = VM::new();
        match compile(source, &mut vm) {
            Ok(_) => panic!("expected a compile error for: {}", source),
            Err(e) => e.0,
        }
    }

    #[test]
    fn valid_program_compiles() {
        let mut vm = VM::new();
        let result = compile("print 1 + 2;", &mut vm);
        assert!(result.is_ok());
    }

    #[test]
    fn reports_self_referential_initializer() {
        let message = compile_err("{ var a = a; }");
        assert!(message.contains("Can't read local variable in its own initializer."));
    }

    #[test]
    fn reports_duplicate_local_in_same_scope() {
        let message = compile_err("{ var a = 1; var a = 2; }");
        assert!(message.contains("Already a variable with this name in this scope."));
    }

    #[test]
    fn reports_return_value_from_initializer() {
        let message = compile_err("class Foo { init() { return 1; } }");
        assert!(message.contains("Can't return a value from an initializer."));
    }

    #[test]
    fn reports_this_outside_class() {
        let message = compile_err("print this;");
        assert!(message.contains("Can't use 'this' outside of a class."));
    }

    #[test]
    fn reports_super_outside_class() {
        let message = compile_err("print super.foo();");
        assert!(message.contains("Can't use 'super' outside of a class."));
    }

    #[test]
    fn reports_return_from_top_level() {
        let message = compile_err("return 1;");
        assert!(message.contains("Can't return from top-level code."));
    }

    #[test]
    fn error_message_quotes_offending_token() {
        let message = compile_err("1 + ;");
        assert!(message.contains("Expect expression."));
        assert!(message.contains("at ';'"));
    }

    #[test]
    fn synchronize_recovers_and_reports_both_errors() {
        // Two independent errors in separate statements should both be
        // reported rather than the second being swallowed by panic mode.
        let message = compile_err("var 1; var 2;");
        let count = message.matches("Error").count();
        assert_eq!(count, 2);
    }
}
