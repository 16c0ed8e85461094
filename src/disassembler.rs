// Debug printer for compiled chunks, per spec.md §4 item 9 ("Disassembler
// (external)"). Grounded directly in `examples/original_source/debug.cpp`,
// translated instruction-shape by instruction-shape rather than rewritten.

use crate::chunk::{combine_u16, Chunk, OpCode};
use crate::heap::Heap;
use crate::object::Obj;
use crate::value::Value;

pub fn disassemble_chunk(chunk: &Chunk, heap: &Heap, name: &str) {
    println!("== {} ==", name);
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, heap, offset);
    }
}

pub fn disassemble_instruction(chunk: &Chunk, heap: &Heap, offset: usize) -> usize {
    print!("{:04} ", offset);
    if offset > 0 && chunk.line_at(offset) == chunk.line_at(offset - 1) {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.line_at(offset));
    }

    let op = OpCode::from_byte(chunk.code[offset]);
    match op {
        OpCode::Constant => constant_instruction("OP_CONSTANT", chunk, heap, offset),
        OpCode::Nil => simple_instruction("OP_NIL", offset),
        OpCode::True => simple_instruction("OP_TRUE", offset),
        OpCode::False => simple_instruction("OP_FALSE", offset),
        OpCode::Pop => simple_instruction("OP_POP", offset),
        OpCode::GetLocal => byte_instruction("OP_GET_LOCAL", chunk, offset),
        OpCode::SetLocal => byte_instruction("OP_SET_LOCAL", chunk, offset),
        OpCode::GetGlobal => constant_instruction("OP_GET_GLOBAL", chunk, heap, offset),
        OpCode::DefineGlobal => constant_instruction("OP_DEFINE_GLOBAL", chunk, heap, offset),
        OpCode::SetGlobal => constant_instruction("OP_SET_GLOBAL", chunk, heap, offset),
        OpCode::GetUpvalue => byte_instruction("OP_GET_UPVALUE", chunk, offset),
        OpCode::SetUpvalue => byte_instruction("OP_SET_UPVALUE", chunk, offset),
        OpCode::GetProperty => constant_instruction("OP_GET_PROPERTY", chunk, heap, offset),
        OpCode::SetProperty => constant_instruction("OP_SET_PROPERTY", chunk, heap, offset),
        OpCode::GetSuper => constant_instruction("OP_GET_SUPER", chunk, heap, offset),
        OpCode::Equal => simple_instruction("OP_EQUAL", offset),
        OpCode::Greater => simple_instruction("OP_GREATER", offset),
        OpCode::Less => simple_instruction("OP_LESS", offset),
        OpCode::Add => simple_instruction("OP_ADD", offset),
        OpCode::Subtract => simple_instruction("OP_SUBTRACT", offset),
        OpCode::Multiply => simple_instruction("OP_MULTIPLY", offset),
        OpCode::Divide => simple_instruction("OP_DIVIDE", offset),
        OpCode::Not => simple_instruction("OP_NOT", offset),
        OpCode::Negate => simple_instruction("OP_NEGATE", offset),
        OpCode::Print => simple_instruction("OP_PRINT", offset),
        OpCode::Jump => jump_instruction("OP_JUMP", 1, chunk, offset),
        OpCode::JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset),
        OpCode::Loop => jump_instruction("OP_LOOP", -1, chunk, offset),
        OpCode::Call => byte_instruction("OP_CALL", chunk, offset),
        OpCode::Invoke => invoke_instruction("OP_INVOKE", chunk, heap, offset),
        OpCode::SuperInvoke => invoke_instruction("OP_SUPER_INVOKE", chunk, heap, offset),
        OpCode::Closure => closure_instruction(chunk, heap, offset),
        OpCode::CloseUpvalue => simple_instruction("OP_CLOSE_UPVALUE", offset),
        OpCode::Return => simple_instruction("OP_RETURN", offset),
        OpCode::Class => constant_instruction("OP_CLASS", chunk, heap, offset),
        OpCode::Inherit => simple_instruction("OP_INHERIT", offset),
        OpCode::Method => constant_instruction("OP_METHOD", chunk, heap, offset),
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{}", name);
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    println!("{:<16} {:4}", name, slot);
    offset + 2
}

fn constant_instruction(name: &str, chunk: &Chunk, heap: &Heap, offset: usize) -> usize {
    let idx = chunk.code[offset + 1] as usize;
    let value = chunk.constants[idx];
    println!("{:<16} {:4} '{}'", name, idx, value.format(heap));
    offset + 2
}

fn invoke_instruction(name: &str, chunk: &Chunk, heap: &Heap, offset: usize) -> usize {
    let idx = chunk.code[offset + 1] as usize;
    let arg_count = chunk.code[offset + 2];
    let value = chunk.constants[idx];
    println!("{:<16} ({} args) {:4} '{}'", name, arg_count, idx, value.format(heap));
    offset + 3
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let hi = chunk.code[offset + 1];
    let lo = chunk.code[offset + 2];
    let jump = combine_u16(hi, lo) as i32;
    println!(
        "{:<16} {:4} -> {}",
        name,
        offset,
        offset as i32 + 3 + sign * jump
    );
    offset + 3
}

fn closure_instruction(chunk: &Chunk, heap: &Heap, offset: usize) -> usize {
    let mut pos = offset + 1;
    let const_idx = chunk.code[pos] as usize;
    pos += 1;
    let value = chunk.constants[const_idx];
    println!("{:<16} {:4} '{}'", "OP_CLOSURE", const_idx, value.format(heap));

    if let Value::Obj(r) = value {
        if let Obj::Function(f) = heap.get(r) {
            for _ in 0..f.upvalue_count {
                let is_local = chunk.code[pos];
                let index = chunk.code[pos + 1];
                pos += 2;
                println!(
                    "{:04}      |                     {} {}",
                    pos - 2,
                    if is_local != 0 { "local" } else { "upvalue" },
                    index
                );
            }
        }
    }
    pos
}
