// CLI front end, per spec.md §6: a REPL when invoked with no script
// argument, a file runner when given exactly one, usage error (exit 64)
// otherwise. Process exit codes follow `InterpretResult::exit_code()`'s
// sysexits(3) convention; a file that can't be read exits 74.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use crumb::VM;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let mut vm = VM::new();
    let mut script_path: Option<&str> = None;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--trace" => vm.set_trace_exec(true),
            "--trace-gc" => vm.set_trace_gc(true),
            "--stress-gc" => vm.set_stress_gc(true),
            "--disassemble" => vm.set_disassemble(true),
            other if script_path.is_none() => script_path = Some(other),
            _ => {
                eprintln!("Usage: crumb [--trace] [--trace-gc] [--stress-gc] [--disassemble] [path]");
                return ExitCode::from(64);
            }
        }
    }

    match script_path {
        None => repl(&mut vm),
        Some(path) => run_file(&mut vm, path),
    }
}

fn repl(vm: &mut VM) -> ExitCode {
    let stdin = io::stdin();
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            return ExitCode::from(74);
        }
        let mut line = String::new();
        let bytes_read = match stdin.read_line(&mut line) {
            Ok(n) => n,
            Err(_) => return ExitCode::from(74),
        };
        if bytes_read == 0 {
            println!();
            return ExitCode::from(0);
        }
        vm.interpret(&line);
    }
}

fn run_file(vm: &mut VM, path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Could not open file \"{}\": {}", path, e);
            return ExitCode::from(74);
        }
    };
    let result = vm.interpret(&source);
    ExitCode::from(result.exit_code() as u8)
}
