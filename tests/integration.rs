// End-to-end CLI tests: write a temporary `.crumb` source file, run the
// built binary against it, assert on stdout/stderr/exit code. Covers
// spec.md §8's positive, negative-runtime, and compile-failure
// scenarios, plus a stress-GC soundness check.
//
// Grounded in the teacher's own preference for exercising real process
// boundaries (`main.rs` takes a path argument exactly like this), using
// `tempfile` the way other example repos' CLI test suites do.

use std::io::Write;
use std::process::{Command, Output};

fn run_source(source: &str) -> Output {
    let mut file = tempfile::Builder::new()
        .suffix(".crumb")
        .tempfile()
        .expect("create temp script");
    write!(file, "{}", source).expect("write temp script");
    Command::new(env!("CARGO_BIN_EXE_crumb"))
        .arg(file.path())
        .output()
        .expect("run crumb binary")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn arithmetic_precedence() {
    let out = run_source("print 2 + 3 * 4;\n");
    assert_eq!(stdout_of(&out), "14\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn string_concatenation() {
    let out = run_source("print \"foo\" + \"bar\";\n");
    assert_eq!(stdout_of(&out), "foobar\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn closures_capture_locals_across_calls() {
    let src = r#"
        fun makeCounter() {
            var i = 0;
            fun count() {
                i = i + 1;
                print i;
            }
            return count;
        }
        var counter = makeCounter();
        counter();
        counter();
    "#;
    let out = run_source(src);
    assert_eq!(stdout_of(&out), "1\n2\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn single_inheritance_with_super() {
    let src = r#"
        class Animal {
            speak() {
                print "generic noise";
            }
        }
        class Dog < Animal {
            speak() {
                super.speak();
                print "woof";
            }
        }
        Dog().speak();
    "#;
    let out = run_source(src);
    assert_eq!(stdout_of(&out), "generic noise\nwoof\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn init_method_assigns_fields() {
    let src = r#"
        class Point {
            init(x, y) {
                this.x = x;
                this.y = y;
            }
        }
        var p = Point(3, 4);
        print p.x;
        print p.y;
    "#;
    let out = run_source(src);
    assert_eq!(stdout_of(&out), "3\n4\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn for_loop_desugaring() {
    let src = r#"
        var total = 0;
        for (var i = 0; i < 5; i = i + 1) {
            total = total + i;
        }
        print total;
    "#;
    let out = run_source(src);
    assert_eq!(stdout_of(&out), "10\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn runtime_error_operand_must_be_number() {
    let out = run_source("print -\"oops\";\n");
    assert!(stderr_of(&out).contains("Operand must be a number."));
    assert_eq!(out.status.code(), Some(70));
}

#[test]
fn runtime_error_add_type_mismatch() {
    let out = run_source("print \"a\" + 1;\n");
    assert!(stderr_of(&out).contains("Operands must be two numbers or two strings."));
    assert_eq!(out.status.code(), Some(70));
}

#[test]
fn runtime_error_call_non_callable() {
    let out = run_source("var x = 1;\nx();\n");
    assert!(stderr_of(&out).contains("Can only call functions and classes."));
    assert_eq!(out.status.code(), Some(70));
}

#[test]
fn runtime_error_stack_overflow() {
    let src = r#"
        fun recurse() {
            recurse();
        }
        recurse();
    "#;
    let out = run_source(src);
    assert!(stderr_of(&out).contains("Stack overflow."));
    assert_eq!(out.status.code(), Some(70));
}

#[test]
fn compile_error_self_referential_initializer() {
    let out = run_source("{ var a = a; }\n");
    assert!(stderr_of(&out).contains("Can't read local variable in its own initializer."));
    assert_eq!(out.status.code(), Some(65));
}

#[test]
fn compile_error_duplicate_local() {
    let out = run_source("{ var a = 1; var a = 2; }\n");
    assert!(stderr_of(&out).contains("Already a variable with this name in this scope."));
    assert_eq!(out.status.code(), Some(65));
}

#[test]
fn compile_error_return_value_from_initializer() {
    let src = r#"
        class Foo {
            init() {
                return 1;
            }
        }
    "#;
    let out = run_source(src);
    assert!(stderr_of(&out).contains("Can't return a value from an initializer."));
    assert_eq!(out.status.code(), Some(65));
}

#[test]
fn compile_error_this_outside_class() {
    let out = run_source("print this;\n");
    assert!(stderr_of(&out).contains("Can't use 'this' outside of a class."));
    assert_eq!(out.status.code(), Some(65));
}

#[test]
fn stress_gc_does_not_change_output() {
    let src = r#"
        class Node {
            init(value) {
                this.value = value;
            }
        }
        var total = 0;
        for (var i = 0; i < 50; i = i + 1) {
            var n = Node(i);
            total = total + n.value;
        }
        print total;
    "#;
    let mut file = tempfile::Builder::new()
        .suffix(".crumb")
        .tempfile()
        .expect("create temp script");
    write!(file, "{}", src).expect("write temp script");

    let normal = Command::new(env!("CARGO_BIN_EXE_crumb"))
        .arg(file.path())
        .output()
        .expect("run crumb binary");
    let stressed = Command::new(env!("CARGO_BIN_EXE_crumb"))
        .arg("--stress-gc")
        .arg(file.path())
        .output()
        .expect("run crumb binary under stress-gc");

    assert_eq!(stdout_of(&normal), stdout_of(&stressed));
    assert_eq!(normal.status.code(), stressed.status.code());
}
