use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use rlox::lox::Lox;

/// `print` sink shared between the test and the interpreter.
#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("print output is UTF-8")
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct RunOutcome {
    output: String,
    static_error: bool,
    runtime_error: bool,
    entries: Vec<String>,
}

fn run(source: &str) -> RunOutcome {
    let buffer = SharedBuffer::default();
    let mut lox = Lox::with_output(Box::new(buffer.clone()));

    lox.run(source);

    RunOutcome {
        output: buffer.contents(),
        static_error: lox.diagnostics().had_static_error(),
        runtime_error: lox.diagnostics().had_runtime_error(),
        entries: lox.diagnostics().entries().to_vec(),
    }
}

fn run_ok(source: &str) -> String {
    let outcome = run(source);

    assert!(
        !outcome.static_error && !outcome.runtime_error,
        "unexpected diagnostics: {:?}",
        outcome.entries
    );

    outcome.output
}

// ─────────────────────────────────────────────────────────────────────────
// Specification scenarios
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn fibonacci() {
    let output = run_ok(
        "fun fib(n) { if (n < 2) return n; return fib(n-1) + fib(n-2); }\n\
         print fib(10);",
    );

    assert_eq!(output, "55\n");
}

#[test]
fn closure_captures_the_variable_not_its_value() {
    let output = run_ok("var a = 1; fun f() { print a; } a = 2; f();");

    assert_eq!(output, "2\n");
}

#[test]
fn counter_factory() {
    let output = run_ok(
        "fun makeCounter() { var i = 0; fun c() { i = i + 1; return i; } return c; }\n\
         var c = makeCounter(); print c(); print c(); print c();",
    );

    assert_eq!(output, "1\n2\n3\n");
}

#[test]
fn short_circuit_skips_the_right_operand() {
    let output = run_ok(
        "fun side() { print \"x\"; return true; }\n\
         print false and side();\n\
         print true or side();",
    );

    // `side` never runs, so no "x" appears.
    assert_eq!(output, "false\ntrue\n");
}

#[test]
fn runtime_error_aborts_the_rest_of_the_program() {
    let outcome = run("print nil + true;\nprint \"unreached\";");

    assert!(outcome.runtime_error);
    assert!(!outcome.static_error);
    assert!(!outcome.output.contains("unreached"));

    assert_eq!(outcome.entries.len(), 1);
    assert!(outcome.entries[0].contains("[line 1]"));
    assert!(outcome.entries[0].contains("'+'"));
}

#[test]
fn self_reference_skips_interpretation() {
    let outcome = run("{ var a = a; }");

    assert!(outcome.static_error);
    assert!(!outcome.runtime_error);
    assert!(outcome.output.is_empty());
    assert!(outcome
        .entries
        .iter()
        .any(|e| e.contains("Cannot read local variable in its own initializer")));
}

// ─────────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn arithmetic_and_number_formatting() {
    assert_eq!(run_ok("print 1 + 2 * 3;"), "7\n");
    assert_eq!(run_ok("print 10 / 4;"), "2.5\n");
    assert_eq!(run_ok("print 0.5 + 0.25;"), "0.75\n");
    assert_eq!(run_ok("print -(3);"), "-3\n");
}

#[test]
fn modulo_truncates_to_integers() {
    assert_eq!(run_ok("print 7 % 3;"), "1\n");
    assert_eq!(run_ok("print 9.9 % 4;"), "1\n");
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let outcome = run("print 1 / 0;");

    assert!(outcome.runtime_error);
    assert!(outcome.entries[0].contains("Division by zero."));
}

#[test]
fn modulo_by_zero_is_a_runtime_error() {
    let outcome = run("print 1 % 0;");

    assert!(outcome.runtime_error);
    assert!(outcome.entries[0].contains("Modulo by zero."));
}

#[test]
fn plus_concatenates_when_either_side_is_a_string() {
    assert_eq!(run_ok("print \"a\" + \"b\";"), "ab\n");
    assert_eq!(run_ok("print \"n = \" + 4;"), "n = 4\n");
    assert_eq!(run_ok("print 4 + \"!\";"), "4!\n");
    assert_eq!(run_ok("print \"is \" + true;"), "is true\n");
}

#[test]
fn plus_on_mismatched_non_strings_is_a_runtime_error() {
    let outcome = run("print true + 1;");

    assert!(outcome.runtime_error);
    assert!(outcome.entries[0].contains("Operands must be numbers or strings."));
}

#[test]
fn comparison_requires_numbers() {
    let outcome = run("print \"a\" < \"b\";");

    assert!(outcome.runtime_error);
    assert!(outcome.entries[0].contains("Operands must be numbers."));
}

#[test]
fn equality_is_structural_for_data_types() {
    assert_eq!(run_ok("print 1 == 1;"), "true\n");
    assert_eq!(run_ok("print nil == nil;"), "true\n");
    assert_eq!(run_ok("print \"a\" != \"b\";"), "true\n");

    // No cross-type coercion.
    assert_eq!(run_ok("print 0 == false;"), "false\n");
    assert_eq!(run_ok("print \"1\" == 1;"), "false\n");
}

#[test]
fn zero_and_empty_string_are_truthy() {
    assert_eq!(run_ok("print 0 ? \"t\" : \"f\";"), "t\n");
    assert_eq!(run_ok("print \"\" ? \"t\" : \"f\";"), "t\n");
    assert_eq!(run_ok("print nil ? \"t\" : \"f\";"), "f\n");
}

#[test]
fn ternary_evaluates_only_the_chosen_branch() {
    let output = run_ok(
        "fun a() { print \"a\"; return 1; }\n\
         fun b() { print \"b\"; return 2; }\n\
         print true ? a() : b();",
    );

    assert_eq!(output, "a\n1\n");
}

#[test]
fn logical_operators_return_the_deciding_operand() {
    assert_eq!(run_ok("print nil and 2;"), "nil\n");
    assert_eq!(run_ok("print 1 and 2;"), "2\n");
    assert_eq!(run_ok("print 1 or 2;"), "1\n");
    assert_eq!(run_ok("print false or \"yes\";"), "yes\n");
}

#[test]
fn comma_evaluates_left_then_yields_right() {
    assert_eq!(run_ok("var a = 0; print (a = 5, a + 1);"), "6\n");
}

#[test]
fn assignment_yields_the_assigned_value() {
    assert_eq!(run_ok("var a = 1; print a = 2;"), "2\n");
}

// ─────────────────────────────────────────────────────────────────────────
// Statements, scoping, control flow
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn block_shadowing_restores_the_outer_binding() {
    let output = run_ok(
        "var a = \"global\";\n\
         { var a = \"local\"; print a; }\n\
         print a;",
    );

    assert_eq!(output, "local\nglobal\n");
}

#[test]
fn while_loop_counts() {
    let output = run_ok("var i = 0; while (i < 3) { print i; i = i + 1; }");

    assert_eq!(output, "0\n1\n2\n");
}

#[test]
fn for_loop_counts() {
    let output = run_ok("for (var i = 0; i < 4; i = i + 1) print i;");

    assert_eq!(output, "0\n1\n2\n3\n");
}

#[test]
fn break_leaves_only_the_innermost_loop() {
    let output = run_ok(
        "for (var i = 0; i < 3; i = i + 1) {\n\
           for (var j = 0; j < 3; j = j + 1) {\n\
             if (j == 1) break;\n\
             print i + j;\n\
           }\n\
         }",
    );

    // j only ever reaches 0.
    assert_eq!(output, "0\n1\n2\n");
}

#[test]
fn break_restores_loop_locals() {
    let output = run_ok(
        "var i = 0;\n\
         while (true) { var stop = i == 2; if (stop) break; i = i + 1; }\n\
         print i;",
    );

    assert_eq!(output, "2\n");
}

#[test]
fn var_without_initializer_is_nil() {
    assert_eq!(run_ok("var a; print a;"), "nil\n");
}

#[test]
fn undefined_variable_read_is_a_runtime_error() {
    let outcome = run("print missing;");

    assert!(outcome.runtime_error);
    assert!(outcome.entries[0].contains("Undefined variable 'missing'."));
}

#[test]
fn undefined_variable_assignment_is_a_runtime_error() {
    let outcome = run("missing = 1;");

    assert!(outcome.runtime_error);
    assert!(outcome.entries[0].contains("Undefined variable 'missing'."));
}

#[test]
fn globals_may_be_defined_after_the_function_that_uses_them() {
    let output = run_ok("fun show() { print later; } var later = \"ok\"; show();");

    assert_eq!(output, "ok\n");
}

// ─────────────────────────────────────────────────────────────────────────
// Functions and closures
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn function_without_return_yields_nil() {
    assert_eq!(run_ok("fun f() {} print f();"), "nil\n");
}

#[test]
fn bare_return_yields_nil() {
    assert_eq!(run_ok("fun f() { return; } print f();"), "nil\n");
}

#[test]
fn return_unwinds_nested_blocks_and_loops() {
    let output = run_ok(
        "fun find() {\n\
           for (var i = 0; i < 10; i = i + 1) {\n\
             if (i == 3) { return i; }\n\
           }\n\
         }\n\
         print find();",
    );

    assert_eq!(output, "3\n");
}

#[test]
fn recursion_works_in_a_local_scope() {
    let output = run_ok(
        "{\n\
           fun fact(n) { if (n < 2) return 1; return n * fact(n - 1); }\n\
           print fact(5);\n\
         }",
    );

    assert_eq!(output, "120\n");
}

#[test]
fn two_closures_share_one_captured_frame() {
    let output = run_ok(
        "fun make() {\n\
           var total = 0;\n\
           fun add(n) { total = total + n; return total; }\n\
           fun get() { return total; }\n\
           add(5);\n\
           print get();\n\
           add(2);\n\
           print get();\n\
           return get;\n\
         }\n\
         make();",
    );

    assert_eq!(output, "5\n7\n");
}

#[test]
fn function_values_print_by_name() {
    assert_eq!(run_ok("fun greet() {} print greet;"), "<fn greet>\n");
    assert_eq!(run_ok("print clock;"), "<native fn: clock>\n");
}

#[test]
fn calling_a_non_callable_is_a_runtime_error() {
    let outcome = run("var x = 1; x();");

    assert!(outcome.runtime_error);
    assert!(outcome.entries[0].contains("Can only call functions."));
}

#[test]
fn arity_mismatch_is_a_runtime_error() {
    let outcome = run("fun f(a) { print a; } f(1, 2);");

    assert!(outcome.runtime_error);
    assert!(outcome.entries[0].contains("Expected 1 arguments but got 2."));
}

#[test]
fn arguments_evaluate_left_to_right() {
    let output = run_ok(
        "fun tag(label) { print label; return label; }\n\
         fun pair(a, b) { print a + b; }\n\
         pair(tag(\"first\"), tag(\"second\"));",
    );

    assert_eq!(output, "first\nsecond\nfirstsecond\n");
}

#[test]
fn clock_returns_a_positive_number() {
    assert_eq!(run_ok("print clock() > 0;"), "true\n");
}

#[test]
fn clock_rejects_arguments() {
    let outcome = run("clock(1);");

    assert!(outcome.runtime_error);
    assert!(outcome.entries[0].contains("Expected 0 arguments but got 1."));
}

// ─────────────────────────────────────────────────────────────────────────
// Driver behavior across runs (REPL-style)
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn state_persists_across_runs() {
    let buffer = SharedBuffer::default();
    let mut lox = Lox::with_output(Box::new(buffer.clone()));

    lox.run("var a = 1;");
    lox.run("print a;");

    assert_eq!(buffer.contents(), "1\n");
}

#[test]
fn closures_survive_across_runs() {
    let buffer = SharedBuffer::default();
    let mut lox = Lox::with_output(Box::new(buffer.clone()));

    lox.run(
        "fun makeCounter() { var i = 0; fun c() { i = i + 1; return i; } return c; }\n\
         var c = makeCounter();",
    );
    lox.run("print c();");
    lox.run("print c();");

    assert_eq!(buffer.contents(), "1\n2\n");
}

#[test]
fn static_error_in_one_run_does_not_poison_the_next() {
    let buffer = SharedBuffer::default();
    let mut lox = Lox::with_output(Box::new(buffer.clone()));

    lox.run("print ;");
    assert!(lox.diagnostics().had_static_error());

    // Each run starts with a clean sink.
    lox.run("print 1;");

    assert_eq!(buffer.contents(), "1\n");
}
