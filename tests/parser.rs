use rlox::ast::Stmt;
use rlox::ast_printer::AstPrinter;
use rlox::diagnostics::Diagnostics;
use rlox::parser::Parser;
use rlox::scanner::Scanner;
use rlox::token::Token;

fn parse_source(source: &str) -> (Vec<Stmt>, Diagnostics) {
    let mut diagnostics = Diagnostics::new();

    let tokens: Vec<Token> = Scanner::new(source.as_bytes())
        .filter_map(Result::ok)
        .collect();

    let mut parser = Parser::new(tokens, &mut diagnostics);
    let statements = parser.parse();

    (statements, diagnostics)
}

/// Parses a single statement and returns its prefix form.
fn parse_to_string(source: &str) -> String {
    let (statements, diagnostics) = parse_source(source);

    assert!(
        !diagnostics.had_static_error(),
        "unexpected parse errors: {:?}",
        diagnostics.entries()
    );
    assert_eq!(statements.len(), 1);

    AstPrinter::print_stmt(&statements[0])
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_eq!(
        parse_to_string("print 1 + 2 * 3;"),
        "(print (+ 1.0 (* 2.0 3.0)))"
    );
}

#[test]
fn modulo_sits_with_slash_and_star() {
    assert_eq!(
        parse_to_string("4 % 2 / 1;"),
        "(expr (/ (% 4.0 2.0) 1.0))"
    );
}

#[test]
fn comparison_binds_tighter_than_equality() {
    assert_eq!(
        parse_to_string("1 < 2 == true;"),
        "(expr (== (< 1.0 2.0) true))"
    );
}

#[test]
fn unary_and_grouping() {
    assert_eq!(
        parse_to_string("-(1 + 2) * !done;"),
        "(expr (* (- (group (+ 1.0 2.0))) (! done)))"
    );
}

#[test]
fn assignment_is_right_associative() {
    assert_eq!(parse_to_string("a = b = 1;"), "(expr (= a (= b 1.0)))");
}

#[test]
fn ternary_is_right_associative() {
    assert_eq!(
        parse_to_string("1 ? 2 : 3 ? 4 : 5;"),
        "(expr (?: 1.0 2.0 (?: 3.0 4.0 5.0)))"
    );
}

#[test]
fn comma_chains_left_associative() {
    assert_eq!(
        parse_to_string("1, 2, 3;"),
        "(expr (, (, 1.0 2.0) 3.0))"
    );
}

#[test]
fn comma_binds_below_and() {
    assert_eq!(
        parse_to_string("1 and 2, 3;"),
        "(expr (and 1.0 (, 2.0 3.0)))"
    );
}

#[test]
fn logical_or_binds_below_and() {
    assert_eq!(
        parse_to_string("a or b and c;"),
        "(expr (or a (and b c)))"
    );
}

#[test]
fn calls_chain_and_take_conditional_arguments() {
    assert_eq!(
        parse_to_string("f(1, 2)(3);"),
        "(expr (call (call f 1.0 2.0) 3.0))"
    );
}

#[test]
fn for_loop_desugars_to_while() {
    assert_eq!(
        parse_to_string("for (var i = 0; i < 3; i = i + 1) print i;"),
        "(block (var i 0.0) (while (< i 3.0) (block (print i) (expr (= i (+ i 1.0))))))"
    );
}

#[test]
fn for_loop_without_clauses_gets_a_true_condition() {
    assert_eq!(
        parse_to_string("for (;;) break;"),
        "(while true (break))"
    );
}

#[test]
fn function_declaration_parses_params_and_body() {
    assert_eq!(
        parse_to_string("fun add(a, b) { return a + b; }"),
        "(fun add (a b) (return (+ a b)))"
    );
}

#[test]
fn if_else_attaches_to_nearest_if() {
    assert_eq!(
        parse_to_string("if (a) if (b) print 1; else print 2;"),
        "(if a (if b (print 1.0) (print 2.0)))"
    );
}

#[test]
fn invalid_assignment_target_is_reported_but_parsing_continues() {
    let (statements, diagnostics) = parse_source("1 = 2; print 3;");

    assert!(diagnostics.had_static_error());
    assert!(diagnostics.entries()[0].contains("Invalid assignment target."));

    // Both statements survive.
    assert_eq!(statements.len(), 2);
}

#[test]
fn missing_left_operand_names_the_operator_and_substitutes_nil() {
    let (statements, diagnostics) = parse_source("* 2;");

    assert!(diagnostics.had_static_error());
    assert!(diagnostics.entries()[0].contains("Missing left-hand operand before '*'."));

    assert_eq!(AstPrinter::print_stmt(&statements[0]), "(expr (* nil 2.0))");
}

#[test]
fn panic_mode_recovers_at_the_next_statement() {
    let (statements, diagnostics) = parse_source("var = 1; print 2;");

    assert!(diagnostics.had_static_error());
    assert!(diagnostics.entries()[0].contains("Expect variable name."));

    // The bad declaration is dropped, the next one is parsed.
    assert_eq!(statements.len(), 1);
    assert_eq!(AstPrinter::print_stmt(&statements[0]), "(print 2.0)");
}

#[test]
fn missing_close_paren_is_reported() {
    let (_, diagnostics) = parse_source("(1;");

    assert!(diagnostics.had_static_error());
    assert!(diagnostics.entries()[0].contains("Expect ')' after expression."));
}

#[test]
fn error_at_eof_renders_at_end() {
    let (_, diagnostics) = parse_source("print 1");

    assert!(diagnostics.had_static_error());
    assert!(diagnostics.entries()[0].contains("at end"));
}

#[test]
fn full_ladder_shape() {
    assert_eq!(
        parse_to_string("print 1 + 2 * -3 == 0 ? a : b;"),
        "(print (?: (== (+ 1.0 (* 2.0 (- 3.0))) 0.0) a b))"
    );
}
