//! Predicate lowering tests: sorts, literal propagation, and the linearity
//! restriction, driven through parsed contract clauses.

use curlee::ast::Pred;
use curlee::diag::Diagnostic;
use curlee::lexer::lex;
use curlee::lowering::{LoweringContext, lower_node, lower_predicate};
use curlee::parser::parse;
use z3::ast::{Bool, Int};

/// Parses the predicate out of a one-clause `requires`.
fn pred_of(clause: &str) -> Pred {
    let source = format!("fn f() -> Int [ requires {clause}; ] {{ return 0; }}");
    let tokens = lex(&source).expect("lexing should succeed");
    let program = parse(&tokens).expect("parsing should succeed");
    let f = program.functions().next().expect("one function");
    f.requires_clauses[0].clone()
}

/// A lowering context with `x`, `y` (Int) and `flag` (Bool) in scope.
fn context_with_vars(z3: &z3::Context) -> LoweringContext<'_> {
    let mut ctx = LoweringContext::default();
    ctx.int_vars.insert("x".to_string(), Int::new_const(z3, "x"));
    ctx.int_vars.insert("y".to_string(), Int::new_const(z3, "y"));
    ctx.bool_vars
        .insert("flag".to_string(), Bool::new_const(z3, "flag"));
    ctx
}

fn lower(clause: &str) -> Result<(), Diagnostic> {
    let cfg = z3::Config::new();
    let z3 = z3::Context::new(&cfg);
    let ctx = context_with_vars(&z3);
    lower_predicate(&z3, &pred_of(clause), &ctx).map(|_| ())
}

fn expect_lowers(clause: &str) {
    if let Err(diag) = lower(clause) {
        panic!("{clause} should lower: {}", diag.message);
    }
}

fn expect_error(clause: &str, expected: &str) {
    let err = lower(clause).expect_err("expected lowering failure");
    assert_eq!(err.message, expected, "for clause {clause}");
}

#[test]
fn comparisons_lower_to_bool_terms() {
    for clause in ["x > 0", "x >= y", "x < 10", "x <= y", "x == y", "x != 0"] {
        expect_lowers(clause);
    }
}

#[test]
fn boolean_connectives_lower() {
    for clause in ["flag && x > 0", "flag || !flag", "!(x == 0)", "true", "false"] {
        expect_lowers(clause);
    }
}

#[test]
fn integer_top_level_is_rejected() {
    expect_error("x + 1", "predicate must resolve to Bool");
}

#[test]
fn unknown_names_are_rejected() {
    expect_error("mystery > 0", "unknown predicate name 'mystery'");
}

#[test]
fn result_is_only_bound_inside_ensures_contexts() {
    expect_error("result > 0", "unknown predicate name 'result'");

    let cfg = z3::Config::new();
    let z3 = z3::Context::new(&cfg);
    let mut ctx = context_with_vars(&z3);
    ctx.result_int = Some(Int::new_const(&z3, "result"));
    lower_predicate(&z3, &pred_of("result > 0"), &ctx).expect("bound result should lower");
}

#[test]
fn literal_multiplication_stays_linear() {
    for clause in ["2 * x > 0", "x * 3 > 0", "2 * 3 * x > 0"] {
        expect_lowers(clause);
    }
}

#[test]
fn variable_times_variable_is_rejected() {
    expect_error("x * y > 0", "non-linear multiplication is not supported");
}

#[test]
fn literal_arithmetic_keeps_the_literal_flag() {
    // (1 + 2) is still a literal, so (1 + 2) * x stays linear.
    expect_lowers("(1 + 2) * x > 0");
    // (x + 1) is not.
    expect_error("(x + 1) * y > 0", "non-linear multiplication is not supported");
}

#[test]
fn negated_literals_are_still_literals() {
    expect_lowers("-2 * x > 0");
}

#[test]
fn sort_mismatches_are_reported() {
    expect_error("flag + 1 > 0", "arithmetic operators expect Int predicates");
    expect_error("x && flag", "boolean operators expect Bool predicates");
    expect_error("flag < flag", "comparison operators expect Int predicates");
    expect_error("x == flag", "equality expects matching predicate types");
    expect_error("!x", "'!' expects Bool predicate");
    expect_error("-flag > 0", "unary '-' expects Int predicate");
}

#[test]
fn lower_node_exposes_subterm_literalness() {
    let cfg = z3::Config::new();
    let z3 = z3::Context::new(&cfg);
    let ctx = context_with_vars(&z3);

    let typed = lower_node(&z3, &pred_of("x + 1"), &ctx).expect("int subterm should lower");
    assert!(!typed.is_literal, "terms mentioning variables are not literals");

    let typed = lower_node(&z3, &pred_of("1 + 2"), &ctx).expect("literal subterm should lower");
    assert!(typed.is_literal, "pure literal arithmetic stays literal");
}
