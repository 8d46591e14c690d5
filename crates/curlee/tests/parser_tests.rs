//! Parser tests: grammar coverage, the canonical dump, error recovery.

use curlee::ast::{ExprId, Program, dump};
use curlee::diag::Diagnostic;
use curlee::lexer::lex;
use curlee::parser::parse;

use pretty_assertions::assert_eq;

fn parse_ok(source: &str) -> Program {
    let tokens = lex(source).expect("lexing should succeed");
    parse(&tokens).expect("parsing should succeed")
}

fn parse_err(source: &str) -> Vec<Diagnostic> {
    let tokens = lex(source).expect("lexing should succeed");
    parse(&tokens).expect_err("expected parse failure")
}

#[test]
fn simple_function_dumps_canonically() {
    let program = parse_ok("fn main() -> Int { let x: Int = 1; return x + 2; }");
    assert_eq!(
        dump(&program),
        "fn main() -> Int { let x: Int = 1; return (x + 2); }"
    );
}

#[test]
fn precedence_groups_factor_over_term() {
    let program = parse_ok("fn main() -> Int { return 1 + 2 * 3; }");
    assert_eq!(dump(&program), "fn main() -> Int { return (1 + (2 * 3)); }");
}

#[test]
fn and_binds_tighter_than_or() {
    let program = parse_ok("fn main() -> Bool { return true || false && true; }");
    assert_eq!(
        dump(&program),
        "fn main() -> Bool { return (true || (false && true)); }"
    );
}

#[test]
fn unary_operators_nest() {
    let program = parse_ok("fn main() -> Int { return - -1; }");
    assert_eq!(dump(&program), "fn main() -> Int { return - - 1; }");
}

#[test]
fn contract_clauses_parse_in_order() {
    let program = parse_ok(
        "fn f(x: Int where x > 0) -> Int [ requires x != 0; ensures result > 0; ] { return x; }",
    );
    assert_eq!(
        dump(&program),
        "fn f(x: Int where (x > 0)) -> Int [ requires (x != 0); ensures (result > 0); ] { return x; }"
    );
}

#[test]
fn struct_and_enum_declarations_parse() {
    let program = parse_ok("struct Point { x: Int, y: Int } enum Color { Red, Rgb(Int) }");
    assert_eq!(
        dump(&program),
        "struct Point { x: Int, y: Int, }\nenum Color { Red, Rgb(Int), }"
    );
}

#[test]
fn imports_parse_with_and_without_alias() {
    let program = parse_ok("import stdlib.math;\nimport stdlib.io as io;");
    assert_eq!(dump(&program), "import stdlib.math;\nimport stdlib.io as io;");
}

#[test]
fn struct_literals_and_member_access_parse() {
    let program = parse_ok(
        "struct Point { x: Int, y: Int } \
         fn main() -> Int { let p: Point = Point { x: 1, y: 2 }; return p.x; }",
    );
    assert!(dump(&program).contains("Point { x: 1, y: 2 }"));
    assert!(dump(&program).contains("return p.x;"));
}

#[test]
fn scoped_names_parse_as_variant_references() {
    let program = parse_ok("enum Color { Red } fn main() -> Color { return Color::Red; }");
    assert!(dump(&program).contains("return Color::Red;"));
}

#[test]
fn unsafe_and_nested_blocks_parse() {
    let program = parse_ok("fn main() -> Int { unsafe { python_ffi.call(); } { return 1; } }");
    assert_eq!(
        dump(&program),
        "fn main() -> Int { unsafe { python_ffi.call(); } { return 1; } }"
    );
}

#[test]
fn capability_types_parse() {
    let program = parse_ok("fn f(c: cap Net) -> Unit { return; }");
    assert_eq!(dump(&program), "fn f(c: cap Net) -> Unit { return; }");
}

#[test]
fn expr_ids_are_unique_and_preorder() {
    let program = parse_ok("fn main() -> Int { let x: Int = 1 + 2; return x; }");
    let mut ids: Vec<ExprId> = Vec::new();
    for f in program.functions() {
        for stmt in &f.body.stmts {
            collect_ids(stmt, &mut ids);
        }
    }
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len(), "ids must be unique: {ids:?}");
}

fn collect_ids(stmt: &curlee::ast::Stmt, ids: &mut Vec<ExprId>) {
    use curlee::ast::{Expr, ExprNode, StmtNode};

    fn walk(expr: &Expr, ids: &mut Vec<ExprId>) {
        ids.push(expr.id);
        match &expr.node {
            ExprNode::Member { base, .. } => walk(base, ids),
            ExprNode::Unary { rhs, .. } => walk(rhs, ids),
            ExprNode::Binary { lhs, rhs, .. } => {
                walk(lhs, ids);
                walk(rhs, ids);
            }
            ExprNode::Call { callee, args } => {
                walk(callee, ids);
                for arg in args {
                    walk(arg, ids);
                }
            }
            ExprNode::Group { inner } => walk(inner, ids),
            ExprNode::StructLiteral { fields, .. } => {
                for field in fields {
                    walk(&field.value, ids);
                }
            }
            _ => {}
        }
    }

    match &stmt.node {
        StmtNode::Let { value, .. } => walk(value, ids),
        StmtNode::Return { value } => {
            if let Some(value) = value {
                walk(value, ids);
            }
        }
        StmtNode::Expr { expr } => walk(expr, ids),
        _ => {}
    }
}

#[test]
fn token_spans_slice_back_to_the_source() {
    let source = "fn main() -> Int { return 1; }";
    for token in lex(source).expect("lexing should succeed") {
        assert_eq!(&source[token.span.start..token.span.end], token.lexeme);
    }
}

#[test]
fn top_level_recovery_collects_multiple_errors() {
    let diags = parse_err("fn () -> Int { return 1; } fn also bad() {} fn ok() -> Int { return 2; }");
    assert!(diags.len() >= 2, "expected recovery to find several errors: {diags:?}");
}

#[test]
fn recovery_continues_after_a_bad_statement() {
    let diags = parse_err("fn main() -> Int { let = 1; return 2 }");
    // Both the malformed let and the missing semicolon are reported.
    assert!(diags.len() >= 2, "expected two diagnostics: {diags:?}");
    assert!(
        diags[0].message.contains("expected identifier after 'let'"),
        "unexpected first diagnostic: {}",
        diags[0].message
    );
}

#[test]
fn missing_expression_is_reported_at_the_offending_token() {
    let diags = parse_err("fn main() -> Int { return +; }");
    assert!(diags[0].message.contains("expected expression"));
    assert!(diags[0].span.is_some());
}

#[test]
fn bare_return_parses_as_empty_return() {
    let program = parse_ok("fn main() -> Unit { return; }");
    assert_eq!(dump(&program), "fn main() -> Unit { return; }");
}

#[test]
fn duplicate_struct_field_reports_with_related_note() {
    let diags = parse_err("struct Point { x: Int, x: Int }");
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("duplicate field 'x'"));
    assert_eq!(diags[0].notes.len(), 1);
    assert!(diags[0].notes[0].span.is_some(), "note should point at the first occurrence");
}

#[test]
fn duplicate_enum_variant_reports_with_related_note() {
    let diags = parse_err("enum Color { Red, Red }");
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("duplicate variant 'Red'"));
    assert_eq!(diags[0].notes.len(), 1);
}

#[test]
fn duplicate_struct_literal_field_reports_with_related_note() {
    let diags = parse_err(
        "struct P { x: Int } fn main() -> P { return P { x: 1, x: 2 }; }",
    );
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("duplicate field 'x' in struct literal"));
}

#[test]
fn diagnostics_arrive_in_source_order() {
    let diags = parse_err("fn one( { } fn two( { }");
    assert!(diags.len() >= 2);
    let spans: Vec<usize> = diags.iter().filter_map(|d| d.span.map(|s| s.start)).collect();
    let mut sorted = spans.clone();
    sorted.sort_unstable();
    assert_eq!(spans, sorted, "diagnostics should be in source order");
}
