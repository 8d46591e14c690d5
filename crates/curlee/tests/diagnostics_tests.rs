//! Golden tests for the user-visible diagnostic text format.

use curlee::diag::{Diagnostic, render, render_all};
use curlee::source::{LineMap, Span};

use pretty_assertions::assert_eq;

#[test]
fn error_with_location_renders_arrow_line() {
    let source = "fn main() -> Int {\n    return nope;\n}\n";
    let map = LineMap::new(source);
    let offset = source.find("nope").expect("source contains the name");
    let diag = Diagnostic::error_at(Span::new(offset, offset + 4), "unknown name 'nope'");

    assert_eq!(
        render(&diag, "demo.curlee", &map),
        "error: unknown name 'nope'\n  --> demo.curlee:2:12\n"
    );
}

#[test]
fn warning_severity_uses_its_own_label() {
    let map = LineMap::new("x");
    let diag = Diagnostic {
        severity: curlee::diag::Severity::Warning,
        message: "unused import".to_string(),
        span: None,
        notes: Vec::new(),
    };
    assert_eq!(render(&diag, "demo.curlee", &map), "warning: unused import\n");
}

#[test]
fn contract_violation_renders_goal_model_and_hint() {
    let map = LineMap::new("fn f() -> Int { return 0; }\n");
    let diag = Diagnostic::error_at(Span::new(3, 4), "requires clause not satisfied")
        .with_note("goal: (x != 0)", None)
        .with_note("model:\n  x = 0", None)
        .with_note(
            "hint: add or strengthen preconditions/refinements to satisfy this contract",
            None,
        );

    assert_eq!(
        render(&diag, "demo.curlee", &map),
        "error: requires clause not satisfied\n\
         \x20 --> demo.curlee:1:4\n\
         \x20 note: goal: (x != 0)\n\
         \x20 note: model:\n\
         \x20   x = 0\n\
         \x20 note: hint: add or strengthen preconditions/refinements to satisfy this contract\n"
    );
}

#[test]
fn related_note_spans_render_their_own_location() {
    let source = "struct P { x: Int, x: Int }\n";
    let map = LineMap::new(source);
    let first = source.find("x:").expect("first field");
    let second = source.rfind("x:").expect("second field");
    let diag = Diagnostic::error_at(Span::new(second, second + 1), "duplicate field 'x'")
        .with_note("first declared here", Some(Span::new(first, first + 1)));

    assert_eq!(
        render(&diag, "p.curlee", &map),
        "error: duplicate field 'x'\n\
         \x20 --> p.curlee:1:20\n\
         \x20 note: first declared here\n\
         \x20   --> p.curlee:1:12\n"
    );
}

#[test]
fn batches_render_in_order() {
    let map = LineMap::new("ab\ncd\n");
    let diags = vec![
        Diagnostic::error_at(Span::new(0, 1), "first"),
        Diagnostic::error_at(Span::new(3, 4), "second"),
    ];
    assert_eq!(
        render_all(&diags, "m.curlee", &map),
        "error: first\n  --> m.curlee:1:1\nerror: second\n  --> m.curlee:2:1\n"
    );
}

#[test]
fn end_to_end_verifier_output_is_stable() {
    use curlee::lexer::lex;
    use curlee::parser::parse;
    use curlee::typecheck::type_check;
    use curlee::verify::verify;

    let source = "fn pos() -> Int [ ensures result > 0; ] { return 0; }\n\
                  fn main() -> Int { return pos(); }\n";
    let tokens = lex(source).expect("lexing should succeed");
    let program = parse(&tokens).expect("parsing should succeed");
    let type_info = type_check(&program).expect("type checking should succeed");
    let diags = verify(&program, &type_info).expect_err("expected verification failure");

    let map = LineMap::new(source);
    let rendered = render_all(&diags, "demo.curlee", &map);
    assert!(
        rendered.starts_with("error: ensures clause not satisfied\n  --> demo.curlee:1:"),
        "unexpected rendering: {rendered}"
    );
    assert!(rendered.contains("note: goal: (result > 0)"), "{rendered}");
    assert!(rendered.contains("note: model:\n    result = 0"), "{rendered}");
    assert!(rendered.contains("note: hint: "), "{rendered}");
}
