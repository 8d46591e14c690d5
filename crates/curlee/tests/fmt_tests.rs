//! Canonical-form tests: the dump is stable and reparses to itself.

use curlee::ast::dump;
use curlee::lexer::lex;
use curlee::parser::parse;

use pretty_assertions::assert_eq;

fn canonical(source: &str) -> String {
    let tokens = lex(source).expect("lexing should succeed");
    let program = parse(&tokens).expect("parsing should succeed");
    dump(&program)
}

/// Formatting a formatted program changes nothing.
fn assert_idempotent(source: &str) {
    let once = canonical(source);
    let twice = canonical(&once);
    assert_eq!(once, twice, "canonical form must be a fixed point");
}

#[test]
fn whitespace_and_comments_normalize_away() {
    let source = "fn   main( )->Int{// trailing\n  return/*x*/1+2 ;}";
    assert_eq!(canonical(source), "fn main() -> Int { return (1 + 2); }");
}

#[test]
fn canonical_form_is_idempotent_for_core_constructs() {
    assert_idempotent("fn main() -> Int { let x: Int = 1; return x + 2; }");
    assert_idempotent("fn main() -> Int { if (true) { return 1; } else { return 2; } }");
    assert_idempotent("fn main() -> Int { while (false) { return 1; } return 0; }");
    assert_idempotent("fn main() -> Unit { return; }");
}

#[test]
fn canonical_form_is_idempotent_for_declarations() {
    assert_idempotent("struct Point { x: Int, y: Int }");
    assert_idempotent("enum Color { Red, Rgb(Int) }");
    assert_idempotent("import stdlib.math as math;");
    assert_idempotent(
        "fn f(x: Int where x > 0) -> Int [ requires x != 0; ensures result > 0; ] { return x; }",
    );
}

#[test]
fn canonical_form_is_idempotent_for_expressions() {
    assert_idempotent("fn main() -> Bool { return !true || false && (1 < 2); }");
    assert_idempotent("fn main() -> String { return \"a\" + \"b\"; }");
    assert_idempotent(
        "struct P { x: Int } fn main() -> Int { let p: P = P { x: 1 }; return p.x; }",
    );
    assert_idempotent("enum C { R } fn main() -> C { return C::R; }");
    assert_idempotent("fn main() -> Int { unsafe { python_ffi.call(); } return 0; }");
}

#[test]
fn grouped_binaries_do_not_double_parenthesize() {
    assert_eq!(
        canonical("fn main() -> Int { return (1 + 2) * 3; }"),
        "fn main() -> Int { return ((1 + 2) * 3); }"
    );
    assert_idempotent("fn main() -> Int { return (1 + 2) * 3; }");
}

#[test]
fn grouped_names_keep_their_parentheses() {
    assert_idempotent("fn main() -> Int { let x: Int = 1; return (x); }");
}

#[test]
fn string_lexemes_are_preserved_verbatim() {
    let source = "fn main() -> String { return \"a\\nb\"; }";
    assert_eq!(canonical(source), "fn main() -> String { return \"a\\nb\"; }");
}

#[test]
fn multiple_items_are_separated_by_newlines() {
    let source = "import dep; fn a() -> Int { return 1; } fn main() -> Int { return a(); }";
    assert_eq!(
        canonical(source),
        "import dep;\nfn a() -> Int { return 1; }\nfn main() -> Int { return a(); }"
    );
}
