//! Lowers contract predicates into SMT terms.
//!
//! A [`LoweringContext`] maps in-scope names to their solver symbols; the
//! distinguished name `result` binds to the return value inside `ensures`
//! clauses. Multiplication is restricted to linear forms — at least one
//! operand must be a (statically propagated) literal — to keep every query
//! inside decidable linear arithmetic.

use ahash::AHashMap;
use z3::Context;
use z3::ast::{Ast, Bool, Int};

use crate::ast::{Pred, PredNode};
use crate::diag::Diagnostic;
use crate::lexer::TokenKind;
use crate::smt::Term;
use crate::source::Span;

/// Names in scope for predicate lowering, split by sort.
#[derive(Debug, Clone, Default)]
pub struct LoweringContext<'ctx> {
    pub int_vars: AHashMap<String, Int<'ctx>>,
    pub bool_vars: AHashMap<String, Bool<'ctx>>,
    pub result_int: Option<Int<'ctx>>,
    pub result_bool: Option<Bool<'ctx>>,
}

impl<'ctx> LoweringContext<'ctx> {
    /// The term bound to `name`, resolving `result` to the result symbol of
    /// whichever sort is bound.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Term<'ctx>> {
        if name == "result" {
            if let Some(result) = &self.result_int {
                return Some(Term::Int(result.clone()));
            }
            if let Some(result) = &self.result_bool {
                return Some(Term::Bool(result.clone()));
            }
        }
        if let Some(term) = self.int_vars.get(name) {
            return Some(Term::Int(term.clone()));
        }
        if let Some(term) = self.bool_vars.get(name) {
            return Some(Term::Bool(term.clone()));
        }
        None
    }
}

/// A lowered subterm plus its literal-ness for the linearity check.
pub struct TypedTerm<'ctx> {
    pub term: Term<'ctx>,
    pub is_literal: bool,
}

impl<'ctx> TypedTerm<'ctx> {
    fn int(term: Int<'ctx>, is_literal: bool) -> Self {
        Self {
            term: Term::Int(term),
            is_literal,
        }
    }

    fn boolean(term: Bool<'ctx>) -> Self {
        Self {
            term: Term::Bool(term),
            is_literal: false,
        }
    }
}

fn error_at(span: Span, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error_at(span, message)
}

/// Lowers a predicate to a Bool term, or explains why it can't be.
pub fn lower_predicate<'ctx>(
    z3: &'ctx Context,
    pred: &Pred,
    ctx: &LoweringContext<'ctx>,
) -> Result<Bool<'ctx>, Diagnostic> {
    let typed = lower_node(z3, pred, ctx)?;
    match typed.term {
        Term::Bool(b) => Ok(b),
        Term::Int(_) => Err(error_at(pred.span, "predicate must resolve to Bool")),
    }
}

/// Lowers a predicate subterm of either sort.
pub fn lower_node<'ctx>(
    z3: &'ctx Context,
    pred: &Pred,
    ctx: &LoweringContext<'ctx>,
) -> Result<TypedTerm<'ctx>, Diagnostic> {
    match &pred.node {
        PredNode::Int(lexeme) => {
            let value: i64 = lexeme
                .parse()
                .map_err(|_| error_at(pred.span, "integer literal out of range"))?;
            Ok(TypedTerm::int(Int::from_i64(z3, value), true))
        }
        PredNode::Bool(value) => Ok(TypedTerm::boolean(Bool::from_bool(z3, *value))),
        PredNode::Name(name) => match ctx.lookup(name) {
            Some(Term::Int(term)) => Ok(TypedTerm::int(term, false)),
            Some(Term::Bool(term)) => Ok(TypedTerm::boolean(term)),
            None => Err(error_at(
                pred.span,
                format!("unknown predicate name '{name}'"),
            )),
        },
        PredNode::Unary { op, rhs } => {
            let typed = lower_node(z3, rhs, ctx)?;
            match op {
                TokenKind::Bang => match typed.term {
                    Term::Bool(b) => Ok(TypedTerm::boolean(b.not())),
                    Term::Int(_) => Err(error_at(pred.span, "'!' expects Bool predicate")),
                },
                TokenKind::Minus => match typed.term {
                    Term::Int(i) => Ok(TypedTerm::int(i.unary_minus(), typed.is_literal)),
                    Term::Bool(_) => {
                        Err(error_at(pred.span, "unary '-' expects Int predicate"))
                    }
                },
                _ => Err(error_at(pred.span, "unsupported unary operator in predicate")),
            }
        }
        PredNode::Binary { op, lhs, rhs } => {
            let left = lower_node(z3, lhs, ctx)?;
            let right = lower_node(z3, rhs, ctx)?;
            lower_binary(z3, pred.span, *op, left, right)
        }
        PredNode::Group { inner } => lower_node(z3, inner, ctx),
    }
}

fn lower_binary<'ctx>(
    z3: &'ctx Context,
    span: Span,
    op: TokenKind,
    left: TypedTerm<'ctx>,
    right: TypedTerm<'ctx>,
) -> Result<TypedTerm<'ctx>, Diagnostic> {
    match op {
        TokenKind::AndAnd | TokenKind::OrOr => {
            let (Term::Bool(l), Term::Bool(r)) = (&left.term, &right.term) else {
                return Err(error_at(span, "boolean operators expect Bool predicates"));
            };
            let combined = if op == TokenKind::AndAnd {
                Bool::and(z3, &[l, r])
            } else {
                Bool::or(z3, &[l, r])
            };
            Ok(TypedTerm::boolean(combined))
        }
        TokenKind::EqualEqual | TokenKind::BangEqual => {
            let eq = match (&left.term, &right.term) {
                (Term::Int(l), Term::Int(r)) => l._eq(r),
                (Term::Bool(l), Term::Bool(r)) => l._eq(r),
                _ => {
                    return Err(error_at(span, "equality expects matching predicate types"));
                }
            };
            let combined = if op == TokenKind::EqualEqual { eq } else { eq.not() };
            Ok(TypedTerm::boolean(combined))
        }
        TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
            let (Term::Int(l), Term::Int(r)) = (&left.term, &right.term) else {
                return Err(error_at(span, "comparison operators expect Int predicates"));
            };
            let combined = match op {
                TokenKind::Less => l.lt(r),
                TokenKind::LessEqual => l.le(r),
                TokenKind::Greater => l.gt(r),
                _ => l.ge(r),
            };
            Ok(TypedTerm::boolean(combined))
        }
        TokenKind::Plus | TokenKind::Minus => {
            let (Term::Int(l), Term::Int(r)) = (&left.term, &right.term) else {
                return Err(error_at(span, "arithmetic operators expect Int predicates"));
            };
            let combined = if op == TokenKind::Plus {
                Int::add(z3, &[l, r])
            } else {
                Int::sub(z3, &[l, r])
            };
            Ok(TypedTerm::int(combined, left.is_literal && right.is_literal))
        }
        TokenKind::Star => {
            let (Term::Int(l), Term::Int(r)) = (&left.term, &right.term) else {
                return Err(error_at(span, "'*' expects Int predicates"));
            };
            if !left.is_literal && !right.is_literal {
                return Err(error_at(span, "non-linear multiplication is not supported"));
            }
            Ok(TypedTerm::int(
                Int::mul(z3, &[l, r]),
                left.is_literal && right.is_literal,
            ))
        }
        _ => Err(error_at(span, "unsupported binary operator in predicate")),
    }
}
