//! The contract verifier.
//!
//! For every function, parameter refinements and `requires` clauses become
//! facts; every call site must prove the callee's `requires`, and every
//! `return` must prove the function's `ensures`. Obligations are discharged
//! by asking the solver whether `facts ∧ extra ∧ ¬goal` is satisfiable
//! inside a push/pop pair: `Sat` is a violation (with a counterexample
//! model), `Unknown` is a violation (the solver gave up), `Unsat` is a pass.
//!
//! Only Int and Bool values participate. Other types flow through programs
//! unverified; a refinement attached to one is an error, everything else
//! about them is silently ignored here.

use ahash::AHashMap;
use z3::Context;
use z3::ast::{Ast, Bool, Int};

use crate::ast::{
    Block, Expr, ExprNode, Function, Pred, Program, Stmt, StmtNode, TypeName, collect_pred_names,
    pred_to_string,
};
use crate::diag::Diagnostic;
use crate::lexer::TokenKind;
use crate::lowering::{LoweringContext, lower_predicate};
use crate::smt::{CheckResult, Solver, Term};
use crate::source::Span;
use crate::types::{Type, TypeInfo, core_type_from_name};

/// Verifies every function contract in the program.
pub fn verify(program: &Program, type_info: &TypeInfo) -> Result<(), Vec<Diagnostic>> {
    let cfg = z3::Config::new();
    let ctx = Context::new(&cfg);
    Verifier::new(&ctx, type_info).run(program)
}

/// The two sorts the verifier reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sort {
    Int,
    Bool,
}

fn scalar_sort(name: &TypeName) -> Option<Sort> {
    if name.is_capability {
        return None;
    }
    match core_type_from_name(&name.name) {
        Some(Type::Int) => Some(Sort::Int),
        Some(Type::Bool) => Some(Sort::Bool),
        _ => None,
    }
}

struct FunctionSig<'p> {
    decl: &'p Function,
    /// Parameter sorts; `None` marks a non-participating parameter.
    params: Vec<Option<Sort>>,
    /// `None` when the declared return type is non-scalar.
    result: Option<Sort>,
}

/// Snapshot taken on scope entry so `pop_scope` can restore the lowering
/// environment and drop facts added inside the scope.
struct ScopeState<'ctx> {
    int_vars: AHashMap<String, Int<'ctx>>,
    bool_vars: AHashMap<String, Bool<'ctx>>,
    facts_len: usize,
}

/// A lowered runtime expression: its term plus literal-ness.
struct ExprValue<'ctx> {
    term: Term<'ctx>,
    is_literal: bool,
}

struct Verifier<'p, 'ctx> {
    z3: &'ctx Context,
    type_info: &'p TypeInfo,
    solver: Solver<'ctx>,
    lower_ctx: LoweringContext<'ctx>,
    facts: Vec<Bool<'ctx>>,
    scopes: Vec<ScopeState<'ctx>>,
    functions: AHashMap<String, FunctionSig<'p>>,
    diags: Vec<Diagnostic>,
}

impl<'p, 'ctx> Verifier<'p, 'ctx> {
    fn new(z3: &'ctx Context, type_info: &'p TypeInfo) -> Self {
        Self {
            z3,
            type_info,
            solver: Solver::new(z3),
            lower_ctx: LoweringContext::default(),
            facts: Vec::new(),
            scopes: Vec::new(),
            functions: AHashMap::new(),
            diags: Vec::new(),
        }
    }

    fn run(mut self, program: &'p Program) -> Result<(), Vec<Diagnostic>> {
        self.collect_signatures(program);

        for f in program.functions() {
            self.check_function(f);
        }

        if self.diags.is_empty() {
            Ok(())
        } else {
            Err(self.diags)
        }
    }

    fn error_at(&mut self, span: Span, message: impl Into<String>) {
        self.diags.push(Diagnostic::error_at(span, message));
    }

    fn collect_signatures(&mut self, program: &'p Program) {
        for f in program.functions() {
            let Some(return_type) = &f.return_type else {
                continue;
            };
            let sig = FunctionSig {
                decl: f,
                params: f.params.iter().map(|p| scalar_sort(&p.ty)).collect(),
                result: scalar_sort(return_type),
            };
            self.functions.entry(f.name.clone()).or_insert(sig);
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(ScopeState {
            int_vars: self.lower_ctx.int_vars.clone(),
            bool_vars: self.lower_ctx.bool_vars.clone(),
            facts_len: self.facts.len(),
        });
    }

    fn pop_scope(&mut self) {
        let Some(state) = self.scopes.pop() else {
            return;
        };
        self.lower_ctx.int_vars = state.int_vars;
        self.lower_ctx.bool_vars = state.bool_vars;
        self.facts.truncate(state.facts_len);
    }

    fn declare_var(&mut self, name: &str, sort: Sort) {
        match sort {
            Sort::Int => {
                self.lower_ctx
                    .int_vars
                    .insert(name.to_string(), Int::new_const(self.z3, name));
            }
            Sort::Bool => {
                self.lower_ctx
                    .bool_vars
                    .insert(name.to_string(), Bool::new_const(self.z3, name));
            }
        }
    }

    fn add_fact(&mut self, pred: &Pred) {
        match lower_predicate(self.z3, pred, &self.lower_ctx) {
            Ok(fact) => self.facts.push(fact),
            Err(diag) => self.diags.push(diag),
        }
    }

    // --- expression lowering --------------------------------------------

    fn lower_expr(&self, expr: &Expr) -> Result<ExprValue<'ctx>, Diagnostic> {
        match &expr.node {
            ExprNode::Int(lexeme) => {
                let value: i64 = lexeme.parse().map_err(|_| {
                    Diagnostic::error_at(expr.span, "integer literal out of range")
                })?;
                Ok(ExprValue {
                    term: Term::Int(Int::from_i64(self.z3, value)),
                    is_literal: true,
                })
            }
            ExprNode::Bool(value) => Ok(ExprValue {
                term: Term::Bool(Bool::from_bool(self.z3, *value)),
                is_literal: true,
            }),
            ExprNode::String(_) => Err(Diagnostic::error_at(
                expr.span,
                "verification does not support String expressions",
            )),
            ExprNode::Name(name) => {
                if let Some(term) = self.lower_ctx.lookup(name) {
                    return Ok(ExprValue {
                        term,
                        is_literal: false,
                    });
                }
                // A name the type checker accepted but we didn't declare is
                // a non-scalar binding.
                if self.type_info.expr_types.contains_key(&expr.id) {
                    return Err(Diagnostic::error_at(
                        expr.span,
                        "unsupported expression in verification",
                    ));
                }
                Err(Diagnostic::error_at(
                    expr.span,
                    format!("unknown name '{name}'"),
                ))
            }
            ExprNode::Unary { op, rhs } => {
                let rhs = self.lower_expr(rhs)?;
                match op {
                    TokenKind::Minus => match rhs.term {
                        Term::Int(i) => Ok(ExprValue {
                            term: Term::Int(i.unary_minus()),
                            is_literal: rhs.is_literal,
                        }),
                        Term::Bool(_) => Err(Diagnostic::error_at(
                            expr.span,
                            "unary '-' expects Int expression",
                        )),
                    },
                    TokenKind::Bang => match rhs.term {
                        Term::Bool(b) => Ok(ExprValue {
                            term: Term::Bool(b.not()),
                            is_literal: false,
                        }),
                        Term::Int(_) => Err(Diagnostic::error_at(
                            expr.span,
                            "unary '!' expects Bool expression",
                        )),
                    },
                    _ => Err(Diagnostic::error_at(
                        expr.span,
                        "unsupported unary operator in expression",
                    )),
                }
            }
            ExprNode::Binary { op, lhs, rhs } => {
                let left = self.lower_expr(lhs)?;
                let right = self.lower_expr(rhs)?;
                self.lower_binary_expr(expr.span, *op, left, right)
            }
            ExprNode::Call { .. } => Err(Diagnostic::error_at(
                expr.span,
                "calls are not supported in verification expressions",
            )),
            ExprNode::Group { inner } => self.lower_expr(inner),
            ExprNode::ScopedName { .. }
            | ExprNode::Member { .. }
            | ExprNode::StructLiteral { .. } => Err(Diagnostic::error_at(
                expr.span,
                "unsupported expression in verification",
            )),
        }
    }

    fn lower_binary_expr(
        &self,
        span: Span,
        op: TokenKind,
        left: ExprValue<'ctx>,
        right: ExprValue<'ctx>,
    ) -> Result<ExprValue<'ctx>, Diagnostic> {
        match op {
            TokenKind::Plus | TokenKind::Minus => {
                let (Term::Int(l), Term::Int(r)) = (&left.term, &right.term) else {
                    return Err(Diagnostic::error_at(span, "arithmetic expects Int expressions"));
                };
                let term = if op == TokenKind::Plus {
                    Int::add(self.z3, &[l, r])
                } else {
                    Int::sub(self.z3, &[l, r])
                };
                Ok(ExprValue {
                    term: Term::Int(term),
                    is_literal: left.is_literal && right.is_literal,
                })
            }
            TokenKind::Star => {
                let (Term::Int(l), Term::Int(r)) = (&left.term, &right.term) else {
                    return Err(Diagnostic::error_at(span, "'*' expects Int expressions"));
                };
                if !left.is_literal && !right.is_literal {
                    return Err(Diagnostic::error_at(
                        span,
                        "non-linear multiplication is not supported",
                    ));
                }
                Ok(ExprValue {
                    term: Term::Int(Int::mul(self.z3, &[l, r])),
                    is_literal: left.is_literal && right.is_literal,
                })
            }
            TokenKind::EqualEqual | TokenKind::BangEqual => {
                let eq = match (&left.term, &right.term) {
                    (Term::Int(l), Term::Int(r)) => l._eq(r),
                    (Term::Bool(l), Term::Bool(r)) => l._eq(r),
                    _ => {
                        return Err(Diagnostic::error_at(
                            span,
                            "equality expects matching expression types",
                        ));
                    }
                };
                Ok(ExprValue {
                    term: Term::Bool(if op == TokenKind::EqualEqual { eq } else { eq.not() }),
                    is_literal: false,
                })
            }
            TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
                let (Term::Int(l), Term::Int(r)) = (&left.term, &right.term) else {
                    return Err(Diagnostic::error_at(span, "comparison expects Int expressions"));
                };
                let term = match op {
                    TokenKind::Less => l.lt(r),
                    TokenKind::LessEqual => l.le(r),
                    TokenKind::Greater => l.gt(r),
                    _ => l.ge(r),
                };
                Ok(ExprValue {
                    term: Term::Bool(term),
                    is_literal: false,
                })
            }
            TokenKind::AndAnd | TokenKind::OrOr => {
                let (Term::Bool(l), Term::Bool(r)) = (&left.term, &right.term) else {
                    return Err(Diagnostic::error_at(
                        span,
                        "boolean operators expect Bool expressions",
                    ));
                };
                let term = if op == TokenKind::AndAnd {
                    Bool::and(self.z3, &[l, r])
                } else {
                    Bool::or(self.z3, &[l, r])
                };
                Ok(ExprValue {
                    term: Term::Bool(term),
                    is_literal: false,
                })
            }
            _ => Err(Diagnostic::error_at(
                span,
                "unsupported binary operator in expression",
            )),
        }
    }

    // --- obligations -----------------------------------------------------

    /// Variables mentioned by the goal, paired with their solver terms, for
    /// counterexample extraction.
    fn model_vars_for_pred(
        pred: &Pred,
        ctx: &LoweringContext<'ctx>,
    ) -> Vec<(String, Term<'ctx>)> {
        let mut names = Vec::new();
        collect_pred_names(pred, &mut names);

        let mut vars = Vec::new();
        for name in names {
            if let Some(term) = ctx.lookup(&name) {
                vars.push((name, term));
            }
        }
        vars
    }

    fn check_obligation(
        &mut self,
        pred: &Pred,
        ctx: &LoweringContext<'ctx>,
        obligation: &Bool<'ctx>,
        span: Span,
        extra_facts: &[Bool<'ctx>],
        message: &str,
    ) {
        self.solver.push();
        for fact in &self.facts {
            self.solver.assert(fact);
        }
        for fact in extra_facts {
            self.solver.assert(fact);
        }
        self.solver.assert(&obligation.not());
        let result = self.solver.check();

        match result {
            CheckResult::Sat => {
                let mut diag = Diagnostic::error_at(span, message)
                    .with_note(format!("goal: {}", pred_to_string(pred)), None);
                let entries = self
                    .solver
                    .model_entries(&Self::model_vars_for_pred(pred, ctx));
                if !entries.is_empty() {
                    diag = diag.with_note(
                        format!("model:\n{}", Solver::format_model(&entries)),
                        None,
                    );
                }
                diag = diag.with_note(
                    "hint: add or strengthen preconditions/refinements to satisfy this contract",
                    None,
                );
                self.diags.push(diag);
            }
            CheckResult::Unknown => {
                let diag =
                    Diagnostic::error_at(span, format!("{message} (solver returned unknown)"))
                        .with_note(format!("goal: {}", pred_to_string(pred)), None)
                        .with_note(
                            "hint: add or strengthen preconditions/refinements to satisfy this contract",
                            None,
                        );
                self.diags.push(diag);
            }
            CheckResult::Unsat => {}
        }

        self.solver.pop();
    }

    fn check_call(&mut self, callee: &Expr, args: &[Expr]) {
        let ExprNode::Name(callee_name) = &callee.node else {
            return;
        };
        let Some(sig) = self.functions.get(callee_name.as_str()) else {
            return;
        };
        if args.len() != sig.decl.params.len() {
            return;
        }
        let decl = sig.decl;
        let param_sorts = sig.params.clone();

        let mut call_facts = Vec::new();
        let mut call_ctx = LoweringContext::default();

        for ((param, sort), arg) in decl.params.iter().zip(&param_sorts).zip(args) {
            let Some(sort) = sort else {
                // Non-scalar arguments don't participate in obligations.
                continue;
            };
            let lowered = match self.lower_expr(arg) {
                Ok(value) => value,
                Err(diag) => {
                    self.diags.push(diag);
                    return;
                }
            };
            let sym_name = format!("{callee_name}::{}", param.name);
            match (sort, lowered.term) {
                (Sort::Int, Term::Int(arg_term)) => {
                    let sym = Int::new_const(self.z3, sym_name.as_str());
                    call_facts.push(sym._eq(&arg_term));
                    call_ctx.int_vars.insert(param.name.clone(), sym);
                }
                (Sort::Bool, Term::Bool(arg_term)) => {
                    let sym = Bool::new_const(self.z3, sym_name.as_str());
                    call_facts.push(sym._eq(&arg_term));
                    call_ctx.bool_vars.insert(param.name.clone(), sym);
                }
                // Sort mismatches are type errors; the pipeline never gets
                // here with one.
                _ => return,
            }
        }

        for req in &decl.requires_clauses {
            match lower_predicate(self.z3, req, &call_ctx) {
                Ok(obligation) => {
                    self.check_obligation(
                        req,
                        &call_ctx,
                        &obligation,
                        req.span,
                        &call_facts,
                        "requires clause not satisfied",
                    );
                }
                Err(diag) => self.diags.push(diag),
            }
        }
    }

    fn is_python_ffi_call(callee: &Expr) -> bool {
        let ExprNode::Member { base, member, .. } = &callee.node else {
            return false;
        };
        let ExprNode::Name(base_name) = &base.node else {
            return false;
        };
        base_name == "python_ffi" && member == "call"
    }

    /// Visits every subexpression, discharging obligations for each call
    /// with a known signature. The FFI intrinsic itself is a no-op but its
    /// arguments are still visited.
    fn check_expr_for_calls(&mut self, expr: &Expr) {
        match &expr.node {
            ExprNode::Call { callee, args } => {
                if !Self::is_python_ffi_call(callee) {
                    self.check_call(callee, args);
                }
                for arg in args {
                    self.check_expr_for_calls(arg);
                }
            }
            ExprNode::Member { base, .. } => self.check_expr_for_calls(base),
            ExprNode::Unary { rhs, .. } => self.check_expr_for_calls(rhs),
            ExprNode::Binary { lhs, rhs, .. } => {
                self.check_expr_for_calls(lhs);
                self.check_expr_for_calls(rhs);
            }
            ExprNode::Group { inner } => self.check_expr_for_calls(inner),
            ExprNode::StructLiteral { fields, .. } => {
                for field in fields {
                    self.check_expr_for_calls(&field.value);
                }
            }
            ExprNode::Int(_)
            | ExprNode::Bool(_)
            | ExprNode::String(_)
            | ExprNode::Name(_)
            | ExprNode::ScopedName { .. } => {}
        }
    }

    fn check_return(&mut self, value: &Expr, decl: &'p Function, result: Option<Sort>) {
        if decl.ensures.is_empty() {
            return;
        }
        let Some(result_sort) = result else {
            return;
        };

        let lowered = match self.lower_expr(value) {
            Ok(value) => value,
            Err(diag) => {
                self.diags.push(diag);
                return;
            }
        };

        let mut ensure_ctx = self.lower_ctx.clone();
        let mut ensure_facts = Vec::new();
        match (result_sort, lowered.term) {
            (Sort::Int, Term::Int(value_term)) => {
                let result = Int::new_const(self.z3, "result");
                ensure_facts.push(result._eq(&value_term));
                ensure_ctx.result_int = Some(result);
            }
            (Sort::Bool, Term::Bool(value_term)) => {
                let result = Bool::new_const(self.z3, "result");
                ensure_facts.push(result._eq(&value_term));
                ensure_ctx.result_bool = Some(result);
            }
            _ => return,
        }

        for ens in &decl.ensures {
            match lower_predicate(self.z3, ens, &ensure_ctx) {
                Ok(obligation) => {
                    self.check_obligation(
                        ens,
                        &ensure_ctx,
                        &obligation,
                        ens.span,
                        &ensure_facts,
                        "ensures clause not satisfied",
                    );
                }
                Err(diag) => self.diags.push(diag),
            }
        }
    }

    fn check_block_scoped(&mut self, block: &Block, decl: &'p Function, result: Option<Sort>) {
        self.push_scope();
        for stmt in &block.stmts {
            self.check_stmt(stmt, decl, result);
        }
        self.pop_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt, decl: &'p Function, result: Option<Sort>) {
        match &stmt.node {
            StmtNode::Let {
                name,
                name_span,
                ty,
                refinement,
                value,
            } => {
                match scalar_sort(ty) {
                    Some(sort) => {
                        self.declare_var(name, sort);
                        if let Some(refinement) = refinement {
                            self.add_fact(refinement);
                        }
                    }
                    None => {
                        if refinement.is_some() {
                            self.error_at(
                                *name_span,
                                format!(
                                    "verification does not support refinements on non-scalar '{name}'"
                                ),
                            );
                        }
                    }
                }
                self.check_expr_for_calls(value);
            }
            StmtNode::Return { value } => {
                if let Some(value) = value {
                    self.check_expr_for_calls(value);
                    self.check_return(value, decl, result);
                }
            }
            StmtNode::Expr { expr } => self.check_expr_for_calls(expr),
            StmtNode::If {
                cond,
                then_block,
                else_block,
            } => {
                self.check_expr_for_calls(cond);
                self.check_block_scoped(then_block, decl, result);
                if let Some(else_block) = else_block {
                    self.check_block_scoped(else_block, decl, result);
                }
            }
            StmtNode::While { cond, body } => {
                self.check_expr_for_calls(cond);
                self.check_block_scoped(body, decl, result);
            }
            StmtNode::Block { block } => self.check_block_scoped(block, decl, result),
            StmtNode::Unsafe { body } => self.check_block_scoped(body, decl, result),
        }
    }

    fn check_function(&mut self, f: &'p Function) {
        let Some(sig) = self.functions.get(f.name.as_str()) else {
            return;
        };
        if !std::ptr::eq(sig.decl, f) {
            // A duplicate declaration owns the signature; the emitter
            // reports the duplication.
            return;
        }
        let result = sig.result;
        let param_sorts = sig.params.clone();

        self.lower_ctx = LoweringContext::default();
        self.facts.clear();
        self.scopes.clear();

        self.push_scope();
        for (param, sort) in f.params.iter().zip(&param_sorts) {
            match sort {
                Some(sort) => {
                    self.declare_var(&param.name, *sort);
                    if let Some(refinement) = &param.refinement {
                        self.add_fact(refinement);
                    }
                }
                None => {
                    if param.refinement.is_some() {
                        self.error_at(
                            param.span,
                            format!(
                                "verification does not support refinements on non-scalar '{}'",
                                param.name
                            ),
                        );
                    }
                }
            }
        }

        for req in &f.requires_clauses {
            self.add_fact(req);
        }

        for stmt in &f.body.stmts {
            self.check_stmt(stmt, f, result);
        }

        self.pop_scope();
    }
}
