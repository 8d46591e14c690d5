//! Thin facade over the SMT solver.
//!
//! The verifier only ever touches the solver through this interface: `push`,
//! `pop`, `assert`, `check`, and model extraction for named variables. All
//! queries run under a resource limit so a query that would otherwise hang
//! comes back as [`CheckResult::Unknown`] (which the verifier treats as a
//! failure). Nothing outside this module and the lowering code names z3
//! types directly.

use z3::ast::{Bool, Int};
use z3::{Context, Params, SatResult};

/// Resource limit applied to every obligation query.
///
/// This bounds solver work (not wall-clock directly); queries that exceed it
/// return `Unknown` instead of hanging the compiler.
const SOLVER_RLIMIT: u32 = 5_000_000;

/// Outcome of a satisfiability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    Sat,
    Unsat,
    Unknown,
}

/// An SMT term of one of the two sorts the language verifies.
#[derive(Debug, Clone)]
pub enum Term<'ctx> {
    Int(Int<'ctx>),
    Bool(Bool<'ctx>),
}

/// The solver handle used for obligation checking.
pub struct Solver<'ctx> {
    inner: z3::Solver<'ctx>,
}

impl<'ctx> Solver<'ctx> {
    #[must_use]
    pub fn new(ctx: &'ctx Context) -> Self {
        let solver = z3::Solver::new(ctx);
        let mut params = Params::new(ctx);
        params.set_u32("rlimit", SOLVER_RLIMIT);
        solver.set_params(&params);
        Self { inner: solver }
    }

    pub fn push(&self) {
        self.inner.push();
    }

    pub fn pop(&self) {
        self.inner.pop(1);
    }

    pub fn assert(&self, fact: &Bool<'ctx>) {
        self.inner.assert(fact);
    }

    #[must_use]
    pub fn check(&self) -> CheckResult {
        match self.inner.check() {
            SatResult::Sat => CheckResult::Sat,
            SatResult::Unsat => CheckResult::Unsat,
            SatResult::Unknown => CheckResult::Unknown,
        }
    }

    /// Evaluates the given named terms in the current model.
    ///
    /// Only meaningful directly after a `Sat` check. Variables the model
    /// does not constrain are skipped.
    #[must_use]
    pub fn model_entries(&self, vars: &[(String, Term<'ctx>)]) -> Vec<(String, String)> {
        let Some(model) = self.inner.get_model() else {
            return Vec::new();
        };
        let mut entries = Vec::new();
        for (name, term) in vars {
            let rendered = match term {
                Term::Int(ast) => model
                    .eval(ast, false)
                    .and_then(|v| v.as_i64())
                    .map(|v| v.to_string()),
                Term::Bool(ast) => model
                    .eval(ast, false)
                    .and_then(|v| v.as_bool())
                    .map(|v| v.to_string()),
            };
            if let Some(value) = rendered {
                entries.push((name.clone(), value));
            }
        }
        entries
    }

    /// Renders model entries one binding per line, `  <name> = <value>`.
    #[must_use]
    pub fn format_model(entries: &[(String, String)]) -> String {
        let mut out = String::new();
        for (i, (name, value)) in entries.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str("  ");
            out.push_str(name);
            out.push_str(" = ");
            out.push_str(value);
        }
        out
    }
}
