//! Name resolution: binds every name use to the symbol it refers to.
//!
//! Two passes: first collect top-level symbols (functions, types, enum
//! variants, imports) into the root scope, then walk each function body with
//! a scope stack. The resulting [`Resolution`] feeds go-to-definition in the
//! LSP adapter. Failures that the type checker diagnoses with more context
//! (unknown functions, unknown enums, module-qualified calls) are deferred
//! rather than reported twice.

use ahash::AHashMap;

use crate::ast::{Block, Expr, ExprNode, Function, Item, Program, Stmt, StmtNode};
use crate::diag::Diagnostic;
use crate::source::Span;
use crate::typecheck::RESERVED_BUILTINS;

/// Identifies a symbol within one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Param,
    Local,
    Type,
    EnumVariant,
    Import,
}

/// A declared name: where it was introduced and what kind of thing it is.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymId,
    pub name: String,
    pub span: Span,
    pub kind: SymbolKind,
}

/// One resolved use of a symbol.
#[derive(Debug, Clone, Copy)]
pub struct Use {
    pub span: Span,
    pub target: SymId,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub symbols: Vec<Symbol>,
    pub uses: Vec<Use>,
}

impl Resolution {
    /// The symbol a use at `offset` points to, if any.
    #[must_use]
    pub fn definition_at(&self, offset: usize) -> Option<&Symbol> {
        let use_ = self.uses.iter().find(|u| u.span.contains(offset))?;
        self.symbols.iter().find(|s| s.id == use_.target)
    }
}

pub fn resolve(program: &Program) -> Result<Resolution, Vec<Diagnostic>> {
    Resolver::new().run(program)
}

struct Resolver {
    resolution: Resolution,
    diags: Vec<Diagnostic>,
    /// Function name -> symbol.
    functions: AHashMap<String, SymId>,
    /// Enum name -> (variant name -> symbol).
    enum_variants: AHashMap<String, AHashMap<String, SymId>>,
    /// Import aliases and dotted paths, usable as call qualifiers.
    import_qualifiers: Vec<String>,
    /// Innermost-last stack of name -> symbol scopes.
    scopes: Vec<AHashMap<String, SymId>>,
}

impl Resolver {
    fn new() -> Self {
        Self {
            resolution: Resolution::default(),
            diags: Vec::new(),
            functions: AHashMap::new(),
            enum_variants: AHashMap::new(),
            import_qualifiers: Vec::new(),
            scopes: Vec::new(),
        }
    }

    fn run(mut self, program: &Program) -> Result<Resolution, Vec<Diagnostic>> {
        self.collect_top_level(program);

        for f in program.functions() {
            self.resolve_function(f);
        }

        if self.diags.is_empty() {
            Ok(self.resolution)
        } else {
            Err(self.diags)
        }
    }

    fn new_symbol(&mut self, name: &str, span: Span, kind: SymbolKind) -> SymId {
        let id = SymId(u32::try_from(self.resolution.symbols.len()).unwrap_or(u32::MAX));
        self.resolution.symbols.push(Symbol {
            id,
            name: name.to_string(),
            span,
            kind,
        });
        id
    }

    fn collect_top_level(&mut self, program: &Program) {
        for item in &program.items {
            match item {
                Item::Function(f) => {
                    let id = self.new_symbol(&f.name, f.name_span, SymbolKind::Function);
                    self.functions.entry(f.name.clone()).or_insert(id);
                }
                Item::Struct(s) => {
                    self.new_symbol(&s.name, s.name_span, SymbolKind::Type);
                }
                Item::Enum(e) => {
                    self.new_symbol(&e.name, e.name_span, SymbolKind::Type);
                    let mut variants = AHashMap::new();
                    for v in &e.variants {
                        let id = self.new_symbol(&v.name, v.span, SymbolKind::EnumVariant);
                        variants.insert(v.name.clone(), id);
                    }
                    self.enum_variants.entry(e.name.clone()).or_insert(variants);
                }
                Item::Import(import) => {
                    let display = import
                        .alias
                        .clone()
                        .unwrap_or_else(|| import.dotted_path());
                    self.new_symbol(&display, import.span, SymbolKind::Import);
                    self.import_qualifiers.push(import.dotted_path());
                    if let Some(alias) = &import.alias {
                        self.import_qualifiers.push(alias.clone());
                    }
                }
            }
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(AHashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, span: Span, kind: SymbolKind) {
        let id = self.new_symbol(name, span, kind);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), id);
        }
    }

    fn lookup(&self, name: &str) -> Option<SymId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn record_use(&mut self, span: Span, target: SymId) {
        self.resolution.uses.push(Use { span, target });
    }

    fn resolve_function(&mut self, f: &Function) {
        self.push_scope();
        for param in &f.params {
            self.declare(&param.name, param.span, SymbolKind::Param);
        }
        for stmt in &f.body.stmts {
            self.resolve_stmt(stmt);
        }
        self.pop_scope();
    }

    fn resolve_block(&mut self, block: &Block) {
        self.push_scope();
        for stmt in &block.stmts {
            self.resolve_stmt(stmt);
        }
        self.pop_scope();
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match &stmt.node {
            StmtNode::Let {
                name,
                name_span,
                value,
                ..
            } => {
                // Declared before the initializer resolves, mirroring the
                // type checker, so refinements can mention the bound name.
                self.declare(name, *name_span, SymbolKind::Local);
                self.resolve_expr(value, false);
            }
            StmtNode::Return { value } => {
                if let Some(value) = value {
                    self.resolve_expr(value, false);
                }
            }
            StmtNode::Expr { expr } => self.resolve_expr(expr, false),
            StmtNode::If {
                cond,
                then_block,
                else_block,
            } => {
                self.resolve_expr(cond, false);
                self.resolve_block(then_block);
                if let Some(else_block) = else_block {
                    self.resolve_block(else_block);
                }
            }
            StmtNode::While { cond, body } => {
                self.resolve_expr(cond, false);
                self.resolve_block(body);
            }
            StmtNode::Block { block } => self.resolve_block(block),
            StmtNode::Unsafe { body } => self.resolve_block(body),
        }
    }

    /// The innermost base name of a member chain, if the chain is made only
    /// of names (`a.b.c` -> `a`).
    fn member_chain_base<'e>(expr: &'e Expr) -> Option<&'e str> {
        match &expr.node {
            ExprNode::Name(name) => Some(name),
            ExprNode::Member { base, .. } => Self::member_chain_base(base),
            _ => None,
        }
    }

    fn is_module_qualifier(&self, name: &str) -> bool {
        self.import_qualifiers
            .iter()
            .any(|q| q == name || q.split('.').next() == Some(name))
    }

    fn resolve_expr(&mut self, expr: &Expr, as_callee: bool) {
        match &expr.node {
            ExprNode::Int(_) | ExprNode::Bool(_) | ExprNode::String(_) => {}
            ExprNode::Name(name) => {
                if let Some(id) = self.lookup(name) {
                    self.record_use(expr.span, id);
                    return;
                }
                if RESERVED_BUILTINS.contains(&name.as_str()) {
                    if !as_callee {
                        self.diags.push(Diagnostic::error_at(
                            expr.span,
                            format!("'{name}' is a reserved builtin name"),
                        ));
                    }
                    return;
                }
                if let Some(&id) = self.functions.get(name) {
                    if as_callee {
                        self.record_use(expr.span, id);
                    } else {
                        self.diags.push(Diagnostic::error_at(
                            expr.span,
                            format!("function name '{name}' is not a value"),
                        ));
                    }
                    return;
                }
                self.diags
                    .push(Diagnostic::error_at(expr.span, format!("unknown name '{name}'")));
            }
            ExprNode::ScopedName { lhs, rhs } => {
                // Unknown enums/variants are the type checker's to report.
                if let Some(&id) = self
                    .enum_variants
                    .get(lhs)
                    .and_then(|variants| variants.get(rhs))
                {
                    self.record_use(expr.span, id);
                }
            }
            ExprNode::Member { base, .. } => {
                // Module-qualified chains (and the FFI intrinsic) resolve at
                // type-check time; only struct member bases resolve here.
                if let Some(base_name) = Self::member_chain_base(base)
                    && (base_name == "python_ffi" || self.is_module_qualifier(base_name))
                {
                    return;
                }
                self.resolve_expr(base, false);
            }
            ExprNode::Unary { rhs, .. } => self.resolve_expr(rhs, false),
            ExprNode::Binary { lhs, rhs, .. } => {
                self.resolve_expr(lhs, false);
                self.resolve_expr(rhs, false);
            }
            ExprNode::Call { callee, args } => {
                self.resolve_expr(callee, true);
                for arg in args {
                    self.resolve_expr(arg, false);
                }
            }
            ExprNode::Group { inner } => self.resolve_expr(inner, as_callee),
            ExprNode::StructLiteral { fields, .. } => {
                for field in fields {
                    self.resolve_expr(&field.value, false);
                }
            }
        }
    }
}
