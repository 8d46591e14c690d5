//! The abstract syntax tree.
//!
//! Expressions are a tree of tagged variants with boxed recursive children.
//! Every expression carries an [`ExprId`] that is unique within a program
//! after [`reassign_expr_ids`] runs; the type checker keys its results on
//! those ids. Predicates ([`Pred`]) mirror the restricted expression subset
//! usable in contracts and refinements.

use crate::lexer::TokenKind;
use crate::source::Span;

/// Identifies an expression within one (merged) program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

/// A type written in source: `Int`, `Point`, `cap Net`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    pub span: Span,
    pub is_capability: bool,
    pub name: String,
}

/// A function parameter, optionally refined with `where PRED`.
#[derive(Debug, Clone)]
pub struct Param {
    pub span: Span,
    pub name: String,
    pub ty: TypeName,
    pub refinement: Option<Pred>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub span: Span,
    pub name: String,
    pub name_span: Span,
    pub params: Vec<Param>,
    pub return_type: Option<TypeName>,
    pub requires_clauses: Vec<Pred>,
    pub ensures: Vec<Pred>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub span: Span,
    pub name: String,
    pub ty: TypeName,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub span: Span,
    pub name: String,
    pub name_span: Span,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone)]
pub struct EnumVariant {
    pub span: Span,
    pub name: String,
    pub payload: Option<TypeName>,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub span: Span,
    pub name: String,
    pub name_span: Span,
    pub variants: Vec<EnumVariant>,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub span: Span,
    pub path_segments: Vec<String>,
    pub alias: Option<String>,
}

impl Import {
    /// The dotted source spelling, e.g. `stdlib.math`.
    #[must_use]
    pub fn dotted_path(&self) -> String {
        self.path_segments.join(".")
    }
}

/// A top-level item, in source order.
#[derive(Debug, Clone)]
pub enum Item {
    Function(Function),
    Struct(StructDecl),
    Enum(EnumDecl),
    Import(Import),
}

/// A parsed compilation unit (or several merged ones).
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Enum(e) => Some(e),
            _ => None,
        })
    }

    pub fn imports(&self) -> impl Iterator<Item = &Import> {
        self.items.iter().filter_map(|item| match item {
            Item::Import(i) => Some(i),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub span: Span,
    pub node: StmtNode,
}

#[derive(Debug, Clone)]
pub enum StmtNode {
    Let {
        name: String,
        name_span: Span,
        ty: TypeName,
        refinement: Option<Pred>,
        value: Expr,
    },
    Return {
        value: Option<Expr>,
    },
    Expr {
        expr: Expr,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Block {
        block: Block,
    },
    Unsafe {
        body: Block,
    },
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: ExprId,
    pub span: Span,
    pub node: ExprNode,
}

#[derive(Debug, Clone)]
pub struct StructLiteralField {
    pub span: Span,
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub enum ExprNode {
    /// Integer literal, kept as its source lexeme.
    Int(String),
    Bool(bool),
    /// String literal lexeme, including the surrounding quotes.
    String(String),
    Name(String),
    /// `Enum::Variant`.
    ScopedName { lhs: String, rhs: String },
    Member {
        base: Box<Expr>,
        member: String,
        member_span: Span,
    },
    Unary {
        op: TokenKind,
        rhs: Box<Expr>,
    },
    Binary {
        op: TokenKind,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Group {
        inner: Box<Expr>,
    },
    StructLiteral {
        type_name: TypeName,
        fields: Vec<StructLiteralField>,
    },
}

/// A contract/refinement predicate: the expression subset the verifier
/// understands. `result` names the return value inside `ensures`.
#[derive(Debug, Clone)]
pub struct Pred {
    pub span: Span,
    pub node: PredNode,
}

#[derive(Debug, Clone)]
pub enum PredNode {
    Int(String),
    Bool(bool),
    Name(String),
    Unary { op: TokenKind, rhs: Box<Pred> },
    Binary { op: TokenKind, lhs: Box<Pred>, rhs: Box<Pred> },
    Group { inner: Box<Pred> },
}

/// Renders a predicate back to source-like syntax for `goal:` notes.
#[must_use]
pub fn pred_to_string(pred: &Pred) -> String {
    match &pred.node {
        PredNode::Int(lexeme) => lexeme.clone(),
        PredNode::Bool(value) => value.to_string(),
        PredNode::Name(name) => name.clone(),
        PredNode::Unary { op, rhs } => format!("{}{}", op.op_str(), pred_to_string(rhs)),
        PredNode::Binary { op, lhs, rhs } => format!(
            "({} {} {})",
            pred_to_string(lhs),
            op.op_str(),
            pred_to_string(rhs)
        ),
        PredNode::Group { inner } => {
            if matches!(inner.node, PredNode::Binary { .. }) {
                pred_to_string(inner)
            } else {
                format!("({})", pred_to_string(inner))
            }
        }
    }
}

/// Collects every name mentioned in a predicate (for model extraction).
pub fn collect_pred_names(pred: &Pred, names: &mut Vec<String>) {
    match &pred.node {
        PredNode::Name(name) => {
            if !names.iter().any(|n| n == name) {
                names.push(name.clone());
            }
        }
        PredNode::Unary { rhs, .. } => collect_pred_names(rhs, names),
        PredNode::Binary { lhs, rhs, .. } => {
            collect_pred_names(lhs, names);
            collect_pred_names(rhs, names);
        }
        PredNode::Group { inner } => collect_pred_names(inner, names),
        PredNode::Int(_) | PredNode::Bool(_) => {}
    }
}

/// Assigns fresh, unique expression ids across the whole program in
/// pre-order. Run once after parsing (and again after module merging) so
/// ids are dense and unique per merged program.
pub fn reassign_expr_ids(program: &mut Program) {
    let mut next = 0u32;
    for item in &mut program.items {
        if let Item::Function(f) = item {
            reassign_block(&mut f.body, &mut next);
        }
    }
}

fn reassign_block(block: &mut Block, next: &mut u32) {
    for stmt in &mut block.stmts {
        reassign_stmt(stmt, next);
    }
}

fn reassign_stmt(stmt: &mut Stmt, next: &mut u32) {
    match &mut stmt.node {
        StmtNode::Let { value, .. } => reassign_expr(value, next),
        StmtNode::Return { value } => {
            if let Some(value) = value {
                reassign_expr(value, next);
            }
        }
        StmtNode::Expr { expr } => reassign_expr(expr, next),
        StmtNode::If {
            cond,
            then_block,
            else_block,
        } => {
            reassign_expr(cond, next);
            reassign_block(then_block, next);
            if let Some(else_block) = else_block {
                reassign_block(else_block, next);
            }
        }
        StmtNode::While { cond, body } => {
            reassign_expr(cond, next);
            reassign_block(body, next);
        }
        StmtNode::Block { block } => reassign_block(block, next),
        StmtNode::Unsafe { body } => reassign_block(body, next),
    }
}

fn reassign_expr(expr: &mut Expr, next: &mut u32) {
    expr.id = ExprId(*next);
    *next += 1;
    match &mut expr.node {
        ExprNode::Member { base, .. } => reassign_expr(base, next),
        ExprNode::Unary { rhs, .. } => reassign_expr(rhs, next),
        ExprNode::Binary { lhs, rhs, .. } => {
            reassign_expr(lhs, next);
            reassign_expr(rhs, next);
        }
        ExprNode::Call { callee, args } => {
            reassign_expr(callee, next);
            for arg in args {
                reassign_expr(arg, next);
            }
        }
        ExprNode::Group { inner } => reassign_expr(inner, next),
        ExprNode::StructLiteral { fields, .. } => {
            for field in fields {
                reassign_expr(&mut field.value, next);
            }
        }
        ExprNode::Int(_)
        | ExprNode::Bool(_)
        | ExprNode::String(_)
        | ExprNode::Name(_)
        | ExprNode::ScopedName { .. } => {}
    }
}

/// Renders a program in its canonical single-spaced normal form.
///
/// This is both the `curlee parse` output and the formatter's target shape.
#[must_use]
pub fn dump(program: &Program) -> String {
    let mut out = String::new();
    for (i, item) in program.items.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match item {
            Item::Function(f) => dump_function(&mut out, f),
            Item::Struct(s) => dump_struct(&mut out, s),
            Item::Enum(e) => dump_enum(&mut out, e),
            Item::Import(im) => dump_import(&mut out, im),
        }
    }
    out
}

fn dump_type(out: &mut String, ty: &TypeName) {
    if ty.is_capability {
        out.push_str("cap ");
    }
    out.push_str(&ty.name);
}

fn dump_import(out: &mut String, import: &Import) {
    out.push_str("import ");
    out.push_str(&import.dotted_path());
    if let Some(alias) = &import.alias {
        out.push_str(" as ");
        out.push_str(alias);
    }
    out.push(';');
}

fn dump_struct(out: &mut String, decl: &StructDecl) {
    out.push_str("struct ");
    out.push_str(&decl.name);
    out.push_str(" {");
    for field in &decl.fields {
        out.push(' ');
        out.push_str(&field.name);
        out.push_str(": ");
        dump_type(out, &field.ty);
        out.push(',');
    }
    out.push_str(" }");
}

fn dump_enum(out: &mut String, decl: &EnumDecl) {
    out.push_str("enum ");
    out.push_str(&decl.name);
    out.push_str(" {");
    for variant in &decl.variants {
        out.push(' ');
        out.push_str(&variant.name);
        if let Some(payload) = &variant.payload {
            out.push('(');
            dump_type(out, payload);
            out.push(')');
        }
        out.push(',');
    }
    out.push_str(" }");
}

fn dump_function(out: &mut String, f: &Function) {
    out.push_str("fn ");
    out.push_str(&f.name);
    out.push('(');
    for (i, param) in f.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&param.name);
        out.push_str(": ");
        dump_type(out, &param.ty);
        if let Some(refinement) = &param.refinement {
            out.push_str(" where ");
            out.push_str(&pred_to_string(refinement));
        }
    }
    out.push(')');
    if let Some(return_type) = &f.return_type {
        out.push_str(" -> ");
        dump_type(out, return_type);
    }
    if !f.requires_clauses.is_empty() || !f.ensures.is_empty() {
        out.push_str(" [");
        for req in &f.requires_clauses {
            out.push_str(" requires ");
            out.push_str(&pred_to_string(req));
            out.push(';');
        }
        for ens in &f.ensures {
            out.push_str(" ensures ");
            out.push_str(&pred_to_string(ens));
            out.push(';');
        }
        out.push_str(" ]");
    }
    out.push(' ');
    dump_block(out, &f.body);
}

fn dump_block(out: &mut String, block: &Block) {
    out.push('{');
    for stmt in &block.stmts {
        out.push(' ');
        dump_stmt(out, stmt);
    }
    out.push_str(" }");
}

fn dump_stmt(out: &mut String, stmt: &Stmt) {
    match &stmt.node {
        StmtNode::Let {
            name,
            ty,
            refinement,
            value,
            ..
        } => {
            out.push_str("let ");
            out.push_str(name);
            out.push_str(": ");
            dump_type(out, ty);
            if let Some(refinement) = refinement {
                out.push_str(" where ");
                out.push_str(&pred_to_string(refinement));
            }
            out.push_str(" = ");
            dump_expr(out, value);
            out.push(';');
        }
        StmtNode::Return { value } => {
            out.push_str("return");
            if let Some(value) = value {
                out.push(' ');
                dump_expr(out, value);
            }
            out.push(';');
        }
        StmtNode::Expr { expr } => {
            dump_expr(out, expr);
            out.push(';');
        }
        StmtNode::If {
            cond,
            then_block,
            else_block,
        } => {
            out.push_str("if (");
            dump_expr(out, cond);
            out.push_str(") ");
            dump_block(out, then_block);
            if let Some(else_block) = else_block {
                out.push_str(" else ");
                dump_block(out, else_block);
            }
        }
        StmtNode::While { cond, body } => {
            out.push_str("while (");
            dump_expr(out, cond);
            out.push_str(") ");
            dump_block(out, body);
        }
        StmtNode::Block { block } => dump_block(out, block),
        StmtNode::Unsafe { body } => {
            out.push_str("unsafe ");
            dump_block(out, body);
        }
    }
}

fn dump_expr(out: &mut String, expr: &Expr) {
    match &expr.node {
        ExprNode::Int(lexeme) | ExprNode::String(lexeme) => out.push_str(lexeme),
        ExprNode::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
        ExprNode::Name(name) => out.push_str(name),
        ExprNode::ScopedName { lhs, rhs } => {
            out.push_str(lhs);
            out.push_str("::");
            out.push_str(rhs);
        }
        ExprNode::Member { base, member, .. } => {
            dump_expr(out, base);
            out.push('.');
            out.push_str(member);
        }
        ExprNode::Unary { op, rhs } => {
            out.push_str(op.op_str());
            out.push(' ');
            dump_expr(out, rhs);
        }
        ExprNode::Binary { op, lhs, rhs } => {
            out.push('(');
            dump_expr(out, lhs);
            out.push(' ');
            out.push_str(op.op_str());
            out.push(' ');
            dump_expr(out, rhs);
            out.push(')');
        }
        ExprNode::Call { callee, args } => {
            dump_expr(out, callee);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                dump_expr(out, arg);
            }
            out.push(')');
        }
        ExprNode::Group { inner } => {
            // Binary dumps already parenthesize; re-wrapping them would make
            // the canonical form grow under repeated formatting.
            if matches!(inner.node, ExprNode::Binary { .. }) {
                dump_expr(out, inner);
            } else {
                out.push('(');
                dump_expr(out, inner);
                out.push(')');
            }
        }
        ExprNode::StructLiteral { type_name, fields } => {
            out.push_str(&type_name.name);
            out.push_str(" {");
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push(' ');
                out.push_str(&field.name);
                out.push_str(": ");
                dump_expr(out, &field.value);
            }
            out.push_str(" }");
        }
    }
}
