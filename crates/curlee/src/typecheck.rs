//! The type checker.
//!
//! Signatures are collected before any body is checked so functions can call
//! forward. `let` bindings are declared before their initializer is checked,
//! mirroring the resolver, so a refinement can mention the bound name.
//! Diagnostics are collected across the whole program; `TypeInfo` is only
//! produced when there are none.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::ast::{Block, Expr, ExprNode, Function, Item, Program, Stmt, StmtNode, TypeName};
use crate::diag::Diagnostic;
use crate::lexer::TokenKind;
use crate::source::Span;
use crate::types::{FunctionType, Type, TypeInfo, core_type_from_name};

/// Builtin function names that cannot be shadowed or used as values.
pub const RESERVED_BUILTINS: &[&str] = &["print", "python_ffi"];

pub fn type_check(program: &Program) -> Result<TypeInfo, Vec<Diagnostic>> {
    Checker::new(program).run(program)
}

struct Scope {
    vars: AHashMap<String, Type>,
}

struct Checker {
    functions: AHashMap<String, FunctionType>,
    structs: AHashMap<String, IndexMap<String, Type>>,
    enums: AHashMap<String, IndexMap<String, Option<Type>>>,
    /// Dotted import paths and aliases usable as call qualifiers.
    import_qualifiers: Vec<String>,
    scopes: Vec<Scope>,
    unsafe_depth: usize,
    diags: Vec<Diagnostic>,
    info: TypeInfo,
}

impl Checker {
    fn new(program: &Program) -> Self {
        let mut import_qualifiers = Vec::new();
        for import in program.imports() {
            import_qualifiers.push(import.dotted_path());
            if let Some(alias) = &import.alias {
                import_qualifiers.push(alias.clone());
            }
        }
        Self {
            functions: AHashMap::new(),
            structs: AHashMap::new(),
            enums: AHashMap::new(),
            import_qualifiers,
            scopes: Vec::new(),
            unsafe_depth: 0,
            diags: Vec::new(),
            info: TypeInfo::default(),
        }
    }

    fn run(mut self, program: &Program) -> Result<TypeInfo, Vec<Diagnostic>> {
        self.collect_declarations(program);
        self.collect_signatures(program);

        for f in program.functions() {
            self.check_function(f);
        }

        if self.diags.is_empty() {
            Ok(self.info)
        } else {
            Err(self.diags)
        }
    }

    fn error_at(&mut self, span: Span, message: impl Into<String>) {
        self.diags.push(Diagnostic::error_at(span, message));
    }

    fn collect_declarations(&mut self, program: &Program) {
        // Register every type name first, in source order, so field and
        // payload types can reference declarations that come later. Structs
        // and enums share one namespace.
        let mut declared: AHashMap<String, Span> = AHashMap::new();
        for item in &program.items {
            let (name, name_span, is_struct) = match item {
                Item::Struct(decl) => (&decl.name, decl.name_span, true),
                Item::Enum(decl) => (&decl.name, decl.name_span, false),
                _ => continue,
            };
            if let Some(&first) = declared.get(name.as_str()) {
                self.diags.push(
                    Diagnostic::error_at(name_span, format!("duplicate type name '{name}'"))
                        .with_note("first declared here", Some(first)),
                );
                continue;
            }
            declared.insert(name.clone(), name_span);
            if is_struct {
                self.structs.insert(name.clone(), IndexMap::new());
            } else {
                self.enums.insert(name.clone(), IndexMap::new());
            }
        }

        // Only the declaration that owns a name fills it in; duplicates
        // were diagnosed above.
        for item in &program.items {
            match item {
                Item::Struct(decl) => {
                    if declared.get(decl.name.as_str()) != Some(&decl.name_span) {
                        continue;
                    }
                    let mut fields = IndexMap::new();
                    for field in &decl.fields {
                        if let Some(ty) = self.type_from_ast(&field.ty) {
                            fields.insert(field.name.clone(), ty);
                        }
                    }
                    self.structs.insert(decl.name.clone(), fields);
                }
                Item::Enum(decl) => {
                    if declared.get(decl.name.as_str()) != Some(&decl.name_span) {
                        continue;
                    }
                    let mut variants = IndexMap::new();
                    for variant in &decl.variants {
                        let payload = match &variant.payload {
                            Some(ty) => match self.type_from_ast(ty) {
                                Some(t) => Some(t),
                                None => continue,
                            },
                            None => None,
                        };
                        variants.insert(variant.name.clone(), payload);
                    }
                    self.enums.insert(decl.name.clone(), variants);
                }
                _ => {}
            }
        }
    }

    fn type_from_ast(&mut self, name: &TypeName) -> Option<Type> {
        if name.is_capability {
            return Some(Type::Capability(name.name.clone()));
        }
        if let Some(t) = core_type_from_name(&name.name) {
            return Some(t);
        }
        if self.structs.contains_key(&name.name) {
            return Some(Type::Struct(name.name.clone()));
        }
        if self.enums.contains_key(&name.name) {
            return Some(Type::Enum(name.name.clone()));
        }
        self.error_at(name.span, format!("unknown type '{}'", name.name));
        None
    }

    fn collect_signatures(&mut self, program: &Program) {
        for f in program.functions() {
            let Some(sig) = self.function_signature(f) else {
                continue;
            };
            self.functions.entry(f.name.clone()).or_insert(sig);
        }
    }

    fn function_signature(&mut self, f: &Function) -> Option<FunctionType> {
        let Some(return_type) = &f.return_type else {
            self.error_at(
                f.span,
                format!("missing return type annotation for function '{}'", f.name),
            );
            return None;
        };

        let result = self.type_from_ast(return_type)?;

        let mut params = Vec::with_capacity(f.params.len());
        for p in &f.params {
            params.push(self.type_from_ast(&p.ty)?);
        }

        Some(FunctionType { params, result })
    }

    fn push_scope(&mut self) {
        self.scopes.push(Scope {
            vars: AHashMap::new(),
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup_var(&self, name: &str) -> Option<Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.vars.get(name).cloned())
    }

    fn declare_var(&mut self, name: &str, ty: Type) {
        if self.scopes.is_empty() {
            self.push_scope();
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.vars.insert(name.to_string(), ty);
        }
    }

    fn check_function(&mut self, f: &Function) {
        let Some(sig) = self.functions.get(&f.name).cloned() else {
            return;
        };
        if sig.params.len() != f.params.len() {
            // A different function with this name owns the signature table
            // entry; the emitter reports the duplicate.
            return;
        }

        self.push_scope();
        for (param, ty) in f.params.iter().zip(sig.params.iter()) {
            self.declare_var(&param.name, ty.clone());
        }

        for stmt in &f.body.stmts {
            self.check_stmt(stmt, &sig.result);
        }

        self.pop_scope();
    }

    fn check_block(&mut self, block: &Block, expected_return: &Type) {
        self.push_scope();
        for stmt in &block.stmts {
            self.check_stmt(stmt, expected_return);
        }
        self.pop_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt, expected_return: &Type) {
        match &stmt.node {
            StmtNode::Let {
                name, ty, value, ..
            } => {
                let Some(declared) = self.type_from_ast(ty) else {
                    return;
                };

                // Mirror resolver semantics: declare before checking the
                // initializer so refinements can mention the bound name.
                self.declare_var(name, declared.clone());

                let Some(init) = self.check_expr(value) else {
                    return;
                };
                if init != declared {
                    self.error_at(
                        stmt.span,
                        format!("type mismatch in let: expected {declared}, got {init}"),
                    );
                }
            }
            StmtNode::Return { value } => match value {
                None => {
                    if *expected_return != Type::Unit {
                        self.error_at(stmt.span, "return; used in non-Unit function");
                    }
                }
                Some(value) => {
                    let Some(value_t) = self.check_expr(value) else {
                        return;
                    };
                    if value_t != *expected_return {
                        self.error_at(
                            stmt.span,
                            format!(
                                "return type mismatch: expected {expected_return}, got {value_t}"
                            ),
                        );
                    }
                }
            },
            StmtNode::Expr { expr } => {
                let _ = self.check_expr(expr);
            }
            StmtNode::If {
                cond,
                then_block,
                else_block,
            } => {
                if let Some(cond_t) = self.check_expr(cond)
                    && cond_t != Type::Bool
                {
                    self.error_at(
                        cond.span,
                        format!("if condition type mismatch: expected Bool, got {cond_t}"),
                    );
                }
                self.check_block(then_block, expected_return);
                if let Some(else_block) = else_block {
                    self.check_block(else_block, expected_return);
                }
            }
            StmtNode::While { cond, body } => {
                if let Some(cond_t) = self.check_expr(cond)
                    && cond_t != Type::Bool
                {
                    self.error_at(
                        cond.span,
                        format!("while condition type mismatch: expected Bool, got {cond_t}"),
                    );
                }
                self.check_block(body, expected_return);
            }
            StmtNode::Block { block } => self.check_block(block, expected_return),
            StmtNode::Unsafe { body } => {
                self.unsafe_depth += 1;
                self.check_block(body, expected_return);
                self.unsafe_depth -= 1;
            }
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Option<Type> {
        let t = self.check_expr_node(expr);
        if let Some(t) = &t {
            self.info.expr_types.insert(expr.id, t.clone());
        }
        t
    }

    fn check_expr_node(&mut self, expr: &Expr) -> Option<Type> {
        match &expr.node {
            ExprNode::Int(_) => Some(Type::Int),
            ExprNode::Bool(_) => Some(Type::Bool),
            ExprNode::String(_) => Some(Type::String),
            ExprNode::Name(name) => self.check_name(name, expr.span),
            ExprNode::ScopedName { lhs, rhs } => {
                self.check_enum_variant_value(lhs, rhs, expr.span)
            }
            ExprNode::Member { base, member, member_span } => {
                self.check_member(base, member, *member_span)
            }
            ExprNode::Unary { op, rhs } => self.check_unary(*op, rhs, expr.span),
            ExprNode::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs, expr.span),
            ExprNode::Call { callee, args } => self.check_call(callee, args, expr.span),
            ExprNode::Group { inner } => self.check_expr(inner),
            ExprNode::StructLiteral { type_name, fields } => {
                self.check_struct_literal(type_name, fields, expr.span)
            }
        }
    }

    fn check_name(&mut self, name: &str, span: Span) -> Option<Type> {
        if let Some(t) = self.lookup_var(name) {
            return Some(t);
        }
        if RESERVED_BUILTINS.contains(&name) {
            self.error_at(span, format!("'{name}' is a reserved builtin name"));
            return None;
        }
        if self.functions.contains_key(name) {
            self.error_at(span, format!("function name '{name}' is not a value"));
            return None;
        }
        self.error_at(span, format!("unknown name '{name}'"));
        None
    }

    fn check_enum_variant_value(&mut self, lhs: &str, rhs: &str, span: Span) -> Option<Type> {
        let Some(variants) = self.enums.get(lhs) else {
            self.error_at(span, format!("unknown enum '{lhs}'"));
            return None;
        };
        let Some(payload) = variants.get(rhs) else {
            self.error_at(span, format!("unknown enum variant '{lhs}::{rhs}'"));
            return None;
        };
        if payload.is_some() {
            self.error_at(
                span,
                format!("enum variant '{lhs}::{rhs}' requires a payload argument"),
            );
            return None;
        }
        Some(Type::Enum(lhs.to_string()))
    }

    fn check_member(&mut self, base: &Expr, member: &str, member_span: Span) -> Option<Type> {
        let base_t = self.check_expr(base)?;
        let Type::Struct(struct_name) = &base_t else {
            self.error_at(
                member_span,
                format!("member access expects a struct value, got {base_t}"),
            );
            return None;
        };
        let field_t = self
            .structs
            .get(struct_name)
            .and_then(|fields| fields.get(member).cloned());
        if field_t.is_none() {
            self.error_at(
                member_span,
                format!("struct '{struct_name}' has no field '{member}'"),
            );
        }
        field_t
    }

    fn check_unary(&mut self, op: TokenKind, rhs: &Expr, span: Span) -> Option<Type> {
        let rhs_t = self.check_expr(rhs)?;
        match op {
            TokenKind::Minus => {
                if rhs_t != Type::Int {
                    self.error_at(span, "unary '-' expects Int");
                    return None;
                }
                Some(Type::Int)
            }
            TokenKind::Bang => {
                if rhs_t != Type::Bool {
                    self.error_at(span, "unary '!' expects Bool");
                    return None;
                }
                Some(Type::Bool)
            }
            _ => {
                self.error_at(span, "unsupported unary operator");
                None
            }
        }
    }

    fn check_binary(&mut self, op: TokenKind, lhs: &Expr, rhs: &Expr, span: Span) -> Option<Type> {
        let lhs_t = self.check_expr(lhs);
        let rhs_t = self.check_expr(rhs);
        let (lhs_t, rhs_t) = (lhs_t?, rhs_t?);

        match op {
            TokenKind::Plus => {
                if lhs_t == Type::Int && rhs_t == Type::Int {
                    return Some(Type::Int);
                }
                if lhs_t == Type::String && rhs_t == Type::String {
                    return Some(Type::String);
                }
                self.error_at(span, "'+' expects Int or String operands of the same type");
                None
            }
            TokenKind::Minus | TokenKind::Star | TokenKind::Slash => {
                if lhs_t != Type::Int || rhs_t != Type::Int {
                    self.error_at(span, "arithmetic operators expect Int operands");
                    return None;
                }
                Some(Type::Int)
            }
            TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
                if lhs_t != Type::Int || rhs_t != Type::Int {
                    self.error_at(span, "comparison operators expect Int operands");
                    return None;
                }
                Some(Type::Bool)
            }
            TokenKind::EqualEqual | TokenKind::BangEqual => {
                if lhs_t != rhs_t {
                    self.error_at(span, "equality operators expect matching operand types");
                    return None;
                }
                Some(Type::Bool)
            }
            TokenKind::AndAnd | TokenKind::OrOr => {
                if lhs_t != Type::Bool || rhs_t != Type::Bool {
                    self.error_at(span, "boolean operators expect Bool operands");
                    return None;
                }
                Some(Type::Bool)
            }
            _ => {
                self.error_at(span, "unsupported binary operator");
                None
            }
        }
    }

    fn check_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Option<Type> {
        match &callee.node {
            ExprNode::Name(name) => {
                if name == "print" {
                    return self.check_print_call(args, span);
                }
                let Some(sig) = self.functions.get(name).cloned() else {
                    self.error_at(span, format!("unknown function '{name}'"));
                    return None;
                };
                self.check_direct_call(name, &sig, args, span)
            }
            ExprNode::ScopedName { lhs, rhs } => self.check_variant_call(lhs, rhs, args, span),
            ExprNode::Member { .. } => self.check_qualified_call(callee, args, span),
            _ => {
                self.error_at(span, "only direct calls are supported (callee must be a name)");
                None
            }
        }
    }

    fn check_direct_call(
        &mut self,
        name: &str,
        sig: &FunctionType,
        args: &[Expr],
        span: Span,
    ) -> Option<Type> {
        if args.len() != sig.params.len() {
            self.error_at(span, format!("wrong number of arguments for call to '{name}'"));
            return None;
        }
        for (arg, param_t) in args.iter().zip(sig.params.iter()) {
            let Some(arg_t) = self.check_expr(arg) else {
                continue;
            };
            if arg_t != *param_t {
                self.error_at(span, format!("argument type mismatch for call to '{name}'"));
            }
        }
        Some(sig.result.clone())
    }

    fn check_print_call(&mut self, args: &[Expr], span: Span) -> Option<Type> {
        if args.len() != 1 {
            self.error_at(span, "print expects exactly one argument");
            return None;
        }
        let arg_t = self.check_expr(&args[0])?;
        if !matches!(arg_t, Type::Int | Type::Bool | Type::String) {
            self.error_at(span, format!("print expects Int, Bool, or String, got {arg_t}"));
            return None;
        }
        Some(Type::Unit)
    }

    fn check_variant_call(
        &mut self,
        lhs: &str,
        rhs: &str,
        args: &[Expr],
        span: Span,
    ) -> Option<Type> {
        let Some(variants) = self.enums.get(lhs) else {
            self.error_at(span, format!("unknown enum '{lhs}'"));
            return None;
        };
        let Some(payload) = variants.get(rhs).cloned() else {
            self.error_at(span, format!("unknown enum variant '{lhs}::{rhs}'"));
            return None;
        };
        match payload {
            None => {
                if !args.is_empty() {
                    self.error_at(
                        span,
                        format!("enum variant '{lhs}::{rhs}' takes no arguments"),
                    );
                    return None;
                }
            }
            Some(payload_t) => {
                if args.len() != 1 {
                    self.error_at(
                        span,
                        format!("enum variant '{lhs}::{rhs}' expects exactly one payload argument"),
                    );
                    return None;
                }
                if let Some(arg_t) = self.check_expr(&args[0])
                    && arg_t != payload_t
                {
                    self.error_at(
                        span,
                        format!(
                            "payload type mismatch for '{lhs}::{rhs}': expected {payload_t}, got {arg_t}"
                        ),
                    );
                }
            }
        }
        Some(Type::Enum(lhs.to_string()))
    }

    /// Splits `a.b.c` member chains into their name segments, innermost
    /// first. Returns `None` when the base is not a plain name.
    fn member_chain_segments(callee: &Expr) -> Option<Vec<String>> {
        match &callee.node {
            ExprNode::Name(name) => Some(vec![name.clone()]),
            ExprNode::Member { base, member, .. } => {
                let mut segments = Self::member_chain_segments(base)?;
                segments.push(member.clone());
                Some(segments)
            }
            _ => None,
        }
    }

    fn check_qualified_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Option<Type> {
        let Some(segments) = Self::member_chain_segments(callee) else {
            self.error_at(span, "call chains must start with a name or module path");
            return None;
        };

        // The stubbed FFI intrinsic.
        if segments == ["python_ffi", "call"] {
            if self.unsafe_depth == 0 {
                self.error_at(span, "python_ffi.call is only allowed inside an unsafe block");
                return None;
            }
            if !args.is_empty() {
                self.error_at(span, "python_ffi.call takes no arguments");
                return None;
            }
            return Some(Type::Unit);
        }

        let Some((fn_name, qualifier)) = segments.split_last() else {
            return None;
        };
        let qualifier = qualifier.join(".");
        let known = self
            .import_qualifiers
            .iter()
            .any(|q| *q == qualifier || qualifier.starts_with(&format!("{q}.")));
        if !known {
            self.error_at(span, format!("unknown module qualifier '{qualifier}'"));
            return None;
        }

        let Some(sig) = self.functions.get(fn_name).cloned() else {
            self.error_at(span, format!("unknown function '{fn_name}'"));
            return None;
        };
        self.check_direct_call(fn_name, &sig, args, span)
    }

    fn check_struct_literal(
        &mut self,
        type_name: &TypeName,
        fields: &[crate::ast::StructLiteralField],
        span: Span,
    ) -> Option<Type> {
        let Some(declared) = self.structs.get(&type_name.name).cloned() else {
            self.error_at(
                type_name.span,
                format!("unknown struct '{}'", type_name.name),
            );
            return None;
        };

        for field in fields {
            let Some(expected) = declared.get(&field.name) else {
                self.error_at(
                    field.span,
                    format!(
                        "struct '{}' has no field '{}'",
                        type_name.name, field.name
                    ),
                );
                let _ = self.check_expr(&field.value);
                continue;
            };
            if let Some(value_t) = self.check_expr(&field.value)
                && value_t != *expected
            {
                self.error_at(
                    field.span,
                    format!(
                        "field '{}' of struct '{}' expects {expected}, got {value_t}",
                        field.name, type_name.name
                    ),
                );
            }
        }

        for (field_name, _) in &declared {
            if !fields.iter().any(|f| &f.name == field_name) {
                self.error_at(
                    span,
                    format!(
                        "missing field '{field_name}' in struct literal for '{}'",
                        type_name.name
                    ),
                );
            }
        }

        Some(Type::Struct(type_name.name.clone()))
    }
}
