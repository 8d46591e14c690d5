//! The bytecode emitter: a typed program to one executable [`Chunk`].
//!
//! All functions share a single linear code stream. The entry function
//! (`main`) is emitted first so execution starts at offset zero; the
//! remaining functions follow in declaration order with their call sites
//! backpatched once every offset is known. Local slots are allocated from a
//! program-wide counter, so each function owns a disjoint range of the
//! locals array and calls cannot clobber caller locals; `max_locals` is the
//! final high-water mark.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::ast::{Block, Expr, ExprNode, Function, Program, Stmt, StmtNode};
use crate::bytecode::chunk::{Chunk, Value};
use crate::bytecode::op::OpCode;
use crate::diag::Diagnostic;
use crate::lexer::{TokenKind, unescape_string_literal};
use crate::source::Span;

/// The entry function every runnable program must declare.
pub const ENTRY_FUNCTION: &str = "main";

pub fn emit_bytecode(program: &Program) -> Result<Chunk, Vec<Diagnostic>> {
    Emitter::new(program).run(program)
}

/// An unresolved call site: where the operand lives and who it calls.
struct CallPatch {
    operand_pos: usize,
    callee: String,
    span: Span,
}

struct Emitter<'p> {
    code: Vec<u8>,
    spans: Vec<Span>,
    constants: Vec<Value>,
    /// Code offset of each emitted function.
    function_offsets: AHashMap<String, usize>,
    call_patches: Vec<CallPatch>,
    /// Declared functions in declaration order.
    functions: IndexMap<String, &'p Function>,
    import_qualifiers: Vec<String>,
    /// Innermost-last lexical scopes mapping names to local slots.
    scopes: Vec<AHashMap<String, u16>>,
    next_local: usize,
    max_locals: usize,
    current_span: Span,
    in_entry: bool,
    diags: Vec<Diagnostic>,
}

impl<'p> Emitter<'p> {
    fn new(program: &'p Program) -> Self {
        let mut import_qualifiers = Vec::new();
        for import in program.imports() {
            import_qualifiers.push(import.dotted_path());
            if let Some(alias) = &import.alias {
                import_qualifiers.push(alias.clone());
            }
        }
        Self {
            code: Vec::new(),
            spans: Vec::new(),
            constants: Vec::new(),
            function_offsets: AHashMap::new(),
            call_patches: Vec::new(),
            functions: IndexMap::new(),
            import_qualifiers,
            scopes: Vec::new(),
            next_local: 0,
            max_locals: 0,
            current_span: Span::default(),
            in_entry: false,
            diags: Vec::new(),
        }
    }

    fn run(mut self, program: &'p Program) -> Result<Chunk, Vec<Diagnostic>> {
        self.collect_functions(program);
        if !self.diags.is_empty() {
            return Err(self.diags);
        }

        let Some(&entry) = self.functions.get(ENTRY_FUNCTION) else {
            self.diags.push(Diagnostic::error(format!(
                "missing '{ENTRY_FUNCTION}' function"
            )));
            return Err(self.diags);
        };

        self.emit_function(entry, true);
        let callees: Vec<&Function> = self
            .functions
            .values()
            .copied()
            .filter(|f| f.name != ENTRY_FUNCTION)
            .collect();
        for f in callees {
            self.emit_function(f, false);
        }

        self.apply_call_patches();

        if self.diags.is_empty() {
            Ok(Chunk {
                code: self.code,
                spans: self.spans,
                constants: self.constants,
                max_locals: self.max_locals,
            })
        } else {
            Err(self.diags)
        }
    }

    fn error_at(&mut self, span: Span, message: impl Into<String>) {
        self.diags.push(Diagnostic::error_at(span, message));
    }

    fn collect_functions(&mut self, program: &'p Program) {
        for f in program.functions() {
            if f.name == "print" {
                self.error_at(
                    f.name_span,
                    "cannot declare function with builtin name 'print'",
                );
                continue;
            }
            if let Some(first) = self.functions.get(f.name.as_str()) {
                let first_span = first.name_span;
                self.diags.push(
                    Diagnostic::error_at(
                        f.name_span,
                        format!("duplicate function declaration: '{}'", f.name),
                    )
                    .with_note("first declared here", Some(first_span)),
                );
                continue;
            }
            for param in &f.params {
                let supported = matches!(param.ty.name.as_str(), "Int" | "Bool" | "String")
                    && !param.ty.is_capability;
                if !supported {
                    self.error_at(param.ty.span, "unsupported parameter type in runnable code");
                }
            }
            self.functions.insert(f.name.clone(), f);
        }
    }

    // --- byte emission ---------------------------------------------------

    fn emit_op(&mut self, op: OpCode) {
        self.code.push(op as u8);
        self.spans.push(self.current_span);
    }

    fn emit_op_u16(&mut self, op: OpCode, operand: u16) {
        self.emit_op(op);
        for byte in operand.to_le_bytes() {
            self.code.push(byte);
            self.spans.push(self.current_span);
        }
    }

    /// Emits a jump with a placeholder target; returns the operand position
    /// to pass to [`Self::patch_jump`].
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        let operand_pos = self.code.len();
        for _ in 0..2 {
            self.code.push(0);
            self.spans.push(self.current_span);
        }
        operand_pos
    }

    fn patch_jump(&mut self, operand_pos: usize) {
        let target = self.code.len();
        self.patch_jump_to(operand_pos, target);
    }

    fn patch_jump_to(&mut self, operand_pos: usize, target: usize) {
        let Ok(target) = u16::try_from(target) else {
            self.error_at(self.current_span, "bytecode exceeds addressable range");
            return;
        };
        let bytes = target.to_le_bytes();
        self.code[operand_pos] = bytes[0];
        self.code[operand_pos + 1] = bytes[1];
    }

    fn add_constant(&mut self, value: Value) -> u16 {
        if let Some(existing) = self.constants.iter().position(|c| *c == value) {
            return u16::try_from(existing).unwrap_or(u16::MAX);
        }
        let index = self.constants.len();
        self.constants.push(value);
        u16::try_from(index).unwrap_or_else(|_| {
            // Diagnosed lazily; a program this large already failed the
            // addressable-range check.
            u16::MAX
        })
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.add_constant(value);
        self.emit_op_u16(OpCode::Constant, index);
    }

    // --- locals ----------------------------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(AHashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn allocate_local(&mut self, name: &str, span: Span) -> u16 {
        let Ok(slot) = u16::try_from(self.next_local) else {
            self.error_at(span, "too many locals");
            return u16::MAX;
        };
        self.next_local += 1;
        self.max_locals = self.max_locals.max(self.next_local);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
        slot
    }

    fn lookup_local(&self, name: &str) -> Option<u16> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    // --- functions -------------------------------------------------------

    fn emit_function(&mut self, f: &Function, is_entry: bool) {
        self.function_offsets.insert(f.name.clone(), self.code.len());
        self.in_entry = is_entry;
        self.current_span = f.span;

        self.push_scope();
        let param_slots: Vec<u16> = f
            .params
            .iter()
            .map(|p| self.allocate_local(&p.name, p.span))
            .collect();

        // Arguments were pushed left to right, so the callee stores them in
        // reverse to pop the last argument first.
        for slot in param_slots.iter().rev() {
            self.emit_op_u16(OpCode::StoreLocal, *slot);
        }

        for stmt in &f.body.stmts {
            self.emit_stmt(stmt);
        }

        // Falling off the end yields Unit.
        self.current_span = f.span;
        self.emit_constant(Value::Unit);
        self.emit_op(if is_entry { OpCode::Return } else { OpCode::Ret });

        self.pop_scope();
    }

    fn apply_call_patches(&mut self) {
        let patches = std::mem::take(&mut self.call_patches);
        for patch in patches {
            let Some(&offset) = self.function_offsets.get(patch.callee.as_str()) else {
                self.error_at(patch.span, format!("unknown function '{}'", patch.callee));
                continue;
            };
            self.current_span = patch.span;
            self.patch_jump_to(patch.operand_pos, offset);
        }
    }

    // --- statements ------------------------------------------------------

    fn emit_stmt(&mut self, stmt: &Stmt) {
        self.current_span = stmt.span;
        match &stmt.node {
            StmtNode::Let {
                name, name_span, value, ..
            } => {
                self.emit_expr(value);
                let slot = self.allocate_local(name, *name_span);
                self.current_span = stmt.span;
                self.emit_op_u16(OpCode::StoreLocal, slot);
            }
            StmtNode::Return { value } => {
                match value {
                    Some(value) => self.emit_expr(value),
                    None => self.emit_constant(Value::Unit),
                }
                self.current_span = stmt.span;
                self.emit_op(if self.in_entry { OpCode::Return } else { OpCode::Ret });
            }
            StmtNode::Expr { expr } => {
                self.emit_expr(expr);
                self.current_span = stmt.span;
                self.emit_op(OpCode::Pop);
            }
            StmtNode::If {
                cond,
                then_block,
                else_block,
            } => {
                self.emit_expr(cond);
                self.current_span = stmt.span;
                let to_else = self.emit_jump(OpCode::JumpIfFalse);
                self.emit_block(then_block);
                match else_block {
                    Some(else_block) => {
                        self.current_span = stmt.span;
                        let to_end = self.emit_jump(OpCode::Jump);
                        self.patch_jump(to_else);
                        self.emit_block(else_block);
                        self.patch_jump(to_end);
                    }
                    None => self.patch_jump(to_else),
                }
            }
            StmtNode::While { cond, body } => {
                let head = self.code.len();
                self.emit_expr(cond);
                self.current_span = stmt.span;
                let to_end = self.emit_jump(OpCode::JumpIfFalse);
                self.emit_block(body);
                self.current_span = stmt.span;
                let back = self.emit_jump(OpCode::Jump);
                self.patch_jump_to(back, head);
                self.patch_jump(to_end);
            }
            StmtNode::Block { block } | StmtNode::Unsafe { body: block } => {
                self.emit_block(block);
            }
        }
    }

    fn emit_block(&mut self, block: &Block) {
        self.push_scope();
        for stmt in &block.stmts {
            self.emit_stmt(stmt);
        }
        self.pop_scope();
    }

    // --- expressions -----------------------------------------------------

    fn emit_expr(&mut self, expr: &Expr) {
        self.current_span = expr.span;
        match &expr.node {
            ExprNode::Int(lexeme) => match lexeme.parse::<i64>() {
                Ok(value) => self.emit_constant(Value::Int(value)),
                Err(_) => self.error_at(expr.span, "integer literal out of range"),
            },
            ExprNode::Bool(value) => self.emit_constant(Value::Bool(*value)),
            ExprNode::String(lexeme) => {
                self.emit_constant(Value::String(unescape_string_literal(lexeme)));
            }
            ExprNode::Name(name) => match self.lookup_local(name) {
                Some(slot) => self.emit_op_u16(OpCode::LoadLocal, slot),
                None => self.error_at(expr.span, format!("unknown name '{name}'")),
            },
            ExprNode::Group { inner } => self.emit_expr(inner),
            ExprNode::Unary { op, rhs } => {
                self.emit_expr(rhs);
                self.current_span = expr.span;
                match op {
                    TokenKind::Minus => self.emit_op(OpCode::Neg),
                    TokenKind::Bang => self.emit_op(OpCode::Not),
                    _ => self.error_at(expr.span, "unsupported unary operator"),
                }
            }
            ExprNode::Binary { op, lhs, rhs } => self.emit_binary(expr.span, *op, lhs, rhs),
            ExprNode::Call { callee, args } => self.emit_call(expr.span, callee, args),
            ExprNode::ScopedName { .. }
            | ExprNode::Member { .. }
            | ExprNode::StructLiteral { .. } => {
                self.error_at(expr.span, "unsupported expression in bytecode emission");
            }
        }
    }

    fn emit_binary(&mut self, span: Span, op: TokenKind, lhs: &Expr, rhs: &Expr) {
        // Short-circuit forms evaluate the right operand only when needed.
        if op == TokenKind::AndAnd {
            self.emit_expr(lhs);
            self.current_span = span;
            let to_false = self.emit_jump(OpCode::JumpIfFalse);
            self.emit_expr(rhs);
            self.current_span = span;
            let to_end = self.emit_jump(OpCode::Jump);
            self.patch_jump(to_false);
            self.emit_constant(Value::Bool(false));
            self.patch_jump(to_end);
            return;
        }
        if op == TokenKind::OrOr {
            self.emit_expr(lhs);
            self.current_span = span;
            let to_rhs = self.emit_jump(OpCode::JumpIfFalse);
            self.emit_constant(Value::Bool(true));
            let to_end = self.emit_jump(OpCode::Jump);
            self.patch_jump(to_rhs);
            self.emit_expr(rhs);
            self.patch_jump(to_end);
            return;
        }

        self.emit_expr(lhs);
        self.emit_expr(rhs);
        self.current_span = span;
        match op {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Sub),
            TokenKind::Star => self.emit_op(OpCode::Mul),
            TokenKind::Slash => self.emit_op(OpCode::Div),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::BangEqual => self.emit_op(OpCode::NotEqual),
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => self.emit_op(OpCode::LessEqual),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => self.emit_op(OpCode::GreaterEqual),
            _ => self.error_at(span, "unsupported binary operator"),
        }
    }

    /// Splits an `a.b.c` chain into segments, or `None` when the base is
    /// not a plain name.
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

    fn emit_call(&mut self, span: Span, callee: &Expr, args: &[Expr]) {
        if let ExprNode::Name(name) = &callee.node {
            if name == "print" {
                for arg in args {
                    self.emit_expr(arg);
                }
                self.current_span = span;
                self.emit_op(OpCode::Print);
                return;
            }
            for arg in args {
                self.emit_expr(arg);
            }
            self.current_span = span;
            let operand_pos = self.emit_jump(OpCode::Call);
            self.call_patches.push(CallPatch {
                operand_pos,
                callee: name.clone(),
                span,
            });
            return;
        }

        let Some(segments) = Self::member_chain_segments(callee) else {
            self.error_at(span, "call chains must start with a name or module path");
            return;
        };

        if segments == ["python_ffi", "call"] {
            self.current_span = span;
            self.emit_op(OpCode::PythonCall);
            return;
        }

        let Some((fn_name, qualifier)) = segments.split_last() else {
            return;
        };
        let qualifier = qualifier.join(".");
        let known = self
            .import_qualifiers
            .iter()
            .any(|q| *q == qualifier || qualifier.starts_with(&format!("{q}.")));
        if !known {
            self.error_at(span, format!("unknown module qualifier '{qualifier}'"));
            return;
        }

        for arg in args {
            self.emit_expr(arg);
        }
        self.current_span = span;
        let operand_pos = self.emit_jump(OpCode::Call);
        self.call_patches.push(CallPatch {
            operand_pos,
            callee: fn_name.clone(),
            span,
        });
    }
}
