//! Recursive-descent parser with operator precedence and error recovery.
//!
//! Top-level items and statements are the two recovery boundaries: when an
//! item fails, the parser records the diagnostic and skips to the next
//! `fn`/`import`/`struct`/`enum` keyword; when a statement fails, it skips
//! past the next `;` or stops at `}`. Diagnostics are collected in source
//! order; any diagnostic makes the parse a failure.

use crate::ast::{
    Block, EnumDecl, EnumVariant, Expr, ExprId, ExprNode, Function, Import, Item, Param, Pred,
    PredNode, Program, Stmt, StmtNode, StructDecl, StructField, StructLiteralField, TypeName,
    reassign_expr_ids,
};
use crate::diag::Diagnostic;
use crate::lexer::{Token, TokenKind};
use crate::source::Span;

type ParseResult<T> = Result<T, Diagnostic>;

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    diags: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            diags: Vec::new(),
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos - 1]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn error_here(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error_at(self.peek().span, message)
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> ParseResult<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    /// After a failed top-level item: skip to the next item keyword or EOF.
    fn synchronize_top_level(&mut self) {
        while !self.is_at_end() {
            match self.peek().kind {
                TokenKind::KwFn | TokenKind::KwImport | TokenKind::KwStruct | TokenKind::KwEnum => {
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// After a failed statement: skip past the next `;`, or stop at `}`.
    fn synchronize_stmt(&mut self) {
        while !self.is_at_end() {
            if self.check(TokenKind::RBrace) {
                return;
            }
            if self.advance().kind == TokenKind::Semicolon {
                return;
            }
        }
    }

    fn parse_program(mut self) -> Result<Program, Vec<Diagnostic>> {
        let mut program = Program::default();
        while !self.is_at_end() {
            let item = match self.peek().kind {
                TokenKind::KwFn => self.parse_function().map(Item::Function),
                TokenKind::KwStruct => self.parse_struct().map(Item::Struct),
                TokenKind::KwEnum => self.parse_enum().map(Item::Enum),
                TokenKind::KwImport => self.parse_import().map(Item::Import),
                _ => Err(self.error_here("expected 'fn', 'struct', 'enum', or 'import'")),
            };
            match item {
                Ok(item) => program.items.push(item),
                Err(diag) => {
                    self.diags.push(diag);
                    self.synchronize_top_level();
                }
            }
        }
        if self.diags.is_empty() {
            reassign_expr_ids(&mut program);
            Ok(program)
        } else {
            Err(self.diags)
        }
    }

    fn parse_type_name(&mut self) -> ParseResult<TypeName> {
        let is_capability = self.matches(TokenKind::KwCap);
        let cap_span = if is_capability {
            Some(self.previous().span)
        } else {
            None
        };
        if !self.check(TokenKind::Identifier) {
            return Err(self.error_here("expected type name"));
        }
        let name = self.advance();
        let span = match cap_span {
            Some(cap) => Span::cover(cap, name.span),
            None => name.span,
        };
        Ok(TypeName {
            span,
            is_capability,
            name: name.lexeme.clone(),
        })
    }

    fn parse_import(&mut self) -> ParseResult<Import> {
        let kw = self.consume(TokenKind::KwImport, "expected 'import'")?.span;

        if !self.check(TokenKind::Identifier) {
            return Err(self.error_here("expected module path after 'import'"));
        }
        let mut path_segments = vec![self.advance().lexeme.clone()];
        while self.matches(TokenKind::Dot) {
            if !self.check(TokenKind::Identifier) {
                return Err(self.error_here("expected module path segment after '.'"));
            }
            path_segments.push(self.advance().lexeme.clone());
        }

        let alias = if self.matches(TokenKind::KwAs) {
            if !self.check(TokenKind::Identifier) {
                return Err(self.error_here("expected alias name after 'as'"));
            }
            Some(self.advance().lexeme.clone())
        } else {
            None
        };

        let semi = self
            .consume(TokenKind::Semicolon, "expected ';' after import")?
            .span;
        Ok(Import {
            span: Span::cover(kw, semi),
            path_segments,
            alias,
        })
    }

    fn parse_struct(&mut self) -> ParseResult<StructDecl> {
        let kw = self.consume(TokenKind::KwStruct, "expected 'struct'")?.span;
        if !self.check(TokenKind::Identifier) {
            return Err(self.error_here("expected struct name"));
        }
        let name = self.advance().clone();

        self.consume(TokenKind::LBrace, "expected '{' after struct name")?;

        let mut fields: Vec<StructField> = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            if !self.check(TokenKind::Identifier) {
                return Err(self.error_here("expected field name"));
            }
            let field_name = self.advance().clone();
            self.consume(TokenKind::Colon, "expected ':' after field name")?;
            let ty = self.parse_type_name()?;

            if let Some(first) = fields.iter().find(|f| f.name == field_name.lexeme) {
                self.diags.push(
                    Diagnostic::error_at(
                        field_name.span,
                        format!("duplicate field '{}'", field_name.lexeme),
                    )
                    .with_note("first declared here", Some(first.span)),
                );
            } else {
                fields.push(StructField {
                    span: Span::cover(field_name.span, ty.span),
                    name: field_name.lexeme.clone(),
                    ty,
                });
            }

            if !self.matches(TokenKind::Comma) {
                break;
            }
        }

        let rbrace = self
            .consume(TokenKind::RBrace, "expected '}' after struct fields")?
            .span;
        Ok(StructDecl {
            span: Span::cover(kw, rbrace),
            name: name.lexeme.clone(),
            name_span: name.span,
            fields,
        })
    }

    fn parse_enum(&mut self) -> ParseResult<EnumDecl> {
        let kw = self.consume(TokenKind::KwEnum, "expected 'enum'")?.span;
        if !self.check(TokenKind::Identifier) {
            return Err(self.error_here("expected enum name"));
        }
        let name = self.advance().clone();

        self.consume(TokenKind::LBrace, "expected '{' after enum name")?;

        let mut variants: Vec<EnumVariant> = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            if !self.check(TokenKind::Identifier) {
                return Err(self.error_here("expected variant name"));
            }
            let variant_name = self.advance().clone();

            let mut payload = None;
            let mut end = variant_name.span;
            if self.matches(TokenKind::LParen) {
                let ty = self.parse_type_name()?;
                end = self
                    .consume(TokenKind::RParen, "expected ')' after variant payload type")?
                    .span;
                payload = Some(ty);
            }

            if let Some(first) = variants.iter().find(|v| v.name == variant_name.lexeme) {
                self.diags.push(
                    Diagnostic::error_at(
                        variant_name.span,
                        format!("duplicate variant '{}'", variant_name.lexeme),
                    )
                    .with_note("first declared here", Some(first.span)),
                );
            } else {
                variants.push(EnumVariant {
                    span: Span::cover(variant_name.span, end),
                    name: variant_name.lexeme.clone(),
                    payload,
                });
            }

            if !self.matches(TokenKind::Comma) {
                break;
            }
        }

        let rbrace = self
            .consume(TokenKind::RBrace, "expected '}' after enum variants")?
            .span;
        Ok(EnumDecl {
            span: Span::cover(kw, rbrace),
            name: name.lexeme.clone(),
            name_span: name.span,
            variants,
        })
    }

    fn parse_function(&mut self) -> ParseResult<Function> {
        self.consume(TokenKind::KwFn, "expected 'fn'")?;

        if !self.check(TokenKind::Identifier) {
            return Err(self.error_here("expected function name"));
        }
        let name = self.advance().clone();

        self.consume(TokenKind::LParen, "expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected ')' after parameter list")?;

        let return_type = if self.matches(TokenKind::Arrow) {
            Some(self.parse_type_name()?)
        } else {
            None
        };

        let mut requires_clauses = Vec::new();
        let mut ensures = Vec::new();
        if self.matches(TokenKind::LBracket) {
            loop {
                if self.matches(TokenKind::KwRequires) {
                    requires_clauses.push(self.parse_pred()?);
                    self.consume(TokenKind::Semicolon, "expected ';' after requires clause")?;
                } else if self.matches(TokenKind::KwEnsures) {
                    ensures.push(self.parse_pred()?);
                    self.consume(TokenKind::Semicolon, "expected ';' after ensures clause")?;
                } else {
                    break;
                }
            }
            self.consume(TokenKind::RBracket, "expected ']' after contract clauses")?;
        }

        let body = self.parse_block()?;

        Ok(Function {
            span: Span::cover(name.span, body.span),
            name: name.lexeme.clone(),
            name_span: name.span,
            params,
            return_type,
            requires_clauses,
            ensures,
            body,
        })
    }

    fn parse_param(&mut self) -> ParseResult<Param> {
        if !self.check(TokenKind::Identifier) {
            return Err(self.error_here("expected parameter name"));
        }
        let name = self.advance().clone();
        self.consume(TokenKind::Colon, "expected ':' after parameter name")?;
        let ty = self.parse_type_name()?;

        let refinement = if self.matches(TokenKind::KwWhere) {
            Some(self.parse_pred()?)
        } else {
            None
        };

        let end = refinement.as_ref().map_or(ty.span, |p| p.span);
        Ok(Param {
            span: Span::cover(name.span, end),
            name: name.lexeme.clone(),
            ty,
            refinement,
        })
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        let lbrace = self
            .consume(TokenKind::LBrace, "expected '{' to start block")?
            .span;

        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(diag) => {
                    self.diags.push(diag);
                    self.synchronize_stmt();
                }
            }
        }

        let rbrace = self
            .consume(TokenKind::RBrace, "expected '}' to end block")?
            .span;
        Ok(Block {
            span: Span::cover(lbrace, rbrace),
            stmts,
        })
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        let start_pos = self.pos;

        if self.matches(TokenKind::KwLet) {
            let kw = self.previous().span;
            if !self.check(TokenKind::Identifier) {
                return Err(self.error_here("expected identifier after 'let'"));
            }
            let name = self.advance().clone();
            self.consume(TokenKind::Colon, "expected ':' after let name")?;
            let ty = self.parse_type_name()?;

            let refinement = if self.matches(TokenKind::KwWhere) {
                Some(self.parse_pred()?)
            } else {
                None
            };

            self.consume(TokenKind::Equal, "expected '=' in let statement")?;
            let value = self.parse_expr()?;
            let semi = self
                .consume(TokenKind::Semicolon, "expected ';' after let statement")?
                .span;

            return Ok(Stmt {
                span: Span::cover(kw, semi),
                node: StmtNode::Let {
                    name: name.lexeme.clone(),
                    name_span: name.span,
                    ty,
                    refinement,
                    value,
                },
            });
        }

        if self.matches(TokenKind::KwReturn) {
            let kw = self.previous().span;
            let value = if self.check(TokenKind::Semicolon) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            let semi = self
                .consume(TokenKind::Semicolon, "expected ';' after return statement")?
                .span;
            return Ok(Stmt {
                span: Span::cover(kw, semi),
                node: StmtNode::Return { value },
            });
        }

        if self.matches(TokenKind::KwIf) {
            let kw = self.previous().span;
            self.consume(TokenKind::LParen, "expected '(' after 'if'")?;
            let cond = self.parse_expr()?;
            self.consume(TokenKind::RParen, "expected ')' after if condition")?;
            let then_block = self.parse_block()?;
            let else_block = if self.matches(TokenKind::KwElse) {
                Some(self.parse_block()?)
            } else {
                None
            };
            let end = else_block.as_ref().map_or(then_block.span, |b| b.span);
            return Ok(Stmt {
                span: Span::cover(kw, end),
                node: StmtNode::If {
                    cond,
                    then_block,
                    else_block,
                },
            });
        }

        if self.matches(TokenKind::KwWhile) {
            let kw = self.previous().span;
            self.consume(TokenKind::LParen, "expected '(' after 'while'")?;
            let cond = self.parse_expr()?;
            self.consume(TokenKind::RParen, "expected ')' after while condition")?;
            let body = self.parse_block()?;
            return Ok(Stmt {
                span: Span::cover(kw, body.span),
                node: StmtNode::While { cond, body },
            });
        }

        if self.matches(TokenKind::KwUnsafe) {
            let kw = self.previous().span;
            let body = self.parse_block()?;
            return Ok(Stmt {
                span: Span::cover(kw, body.span),
                node: StmtNode::Unsafe { body },
            });
        }

        if self.check(TokenKind::LBrace) {
            let block = self.parse_block()?;
            return Ok(Stmt {
                span: block.span,
                node: StmtNode::Block { block },
            });
        }

        // Expression statement
        let expr = self.parse_expr()?;
        let semi = self
            .consume(TokenKind::Semicolon, "expected ';' after expression")?
            .span;
        let first = self.tokens[start_pos].span;
        Ok(Stmt {
            span: Span::cover(first, semi),
            node: StmtNode::Expr { expr },
        })
    }

    // --- expressions -----------------------------------------------------

    fn mk_expr(span: Span, node: ExprNode) -> Expr {
        // Ids are provisional; reassign_expr_ids gives the final numbering.
        Expr {
            id: ExprId(0),
            span,
            node,
        }
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_binary_level(
        &mut self,
        ops: &[TokenKind],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut expr = next(self)?;
        loop {
            let Some(&op) = ops.iter().find(|&&op| self.check(op)) else {
                break;
            };
            self.advance();
            let rhs = next(self)?;
            let span = Span::cover(expr.span, rhs.span);
            expr = Self::mk_expr(
                span,
                ExprNode::Binary {
                    op,
                    lhs: Box::new(expr),
                    rhs: Box::new(rhs),
                },
            );
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[TokenKind::OrOr], Self::parse_and)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[TokenKind::AndAnd], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            &[TokenKind::EqualEqual, TokenKind::BangEqual],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            &[
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
            ],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::parse_factor)
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[TokenKind::Star, TokenKind::Slash], Self::parse_unary)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.matches(TokenKind::Bang) || self.matches(TokenKind::Minus) {
            let op_token = self.previous().clone();
            let rhs = self.parse_unary()?;
            let span = Span::cover(op_token.span, rhs.span);
            return Ok(Self::mk_expr(
                span,
                ExprNode::Unary {
                    op: op_token.kind,
                    rhs: Box::new(rhs),
                },
            ));
        }
        self.parse_call()
    }

    fn parse_call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.matches(TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let rparen = self
                    .consume(TokenKind::RParen, "expected ')' after arguments")?
                    .span;
                let span = Span::cover(expr.span, rparen);
                expr = Self::mk_expr(
                    span,
                    ExprNode::Call {
                        callee: Box::new(expr),
                        args,
                    },
                );
                continue;
            }

            if self.matches(TokenKind::Dot) {
                if !self.check(TokenKind::Identifier) {
                    return Err(self.error_here("expected member name after '.'"));
                }
                let member = self.advance().clone();
                let span = Span::cover(expr.span, member.span);
                expr = Self::mk_expr(
                    span,
                    ExprNode::Member {
                        base: Box::new(expr),
                        member: member.lexeme.clone(),
                        member_span: member.span,
                    },
                );
                continue;
            }

            if self.matches(TokenKind::ColonColon) {
                let ExprNode::Name(lhs) = &expr.node else {
                    return Err(self.error_here("expected a type name before '::'"));
                };
                let lhs = lhs.clone();
                if !self.check(TokenKind::Identifier) {
                    return Err(self.error_here("expected variant name after '::'"));
                }
                let rhs = self.advance().clone();
                let span = Span::cover(expr.span, rhs.span);
                expr = Self::mk_expr(
                    span,
                    ExprNode::ScopedName {
                        lhs,
                        rhs: rhs.lexeme.clone(),
                    },
                );
                continue;
            }

            break;
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        if self.matches(TokenKind::IntLiteral) {
            let lit = self.previous();
            return Ok(Self::mk_expr(lit.span, ExprNode::Int(lit.lexeme.clone())));
        }

        if self.matches(TokenKind::StringLiteral) {
            let lit = self.previous();
            return Ok(Self::mk_expr(
                lit.span,
                ExprNode::String(lit.lexeme.clone()),
            ));
        }

        if self.matches(TokenKind::KwTrue) {
            return Ok(Self::mk_expr(self.previous().span, ExprNode::Bool(true)));
        }
        if self.matches(TokenKind::KwFalse) {
            return Ok(Self::mk_expr(self.previous().span, ExprNode::Bool(false)));
        }

        if self.matches(TokenKind::Identifier) {
            let name = self.previous().clone();
            if self.check(TokenKind::LBrace) {
                return self.parse_struct_literal(&name);
            }
            return Ok(Self::mk_expr(name.span, ExprNode::Name(name.lexeme.clone())));
        }

        if self.matches(TokenKind::LParen) {
            let lparen = self.previous().span;
            let inner = self.parse_expr()?;
            let rparen = self
                .consume(TokenKind::RParen, "expected ')' after expression")?
                .span;
            let span = Span::cover(lparen, rparen);
            return Ok(Self::mk_expr(
                span,
                ExprNode::Group {
                    inner: Box::new(inner),
                },
            ));
        }

        Err(self.error_here("expected expression"))
    }

    fn parse_struct_literal(&mut self, name: &Token) -> ParseResult<Expr> {
        self.consume(TokenKind::LBrace, "expected '{' in struct literal")?;

        let mut fields: Vec<StructLiteralField> = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            if !self.check(TokenKind::Identifier) {
                return Err(self.error_here("expected field name in struct literal"));
            }
            let field_name = self.advance().clone();
            self.consume(TokenKind::Colon, "expected ':' after field name")?;
            let value = self.parse_expr()?;

            if let Some(first) = fields.iter().find(|f| f.name == field_name.lexeme) {
                self.diags.push(
                    Diagnostic::error_at(
                        field_name.span,
                        format!("duplicate field '{}' in struct literal", field_name.lexeme),
                    )
                    .with_note("first given here", Some(first.span)),
                );
            } else {
                fields.push(StructLiteralField {
                    span: Span::cover(field_name.span, value.span),
                    name: field_name.lexeme.clone(),
                    value,
                });
            }

            if !self.matches(TokenKind::Comma) {
                break;
            }
        }

        let rbrace = self
            .consume(TokenKind::RBrace, "expected '}' after struct literal fields")?
            .span;
        let span = Span::cover(name.span, rbrace);
        Ok(Self::mk_expr(
            span,
            ExprNode::StructLiteral {
                type_name: TypeName {
                    span: name.span,
                    is_capability: false,
                    name: name.lexeme.clone(),
                },
                fields,
            },
        ))
    }

    // --- predicates ------------------------------------------------------

    fn parse_pred(&mut self) -> ParseResult<Pred> {
        self.parse_pred_or()
    }

    fn parse_pred_binary_level(
        &mut self,
        ops: &[TokenKind],
        next: fn(&mut Self) -> ParseResult<Pred>,
    ) -> ParseResult<Pred> {
        let mut pred = next(self)?;
        loop {
            let Some(&op) = ops.iter().find(|&&op| self.check(op)) else {
                break;
            };
            self.advance();
            let rhs = next(self)?;
            let span = Span::cover(pred.span, rhs.span);
            pred = Pred {
                span,
                node: PredNode::Binary {
                    op,
                    lhs: Box::new(pred),
                    rhs: Box::new(rhs),
                },
            };
        }
        Ok(pred)
    }

    fn parse_pred_or(&mut self) -> ParseResult<Pred> {
        self.parse_pred_binary_level(&[TokenKind::OrOr], Self::parse_pred_and)
    }

    fn parse_pred_and(&mut self) -> ParseResult<Pred> {
        self.parse_pred_binary_level(&[TokenKind::AndAnd], Self::parse_pred_equality)
    }

    fn parse_pred_equality(&mut self) -> ParseResult<Pred> {
        self.parse_pred_binary_level(
            &[TokenKind::EqualEqual, TokenKind::BangEqual],
            Self::parse_pred_comparison,
        )
    }

    fn parse_pred_comparison(&mut self) -> ParseResult<Pred> {
        self.parse_pred_binary_level(
            &[
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
            ],
            Self::parse_pred_term,
        )
    }

    fn parse_pred_term(&mut self) -> ParseResult<Pred> {
        self.parse_pred_binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::parse_pred_factor)
    }

    fn parse_pred_factor(&mut self) -> ParseResult<Pred> {
        self.parse_pred_binary_level(&[TokenKind::Star, TokenKind::Slash], Self::parse_pred_unary)
    }

    fn parse_pred_unary(&mut self) -> ParseResult<Pred> {
        if self.matches(TokenKind::Bang) || self.matches(TokenKind::Minus) {
            let op_token = self.previous().clone();
            let rhs = self.parse_pred_unary()?;
            let span = Span::cover(op_token.span, rhs.span);
            return Ok(Pred {
                span,
                node: PredNode::Unary {
                    op: op_token.kind,
                    rhs: Box::new(rhs),
                },
            });
        }
        self.parse_pred_primary()
    }

    fn parse_pred_primary(&mut self) -> ParseResult<Pred> {
        if self.matches(TokenKind::IntLiteral) {
            let lit = self.previous();
            return Ok(Pred {
                span: lit.span,
                node: PredNode::Int(lit.lexeme.clone()),
            });
        }
        if self.matches(TokenKind::KwTrue) {
            return Ok(Pred {
                span: self.previous().span,
                node: PredNode::Bool(true),
            });
        }
        if self.matches(TokenKind::KwFalse) {
            return Ok(Pred {
                span: self.previous().span,
                node: PredNode::Bool(false),
            });
        }
        if self.matches(TokenKind::Identifier) {
            let name = self.previous();
            return Ok(Pred {
                span: name.span,
                node: PredNode::Name(name.lexeme.clone()),
            });
        }
        if self.matches(TokenKind::LParen) {
            let lparen = self.previous().span;
            let inner = self.parse_pred()?;
            let rparen = self
                .consume(TokenKind::RParen, "expected ')' after predicate")?
                .span;
            return Ok(Pred {
                span: Span::cover(lparen, rparen),
                node: PredNode::Group {
                    inner: Box::new(inner),
                },
            });
        }
        Err(self.error_here("expected predicate expression"))
    }
}

/// Parses a token stream into a program, or returns every diagnostic the
/// recovery points collected.
pub fn parse(tokens: &[Token]) -> Result<Program, Vec<Diagnostic>> {
    Parser::new(tokens).parse_program()
}
