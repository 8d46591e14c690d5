//! One-pass lexer: source text to a token stream ending in `Eof`.
//!
//! Lexing is unrecoverable: the first problem (invalid character,
//! unterminated string or block comment) is returned as a single diagnostic
//! and no tokens are produced.

use crate::diag::Diagnostic;
use crate::source::Span;

/// The closed set of token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TokenKind {
    // keywords
    KwFn,
    KwLet,
    KwIf,
    KwElse,
    KwWhile,
    KwReturn,
    KwTrue,
    KwFalse,
    KwRequires,
    KwEnsures,
    KwWhere,
    KwUnsafe,
    KwCap,
    KwImport,
    KwAs,
    KwStruct,
    KwEnum,
    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Colon,
    Comma,
    Dot,
    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Equal,
    Bang,
    Less,
    Greater,
    EqualEqual,
    BangEqual,
    LessEqual,
    GreaterEqual,
    AndAnd,
    OrOr,
    Arrow,
    ColonColon,
    // literals and names
    IntLiteral,
    StringLiteral,
    Identifier,
    Eof,
}

impl TokenKind {
    /// The token's source text where it is fixed, for "expected ..." messages.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::KwFn => "'fn'",
            Self::KwLet => "'let'",
            Self::KwIf => "'if'",
            Self::KwElse => "'else'",
            Self::KwWhile => "'while'",
            Self::KwReturn => "'return'",
            Self::KwTrue => "'true'",
            Self::KwFalse => "'false'",
            Self::KwRequires => "'requires'",
            Self::KwEnsures => "'ensures'",
            Self::KwWhere => "'where'",
            Self::KwUnsafe => "'unsafe'",
            Self::KwCap => "'cap'",
            Self::KwImport => "'import'",
            Self::KwAs => "'as'",
            Self::KwStruct => "'struct'",
            Self::KwEnum => "'enum'",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::LBrace => "'{'",
            Self::RBrace => "'}'",
            Self::LBracket => "'['",
            Self::RBracket => "']'",
            Self::Semicolon => "';'",
            Self::Colon => "':'",
            Self::Comma => "','",
            Self::Dot => "'.'",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::Slash => "'/'",
            Self::Equal => "'='",
            Self::Bang => "'!'",
            Self::Less => "'<'",
            Self::Greater => "'>'",
            Self::EqualEqual => "'=='",
            Self::BangEqual => "'!='",
            Self::LessEqual => "'<='",
            Self::GreaterEqual => "'>='",
            Self::AndAnd => "'&&'",
            Self::OrOr => "'||'",
            Self::Arrow => "'->'",
            Self::ColonColon => "'::'",
            Self::IntLiteral => "integer literal",
            Self::StringLiteral => "string literal",
            Self::Identifier => "identifier",
            Self::Eof => "end of input",
        }
    }

    /// Operator spelling, for pretty-printing ASTs and predicates.
    #[must_use]
    pub fn op_str(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::EqualEqual => "==",
            Self::BangEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Bang => "!",
            _ => "<op>",
        }
    }
}

/// A lexed token. `lexeme` is the exact source slice; empty for `Eof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

fn keyword_or_ident(lexeme: &str) -> TokenKind {
    match lexeme {
        "fn" => TokenKind::KwFn,
        "let" => TokenKind::KwLet,
        "if" => TokenKind::KwIf,
        "else" => TokenKind::KwElse,
        "while" => TokenKind::KwWhile,
        "return" => TokenKind::KwReturn,
        "true" => TokenKind::KwTrue,
        "false" => TokenKind::KwFalse,
        "requires" => TokenKind::KwRequires,
        "ensures" => TokenKind::KwEnsures,
        "where" => TokenKind::KwWhere,
        "unsafe" => TokenKind::KwUnsafe,
        "cap" => TokenKind::KwCap,
        "import" => TokenKind::KwImport,
        "as" => TokenKind::KwAs,
        "struct" => TokenKind::KwStruct,
        "enum" => TokenKind::KwEnum,
        _ => TokenKind::Identifier,
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> u8 {
        self.input.as_bytes()[self.pos]
    }

    fn peek_next(&self) -> u8 {
        let n = self.pos + 1;
        if n < self.input.len() {
            self.input.as_bytes()[n]
        } else {
            0
        }
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn make_token(&self, kind: TokenKind, start: usize, end: usize) -> Token {
        Token {
            kind,
            lexeme: self.input[start..end].to_string(),
            span: Span::new(start, end),
        }
    }

    fn make_error(&self, start: usize, end: usize, message: &str) -> Diagnostic {
        Diagnostic::error_at(Span::new(start, end), message)
    }

    // Skips whitespace and comments. Errors on an unterminated block comment.
    fn skip_trivia(&mut self) -> Result<(), Diagnostic> {
        while !self.is_at_end() {
            let c = self.peek();

            if c == b' ' || c == b'\t' || c == b'\n' || c == b'\r' {
                self.advance();
                continue;
            }

            if c == b'/' && self.peek_next() == b'/' {
                self.pos += 2;
                while !self.is_at_end() && self.peek() != b'\n' {
                    self.advance();
                }
                continue;
            }

            if c == b'/' && self.peek_next() == b'*' {
                let start = self.pos;
                self.pos += 2;
                let mut closed = false;
                while !self.is_at_end() {
                    if self.peek() == b'*' && self.peek_next() == b'/' {
                        self.pos += 2;
                        closed = true;
                        break;
                    }
                    self.advance();
                }
                if !closed {
                    return Err(self.make_error(start, self.pos, "unterminated block comment"));
                }
                continue;
            }

            break;
        }
        Ok(())
    }

    fn lex_all(&mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;

            let start = self.pos;
            if self.is_at_end() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    span: Span::new(start, start),
                });
                return Ok(tokens);
            }

            let c = self.peek();
            let next = self.peek_next();

            // Identifiers / keywords
            if is_ident_start(c) {
                self.advance();
                while !self.is_at_end() && is_ident_continue(self.peek()) {
                    self.advance();
                }
                let lexeme = &self.input[start..self.pos];
                tokens.push(self.make_token(keyword_or_ident(lexeme), start, self.pos));
                continue;
            }

            // Integer literals (signs are parsed as unary operators)
            if c.is_ascii_digit() {
                self.advance();
                while !self.is_at_end() && self.peek().is_ascii_digit() {
                    self.advance();
                }
                tokens.push(self.make_token(TokenKind::IntLiteral, start, self.pos));
                continue;
            }

            // String literals: double-quoted, basic escapes, no interpolation
            if c == b'"' {
                self.advance();
                let mut closed = false;
                while !self.is_at_end() {
                    let ch = self.peek();
                    if ch == b'"' {
                        self.advance();
                        tokens.push(self.make_token(TokenKind::StringLiteral, start, self.pos));
                        closed = true;
                        break;
                    }
                    if ch == b'\n' || ch == b'\r' {
                        return Err(self.make_error(start, self.pos, "unterminated string literal"));
                    }
                    if ch == b'\\' {
                        // Escape sequence: consume the backslash plus one char.
                        self.advance();
                        if self.is_at_end() {
                            return Err(self.make_error(
                                start,
                                self.pos,
                                "unterminated string literal",
                            ));
                        }
                        self.advance();
                        continue;
                    }
                    self.advance();
                }
                if !closed && self.is_at_end() {
                    return Err(self.make_error(start, self.pos, "unterminated string literal"));
                }
                continue;
            }

            // Two-character operators win over single-character ones.
            let two = match (c, next) {
                (b'-', b'>') => Some(TokenKind::Arrow),
                (b'=', b'=') => Some(TokenKind::EqualEqual),
                (b'!', b'=') => Some(TokenKind::BangEqual),
                (b'<', b'=') => Some(TokenKind::LessEqual),
                (b'>', b'=') => Some(TokenKind::GreaterEqual),
                (b'&', b'&') => Some(TokenKind::AndAnd),
                (b'|', b'|') => Some(TokenKind::OrOr),
                (b':', b':') => Some(TokenKind::ColonColon),
                _ => None,
            };
            if let Some(kind) = two {
                self.pos += 2;
                tokens.push(self.make_token(kind, start, self.pos));
                continue;
            }

            self.advance();
            let kind = match c {
                b'(' => TokenKind::LParen,
                b')' => TokenKind::RParen,
                b'{' => TokenKind::LBrace,
                b'}' => TokenKind::RBrace,
                b'[' => TokenKind::LBracket,
                b']' => TokenKind::RBracket,
                b';' => TokenKind::Semicolon,
                b',' => TokenKind::Comma,
                b':' => TokenKind::Colon,
                b'.' => TokenKind::Dot,
                b'+' => TokenKind::Plus,
                b'-' => TokenKind::Minus,
                b'*' => TokenKind::Star,
                b'/' => TokenKind::Slash,
                b'=' => TokenKind::Equal,
                b'!' => TokenKind::Bang,
                b'<' => TokenKind::Less,
                b'>' => TokenKind::Greater,
                _ => {
                    return Err(self.make_error(start, self.pos, "invalid character"));
                }
            };
            tokens.push(self.make_token(kind, start, self.pos));
        }
    }
}

/// Lexes `input` into tokens, or returns the first diagnostic encountered.
pub fn lex(input: &str) -> Result<Vec<Token>, Diagnostic> {
    Lexer::new(input).lex_all()
}

/// Interprets the escape sequences of a string literal's lexeme.
///
/// `lexeme` includes the surrounding quotes. Recognized escapes are
/// `\" \\ \/ \b \f \n \r \t`; an unrecognized escape keeps the escaped
/// character as-is (the lexer has already vetted the shape).
#[must_use]
pub fn unescape_string_literal(lexeme: &str) -> String {
    let inner = &lexeme[1..lexeme.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input)
            .expect("lexing should succeed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexemes_match_source_slices() {
        let src = "fn add(a: Int) -> Int { return a + 1; }";
        for token in lex(src).expect("lexing should succeed") {
            assert_eq!(&src[token.span.start..token.span.end], token.lexeme);
        }
    }

    #[test]
    fn keywords_and_identifiers_are_distinguished() {
        assert_eq!(
            kinds("fn fnord"),
            vec![TokenKind::KwFn, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn two_char_operators_win() {
        assert_eq!(
            kinds("== = <= < :: :"),
            vec![
                TokenKind::EqualEqual,
                TokenKind::Equal,
                TokenKind::LessEqual,
                TokenKind::Less,
                TokenKind::ColonColon,
                TokenKind::Colon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn digit_run_is_one_int_literal() {
        let tokens = lex("123").expect("lexing should succeed");
        assert_eq!(tokens[0].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[0].lexeme, "123");
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = lex("\"abc").expect_err("expected lex error");
        assert_eq!(err.message, "unterminated string literal");
    }

    #[test]
    fn string_with_raw_newline_is_an_error() {
        let err = lex("\"ab\ncd\"").expect_err("expected lex error");
        assert_eq!(err.message, "unterminated string literal");
    }

    #[test]
    fn unterminated_block_comment_spans_to_eof() {
        let err = lex("let /* comment").expect_err("expected lex error");
        assert_eq!(err.message, "unterminated block comment");
        assert_eq!(err.span.map(|s| s.start), Some(4));
    }

    #[test]
    fn invalid_character_is_an_error() {
        let err = lex("let x = @;").expect_err("expected lex error");
        assert_eq!(err.message, "invalid character");
    }

    #[test]
    fn escapes_unescape() {
        assert_eq!(unescape_string_literal("\"a\\nb\""), "a\nb");
        assert_eq!(unescape_string_literal("\"\\\"\\\\\\/\""), "\"\\/");
        assert_eq!(unescape_string_literal("\"\\t\\r\\b\\f\""), "\t\r\u{8}\u{c}");
    }
}
