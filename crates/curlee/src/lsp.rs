//! The LSP adapter: frame-delimited JSON-RPC over any byte streams.
//!
//! One message is read, handled, and answered before the next is read.
//! Document state is a URI-to-text map mutated only by `didOpen` and
//! `didChange`; analysis runs synchronously per request and publishes
//! diagnostics on every open/change. Responses echo the request `id` and
//! omit it when the request omitted it.

use std::io::{BufRead, Read, Write};

use ahash::AHashMap;
use serde_json::{Map, Value, json};

use crate::ast::{Block, Expr, ExprNode, Program, Stmt, StmtNode};
use crate::diag::{Diagnostic, Severity};
use crate::pipeline::analyze_source;
use crate::resolver::Resolution;
use crate::source::{LineMap, SourceFile, Span};
use crate::types::TypeInfo;

/// Runs the server loop until `exit` or end of input.
pub fn run_server(reader: &mut impl BufRead, writer: &mut impl Write) -> std::io::Result<()> {
    let mut server = Server::default();
    while let Some(payload) = read_message(reader)? {
        let Ok(message) = serde_json::from_str::<Value>(&payload) else {
            continue;
        };
        if server.handle(&message, writer)? == Loop::Exit {
            break;
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Loop {
    Continue,
    Exit,
}

/// Reads one `Content-Length`-framed message. Header lines may end in
/// `\r\n` or bare `\n`.
fn read_message(reader: &mut impl BufRead) -> std::io::Result<Option<String>> {
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }
    if content_length == 0 {
        return Ok(None);
    }
    let mut payload = vec![0u8; content_length];
    reader.read_exact(&mut payload)?;
    Ok(Some(String::from_utf8_lossy(&payload).into_owned()))
}

fn write_message(writer: &mut impl Write, payload: &str) -> std::io::Result<()> {
    write!(writer, "Content-Length: {}\r\n\r\n{payload}", payload.len())?;
    writer.flush()
}

/// Percent-decodes `file://` URIs to paths; other schemes pass through.
#[must_use]
pub fn uri_to_path(uri: &str) -> String {
    let Some(path) = uri.strip_prefix("file://") else {
        return uri.to_string();
    };
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &path[i + 1..i + 3];
            if let Ok(value) = u8::from_str_radix(hex, 16) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn lsp_severity(severity: Severity) -> u8 {
    match severity {
        Severity::Error => 1,
        Severity::Warning => 2,
        Severity::Note => 3,
    }
}

fn offset_from_position(map: &LineMap, line: u64, character: u64) -> Option<usize> {
    let line_index = usize::try_from(line).ok()? + 1;
    if line_index > map.line_count() {
        return None;
    }
    let character = usize::try_from(character).ok()?;
    Some(map.line_start_offset(line_index) + character)
}

fn range_json(span: Span, map: &LineMap) -> Value {
    let start = map.offset_to_line_col(span.start);
    let end = map.offset_to_line_col(span.end);
    json!({
        "start": { "line": start.line - 1, "character": start.col - 1 },
        "end": { "line": end.line - 1, "character": end.col - 1 },
    })
}

/// Pipeline prefix used for diagnostics publishing: first failing stage
/// wins; verification is not run on every keystroke.
fn collect_diagnostics(file: &SourceFile) -> Vec<Diagnostic> {
    match analyze_source(file) {
        Ok(_) => Vec::new(),
        Err(diags) => diags,
    }
}

#[derive(Default)]
struct Server {
    documents: AHashMap<String, String>,
}

impl Server {
    fn handle(&mut self, message: &Value, writer: &mut impl Write) -> std::io::Result<Loop> {
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            return Ok(Loop::Continue);
        };
        let id = message.get("id").cloned();

        match method {
            "initialize" => {
                let result = json!({
                    "capabilities": {
                        "textDocumentSync": 1,
                        "definitionProvider": true,
                        "hoverProvider": true,
                    },
                });
                self.respond(writer, id, result)?;
            }
            "shutdown" => {
                self.respond(writer, id, Value::Null)?;
            }
            "exit" => return Ok(Loop::Exit),
            "textDocument/didOpen" | "textDocument/didChange" => {
                self.handle_document_sync(message, method, writer)?;
            }
            "textDocument/definition" | "textDocument/hover" => {
                self.handle_position_request(message, method, id, writer)?;
            }
            _ => {}
        }
        Ok(Loop::Continue)
    }

    /// Writes a response, echoing `id` only when the request carried one.
    fn respond(
        &self,
        writer: &mut impl Write,
        id: Option<Value>,
        result: Value,
    ) -> std::io::Result<()> {
        let mut response = Map::new();
        response.insert("jsonrpc".to_string(), json!("2.0"));
        if let Some(id) = id {
            response.insert("id".to_string(), id);
        }
        response.insert("result".to_string(), result);
        write_message(writer, &Value::Object(response).to_string())
    }

    fn handle_document_sync(
        &mut self,
        message: &Value,
        method: &str,
        writer: &mut impl Write,
    ) -> std::io::Result<()> {
        let Some(params) = message.get("params") else {
            return Ok(());
        };
        let Some(uri) = params
            .get("textDocument")
            .and_then(|doc| doc.get("uri"))
            .and_then(Value::as_str)
        else {
            return Ok(());
        };

        let text = if method == "textDocument/didOpen" {
            params
                .get("textDocument")
                .and_then(|doc| doc.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string)
        } else {
            // The first change entry's text is a full replacement.
            params
                .get("contentChanges")
                .and_then(Value::as_array)
                .and_then(|changes| changes.first())
                .and_then(|change| change.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let Some(text) = text else {
            return Ok(());
        };

        self.documents.insert(uri.to_string(), text.clone());

        let file = SourceFile::new(uri_to_path(uri), text.clone());
        let map = LineMap::new(&text);
        let diagnostics: Vec<Value> = collect_diagnostics(&file)
            .iter()
            .map(|d| {
                let range = d
                    .span
                    .map_or_else(|| range_json(Span::new(0, 0), &map), |s| range_json(s, &map));
                json!({
                    "range": range,
                    "severity": lsp_severity(d.severity),
                    "message": d.message,
                })
            })
            .collect();

        let notification = json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": { "uri": uri, "diagnostics": diagnostics },
        });
        write_message(writer, &notification.to_string())
    }

    fn handle_position_request(
        &mut self,
        message: &Value,
        method: &str,
        id: Option<Value>,
        writer: &mut impl Write,
    ) -> std::io::Result<()> {
        let Some(params) = message.get("params") else {
            return Ok(());
        };
        let Some(uri) = params
            .get("textDocument")
            .and_then(|doc| doc.get("uri"))
            .and_then(Value::as_str)
        else {
            return Ok(());
        };
        let (Some(line), Some(character)) = (
            params
                .get("position")
                .and_then(|p| p.get("line"))
                .and_then(Value::as_u64),
            params
                .get("position")
                .and_then(|p| p.get("character"))
                .and_then(Value::as_u64),
        ) else {
            return Ok(());
        };

        let Some(text) = self.documents.get(uri).cloned() else {
            return Ok(());
        };
        let map = LineMap::new(&text);
        let Some(offset) = offset_from_position(&map, line, character) else {
            return Ok(());
        };

        let file = SourceFile::new(uri_to_path(uri), text);
        let Ok((program, resolution, type_info)) = analyze_source(&file) else {
            return Ok(());
        };

        let result = if method == "textDocument/definition" {
            definition_result(&resolution, offset, uri, &map)
        } else {
            hover_result(&program, &type_info, offset, &map)
        };
        self.respond(writer, id, result)
    }
}

fn definition_result(
    resolution: &Resolution,
    offset: usize,
    uri: &str,
    map: &LineMap,
) -> Value {
    match resolution.definition_at(offset) {
        Some(symbol) => json!({
            "uri": uri,
            "range": range_json(symbol.span, map),
        }),
        None => Value::Null,
    }
}

fn hover_result(program: &Program, type_info: &TypeInfo, offset: usize, map: &LineMap) -> Value {
    let mut best: Option<&Expr> = None;
    for f in program.functions() {
        find_in_block(&f.body, offset, &mut best);
    }

    if let Some(expr) = best
        && let Some(ty) = type_info.expr_types.get(&expr.id)
    {
        return json!({
            "contents": { "kind": "plaintext", "value": ty.display_name() },
            "range": range_json(expr.span, map),
        });
    }
    Value::Null
}

fn find_in_block<'p>(block: &'p Block, offset: usize, best: &mut Option<&'p Expr>) {
    for stmt in &block.stmts {
        find_in_stmt(stmt, offset, best);
    }
}

fn find_in_stmt<'p>(stmt: &'p Stmt, offset: usize, best: &mut Option<&'p Expr>) {
    match &stmt.node {
        StmtNode::Let { value, .. } => find_in_expr(value, offset, best),
        StmtNode::Return { value } => {
            if let Some(value) = value {
                find_in_expr(value, offset, best);
            }
        }
        StmtNode::Expr { expr } => find_in_expr(expr, offset, best),
        StmtNode::If {
            cond,
            then_block,
            else_block,
        } => {
            find_in_expr(cond, offset, best);
            find_in_block(then_block, offset, best);
            if let Some(else_block) = else_block {
                find_in_block(else_block, offset, best);
            }
        }
        StmtNode::While { cond, body } => {
            find_in_expr(cond, offset, best);
            find_in_block(body, offset, best);
        }
        StmtNode::Block { block } => find_in_block(block, offset, best),
        StmtNode::Unsafe { body } => find_in_block(body, offset, best),
    }
}

/// Tracks the smallest expression whose span contains `offset`.
fn find_in_expr<'p>(expr: &'p Expr, offset: usize, best: &mut Option<&'p Expr>) {
    if expr.span.contains(offset)
        && best.is_none_or(|b| expr.span.len() < b.span.len())
    {
        *best = Some(expr);
    }

    match &expr.node {
        ExprNode::Member { base, .. } => find_in_expr(base, offset, best),
        ExprNode::Unary { rhs, .. } => find_in_expr(rhs, offset, best),
        ExprNode::Binary { lhs, rhs, .. } => {
            find_in_expr(lhs, offset, best);
            find_in_expr(rhs, offset, best);
        }
        ExprNode::Call { callee, args } => {
            find_in_expr(callee, offset, best);
            for arg in args {
                find_in_expr(arg, offset, best);
            }
        }
        ExprNode::Group { inner } => find_in_expr(inner, offset, best),
        ExprNode::StructLiteral { fields, .. } => {
            for field in fields {
                find_in_expr(&field.value, offset, best);
            }
        }
        ExprNode::Int(_)
        | ExprNode::Bool(_)
        | ExprNode::String(_)
        | ExprNode::Name(_)
        | ExprNode::ScopedName { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_uris_are_percent_decoded() {
        assert_eq!(uri_to_path("file:///tmp/a%20b.curlee"), "/tmp/a b.curlee");
        assert_eq!(uri_to_path("untitled:demo"), "untitled:demo");
    }
}
