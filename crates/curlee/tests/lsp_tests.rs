//! LSP adapter tests over in-memory transports.

use std::io::Cursor;

use curlee::lsp::run_server;
use serde_json::{Value, json};

/// Frames a message the way a client would.
fn frame(message: &Value) -> String {
    let payload = message.to_string();
    format!("Content-Length: {}\r\n\r\n{payload}", payload.len())
}

/// Splits the server's output stream back into JSON messages.
fn parse_frames(bytes: &[u8]) -> Vec<Value> {
    let text = String::from_utf8(bytes.to_vec()).expect("output should be utf-8");
    let mut messages = Vec::new();
    let mut rest = text.as_str();
    while let Some(header_end) = rest.find("\r\n\r\n") {
        let header = &rest[..header_end];
        let length: usize = header
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length:"))
            .expect("header should carry a length")
            .trim()
            .parse()
            .expect("length should parse");
        let body_start = header_end + 4;
        let body = &rest[body_start..body_start + length];
        messages.push(serde_json::from_str(body).expect("body should be json"));
        rest = &rest[body_start + length..];
    }
    messages
}

fn session(requests: &[Value]) -> Vec<Value> {
    let input: String = requests.iter().map(|r| frame(r)).collect();
    let mut reader = Cursor::new(input.into_bytes());
    let mut output = Vec::new();
    run_server(&mut reader, &mut output).expect("server loop should not fail");
    parse_frames(&output)
}

fn did_open(uri: &str, text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "textDocument/didOpen",
        "params": { "textDocument": { "uri": uri, "text": text } },
    })
}

#[test]
fn initialize_advertises_capabilities() {
    let responses = session(&[json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {},
    })]);
    assert_eq!(responses.len(), 1);
    let caps = &responses[0]["result"]["capabilities"];
    assert_eq!(caps["textDocumentSync"], 1);
    assert_eq!(caps["definitionProvider"], true);
    assert_eq!(caps["hoverProvider"], true);
    assert_eq!(responses[0]["id"], 1);
}

#[test]
fn shutdown_returns_null_result() {
    let responses = session(&[json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "shutdown",
    })]);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["result"], Value::Null);
}

#[test]
fn did_open_publishes_empty_diagnostics_for_clean_source() {
    let responses = session(&[did_open(
        "file:///demo.curlee",
        "fn main() -> Int { return 1; }",
    )]);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["method"], "textDocument/publishDiagnostics");
    assert_eq!(responses[0]["params"]["uri"], "file:///demo.curlee");
    assert_eq!(
        responses[0]["params"]["diagnostics"]
            .as_array()
            .expect("diagnostics array")
            .len(),
        0
    );
}

#[test]
fn did_open_publishes_type_errors_with_ranges() {
    let responses = session(&[did_open(
        "file:///demo.curlee",
        "fn main() -> Int { return nope; }",
    )]);
    let diagnostics = responses[0]["params"]["diagnostics"]
        .as_array()
        .expect("diagnostics array");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["severity"], 1);
    assert!(
        diagnostics[0]["message"]
            .as_str()
            .expect("message string")
            .contains("unknown name 'nope'")
    );
    assert_eq!(diagnostics[0]["range"]["start"]["line"], 0);
}

#[test]
fn did_change_replaces_the_document() {
    let change = json!({
        "jsonrpc": "2.0",
        "method": "textDocument/didChange",
        "params": {
            "textDocument": { "uri": "file:///demo.curlee" },
            "contentChanges": [ { "text": "fn main() -> Int { return 2; }" } ],
        },
    });
    let responses = session(&[did_open("file:///demo.curlee", "fn broken( { }"), change]);
    assert_eq!(responses.len(), 2);
    let first = responses[0]["params"]["diagnostics"].as_array().expect("array");
    let second = responses[1]["params"]["diagnostics"].as_array().expect("array");
    assert!(!first.is_empty(), "broken document should have diagnostics");
    assert!(second.is_empty(), "fixed document should be clean");
}

#[test]
fn hover_reports_the_expression_type() {
    let text = "fn main() -> Int { let x: Int = 1; return x + 2; }";
    let offset = text.rfind("x + 2").expect("source contains the return expression");
    let hover = json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "textDocument/hover",
        "params": {
            "textDocument": { "uri": "file:///demo.curlee" },
            "position": { "line": 0, "character": offset },
        },
    });
    let responses = session(&[did_open("file:///demo.curlee", text), hover]);
    let hover_response = &responses[1];
    assert_eq!(hover_response["id"], 3);
    assert_eq!(hover_response["result"]["contents"]["kind"], "plaintext");
    assert_eq!(hover_response["result"]["contents"]["value"], "Int");
}

#[test]
fn definition_points_at_the_declaration() {
    let text = "fn main() -> Int { let answer: Int = 1; return answer; }";
    let use_offset = text.rfind("answer").expect("use exists");
    let decl_offset = text.find("answer").expect("declaration exists");
    let definition = json!({
        "jsonrpc": "2.0",
        "id": 4,
        "method": "textDocument/definition",
        "params": {
            "textDocument": { "uri": "file:///demo.curlee" },
            "position": { "line": 0, "character": use_offset },
        },
    });
    let responses = session(&[did_open("file:///demo.curlee", text), definition]);
    let result = &responses[1]["result"];
    assert_eq!(result["uri"], "file:///demo.curlee");
    assert_eq!(
        result["range"]["start"]["character"],
        u64::try_from(decl_offset).expect("offset fits")
    );
}

#[test]
fn definition_misses_return_null() {
    let text = "fn main() -> Int { return 1; }";
    let definition = json!({
        "jsonrpc": "2.0",
        "id": 5,
        "method": "textDocument/definition",
        "params": {
            "textDocument": { "uri": "file:///demo.curlee" },
            "position": { "line": 0, "character": 0 },
        },
    });
    let responses = session(&[did_open("file:///demo.curlee", text), definition]);
    assert_eq!(responses[1]["result"], Value::Null);
}

#[test]
fn exit_stops_the_loop() {
    let responses = session(&[
        json!({ "jsonrpc": "2.0", "method": "exit" }),
        json!({ "jsonrpc": "2.0", "id": 9, "method": "initialize", "params": {} }),
    ]);
    assert!(responses.is_empty(), "nothing may be handled after exit");
}

#[test]
fn hover_on_whitespace_returns_null() {
    let text = "fn main() -> Int { return 1; }";
    let offset = text.find("{ ").expect("gap exists") + 1;
    let hover = json!({
        "jsonrpc": "2.0",
        "id": 6,
        "method": "textDocument/hover",
        "params": {
            "textDocument": { "uri": "file:///demo.curlee" },
            "position": { "line": 0, "character": offset },
        },
    });
    let responses = session(&[did_open("file:///demo.curlee", text), hover]);
    assert_eq!(responses[1]["result"], Value::Null);
}

#[test]
fn requests_for_unopened_documents_are_ignored() {
    let hover = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "textDocument/hover",
        "params": {
            "textDocument": { "uri": "file:///never-opened.curlee" },
            "position": { "line": 0, "character": 0 },
        },
    });
    let responses = session(&[hover]);
    assert!(responses.is_empty(), "no document, no response");
}

#[test]
fn definition_of_a_function_call_points_at_the_declaration() {
    let text = "fn helper() -> Int { return 1; } fn main() -> Int { return helper(); }";
    let use_offset = text.rfind("helper").expect("callee use exists");
    let definition = json!({
        "jsonrpc": "2.0",
        "id": 8,
        "method": "textDocument/definition",
        "params": {
            "textDocument": { "uri": "file:///demo.curlee" },
            "position": { "line": 0, "character": use_offset },
        },
    });
    let responses = session(&[did_open("file:///demo.curlee", text), definition]);
    let decl_offset = text.find("helper").expect("declaration exists");
    assert_eq!(
        responses[1]["result"]["range"]["start"]["character"],
        u64::try_from(decl_offset).expect("offset fits")
    );
}

#[test]
fn plain_newline_header_terminators_are_accepted() {
    let message = json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} });
    let payload = message.to_string();
    let input = format!("Content-Length: {}\n\n{payload}", payload.len());
    let mut reader = Cursor::new(input.into_bytes());
    let mut output = Vec::new();
    run_server(&mut reader, &mut output).expect("server loop should not fail");
    assert_eq!(parse_frames(&output).len(), 1);
}
