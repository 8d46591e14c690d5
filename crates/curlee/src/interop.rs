//! The out-of-process interop protocol (version 1).
//!
//! One JSON object per line in each direction. The request names an `op`
//! (`handshake` or `echo`) and carries `protocol_version: 1`; the response
//! echoes the request `id` and reports either a string result or a
//! structured error. The same handling backs the `curlee-runner` binary,
//! the VM's process bridge, and the protocol tests.

use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const PROTOCOL_VERSION: i64 = 1;

/// Error kind for malformed or unsupported requests.
pub const ERROR_KIND_INVALID_REQUEST: &str = "invalid_request";

/// Error kind for requests with the wrong protocol version.
pub const ERROR_KIND_VERSION_UNSUPPORTED: &str = "protocol_version_unsupported";

/// A successful operation's result payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl ResultPayload {
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            kind: "string".to_string(),
            value: value.into(),
        }
    }
}

/// A failed operation's error payload. Nothing in protocol v1 is retryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

/// Builds a success response with a string result.
#[must_use]
pub fn success_response(id: &str, value: &str) -> Value {
    json!({
        "id": id,
        "ok": true,
        "protocol_version": PROTOCOL_VERSION,
        "result": ResultPayload::string(value),
    })
}

/// Builds an error response.
#[must_use]
pub fn error_response(id: &str, kind: &str, message: &str) -> Value {
    json!({
        "id": id,
        "ok": false,
        "protocol_version": PROTOCOL_VERSION,
        "error": ErrorPayload {
            kind: kind.to_string(),
            message: message.to_string(),
            retryable: false,
        },
    })
}

fn get_str<'v>(obj: &'v Value, key: &str) -> Option<&'v str> {
    obj.get(key).and_then(Value::as_str)
}

fn protocol_version_is_supported(obj: &Value) -> bool {
    let Some(version) = obj.get("protocol_version") else {
        return false;
    };
    version.as_i64() == Some(PROTOCOL_VERSION)
        || version.as_f64() == Some(PROTOCOL_VERSION as f64)
}

/// Handles one request line, returning the response and the process exit
/// code the runner should use (0 for success, 2 for protocol errors).
#[must_use]
pub fn handle_request_line(line: &str) -> (Value, u8) {
    let Ok(parsed) = serde_json::from_str::<Value>(line) else {
        return (
            error_response("", ERROR_KIND_INVALID_REQUEST, "malformed json"),
            2,
        );
    };
    if !parsed.is_object() {
        return (
            error_response("", ERROR_KIND_INVALID_REQUEST, "malformed json"),
            2,
        );
    }

    let id = get_str(&parsed, "id").unwrap_or("").to_string();

    if !protocol_version_is_supported(&parsed) {
        return (
            error_response(&id, ERROR_KIND_VERSION_UNSUPPORTED, "unsupported protocol version"),
            2,
        );
    }

    let Some(op) = get_str(&parsed, "op") else {
        return (
            error_response(&id, ERROR_KIND_INVALID_REQUEST, "missing op"),
            2,
        );
    };

    match op {
        "handshake" => (success_response(&id, "ok"), 0),
        "echo" => {
            let Some(echo) = parsed.get("echo").filter(|v| v.is_object()) else {
                return (
                    error_response(&id, ERROR_KIND_INVALID_REQUEST, "missing echo payload"),
                    2,
                );
            };
            let Some(value) = get_str(echo, "value") else {
                return (
                    error_response(&id, ERROR_KIND_INVALID_REQUEST, "echo.value must be string"),
                    2,
                );
            };
            (success_response(&id, value), 0)
        }
        _ => (
            error_response(&id, ERROR_KIND_INVALID_REQUEST, "unknown op"),
            2,
        ),
    }
}

/// Host side of the FFI boundary: how the VM performs a handshake exchange.
///
/// The VM requests the operation; the bridge decides how (and whether) to
/// fulfill it. Capability checks happen in the VM before the bridge is
/// asked.
pub trait InteropBridge {
    /// Performs one handshake exchange. Errors become VM runtime errors.
    fn handshake(&mut self) -> Result<(), String>;
}

/// Fulfills handshakes in-process using the protocol handler directly.
///
/// This is the default bridge: it exercises the full request/response
/// encoding without spawning a process.
#[derive(Debug, Default)]
pub struct LoopbackBridge;

impl InteropBridge for LoopbackBridge {
    fn handshake(&mut self) -> Result<(), String> {
        let request = json!({
            "protocol_version": PROTOCOL_VERSION,
            "id": "vm-handshake",
            "op": "handshake",
        });
        let (response, _) = handle_request_line(&request.to_string());
        validate_handshake_response(&response)
    }
}

/// Spawns an external runner process for each handshake exchange.
#[derive(Debug)]
pub struct ProcessBridge {
    /// The runner executable to spawn.
    pub command: String,
}

impl ProcessBridge {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl InteropBridge for ProcessBridge {
    fn handshake(&mut self) -> Result<(), String> {
        let mut child = Command::new(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| format!("failed to spawn runner '{}': {err}", self.command))?;

        let request = json!({
            "protocol_version": PROTOCOL_VERSION,
            "id": "vm-handshake",
            "op": "handshake",
        });

        {
            let Some(stdin) = child.stdin.as_mut() else {
                return Err("runner stdin unavailable".to_string());
            };
            writeln!(stdin, "{request}").map_err(|err| format!("runner write failed: {err}"))?;
        }
        drop(child.stdin.take());

        let Some(stdout) = child.stdout.take() else {
            return Err("runner stdout unavailable".to_string());
        };
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .map_err(|err| format!("runner read failed: {err}"))?;
        let _ = child.wait();

        let response: Value = serde_json::from_str(line.trim_end())
            .map_err(|_| "malformed runner response".to_string())?;
        validate_handshake_response(&response)
    }
}

fn validate_handshake_response(response: &Value) -> Result<(), String> {
    if response.get("ok").and_then(Value::as_bool) != Some(true) {
        let message = response
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("handshake rejected");
        return Err(format!("runner handshake failed: {message}"));
    }
    let value = response
        .get("result")
        .and_then(|r| r.get("value"))
        .and_then(Value::as_str);
    if value != Some("ok") {
        return Err("runner handshake failed: unexpected result".to_string());
    }
    Ok(())
}
