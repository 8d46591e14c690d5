//! The out-of-process interop runner stub (protocol version 1).
//!
//! Reads one JSON request from stdin, writes one JSON response to stdout,
//! and exits: 0 for a fulfilled request, 2 for a protocol or request error.

use std::io::BufRead;
use std::process::ExitCode;

use curlee::interop::{ERROR_KIND_INVALID_REQUEST, error_response, handle_request_line};

fn main() -> ExitCode {
    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line);
    if !matches!(read, Ok(n) if n > 0) {
        let response = error_response("", ERROR_KIND_INVALID_REQUEST, "empty input");
        println!("{response}");
        return ExitCode::from(2);
    }

    let (response, code) = handle_request_line(line.trim_end());
    println!("{response}");
    ExitCode::from(code)
}
