//! The Curlee language server over stdio.

use std::io::{BufReader, Write as _, stdin, stdout};
use std::process::ExitCode;

use curlee::lsp::run_server;

fn main() -> ExitCode {
    let mut reader = BufReader::new(stdin().lock());
    let mut writer = stdout().lock();
    match run_server(&mut reader, &mut writer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(std::io::stderr(), "error: {err}");
            ExitCode::FAILURE
        }
    }
}
