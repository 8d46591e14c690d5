//! Output sinks for the VM's `print`.
//!
//! The VM never writes to stdout directly; it renders through a
//! [`PrintSink`] so embedders and tests can capture or suppress output.

use std::io::Write as _;

/// Receives one rendered line per executed `print`.
pub trait PrintSink {
    /// Writes `text` followed by a newline.
    fn print_line(&mut self, text: &str);
}

/// Default sink: writes to the process stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintSink for StdPrint {
    fn print_line(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{text}");
        let _ = stdout.flush();
    }
}

/// Collects all output into a string. Useful for tests.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintSink for CollectStringPrint {
    fn print_line(&mut self, text: &str) {
        self.0.push_str(text);
        self.0.push('\n');
    }
}

/// Ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintSink for NoPrint {
    fn print_line(&mut self, _text: &str) {}
}
