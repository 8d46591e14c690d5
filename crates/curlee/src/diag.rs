//! Compiler diagnostics.
//!
//! Every pass reports problems as [`Diagnostic`] values rather than printing
//! or panicking. A diagnostic has a severity, a message, an optional source
//! span, and optional related notes (for example, the first occurrence of a
//! duplicated field). Rendering to the CLI's text format lives here too so
//! all tools print diagnostics identically.

use crate::source::{LineMap, Span};

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// A secondary message attached to a diagnostic, optionally pointing at
/// another location (e.g. "first declared here").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Related {
    pub message: String,
    pub span: Option<Span>,
}

/// A single compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
    pub notes: Vec<Related>,
}

impl Diagnostic {
    /// An error diagnostic at `span`.
    #[must_use]
    pub fn error_at(span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span: Some(span),
            notes: Vec::new(),
        }
    }

    /// An error diagnostic with no location (file-level problems).
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    /// Attaches a related note and returns the diagnostic.
    #[must_use]
    pub fn with_note(mut self, message: impl Into<String>, span: Option<Span>) -> Self {
        self.notes.push(Related {
            message: message.into(),
            span,
        });
        self
    }
}

/// Renders a diagnostic in the CLI text format:
///
/// ```text
/// error: <message>
///   --> <path>:<line>:<col>
///   note: <message>
/// ```
///
/// Multi-line note messages (such as models) keep their extra lines indented
/// under the `note:` line.
#[must_use]
pub fn render(diag: &Diagnostic, path: &str, line_map: &LineMap) -> String {
    let mut out = String::new();
    let label = match diag.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Note => "note",
    };
    out.push_str(label);
    out.push_str(": ");
    out.push_str(&diag.message);
    out.push('\n');

    if let Some(span) = diag.span {
        let lc = line_map.offset_to_line_col(span.start);
        out.push_str(&format!("  --> {path}:{}:{}\n", lc.line, lc.col));
    }

    for note in &diag.notes {
        let mut lines = note.message.lines();
        if let Some(first) = lines.next() {
            out.push_str("  note: ");
            out.push_str(first);
            out.push('\n');
        }
        for rest in lines {
            out.push_str("  ");
            out.push_str(rest);
            out.push('\n');
        }
        if let Some(span) = note.span {
            let lc = line_map.offset_to_line_col(span.start);
            out.push_str(&format!("    --> {path}:{}:{}\n", lc.line, lc.col));
        }
    }

    out
}

/// Renders a whole batch in source order, one after another.
#[must_use]
pub fn render_all(diags: &[Diagnostic], path: &str, line_map: &LineMap) -> String {
    let mut out = String::new();
    for d in diags {
        out.push_str(&render(d, path, line_map));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_message_location_and_notes() {
        let map = LineMap::new("fn main() {}\nlet x = 1;\n");
        let diag = Diagnostic::error_at(Span::new(13, 16), "unknown name 'x'")
            .with_note("goal: x > 0", None);
        let text = render(&diag, "demo.curlee", &map);
        assert_eq!(
            text,
            "error: unknown name 'x'\n  --> demo.curlee:2:1\n  note: goal: x > 0\n"
        );
    }

    #[test]
    fn multi_line_notes_stay_indented() {
        let map = LineMap::new("x");
        let diag = Diagnostic::error("requires clause not satisfied")
            .with_note("model:\n  x = 0", None);
        let text = render(&diag, "m.curlee", &map);
        assert_eq!(
            text,
            "error: requires clause not satisfied\n  note: model:\n    x = 0\n"
        );
    }
}
