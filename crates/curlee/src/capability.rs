//! Capability-based permission checks for the VM.
//!
//! Capabilities are named permissions granted when the VM is constructed —
//! from `--cap` flags or a bundle manifest — and checked by side-effecting
//! opcodes before anything observable happens. The set is immutable for the
//! duration of a run: capabilities cannot be escalated by executing code.

use ahash::AHashSet;

/// Capability required by the `Print` opcode.
pub const CAP_STDOUT: &str = "io:stdout";

/// Capability required by the `PythonCall` opcode.
pub const CAP_PYTHON_FFI: &str = "python:ffi";

/// An immutable set of granted capability names.
///
/// An empty set denies every gated operation, making the VM a pure
/// computation engine.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    granted: AHashSet<String>,
}

impl CapabilitySet {
    #[must_use]
    pub fn new(capabilities: impl IntoIterator<Item = String>) -> Self {
        Self {
            granted: capabilities.into_iter().collect(),
        }
    }

    /// The empty set: deny everything.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.granted.contains(name)
    }

    /// Names granted here but not in `self`, in unspecified order.
    ///
    /// Used to report which of a bundle's required capabilities the caller
    /// failed to grant.
    #[must_use]
    pub fn missing_from<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|name| !self.granted.contains(name.as_str()))
            .map(String::as_str)
            .collect()
    }
}

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.granted.is_empty() {
            return f.write_str("CapabilitySet(none)");
        }
        let mut names: Vec<&str> = self.granted.iter().map(String::as_str).collect();
        names.sort_unstable();
        write!(f, "CapabilitySet({})", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_denies_everything() {
        let caps = CapabilitySet::none();
        assert!(!caps.contains(CAP_STDOUT));
        assert!(!caps.contains(CAP_PYTHON_FFI));
    }

    #[test]
    fn granted_names_are_members() {
        let caps = CapabilitySet::new(vec![CAP_STDOUT.to_string()]);
        assert!(caps.contains(CAP_STDOUT));
        assert!(!caps.contains(CAP_PYTHON_FFI));
    }

    #[test]
    fn missing_from_reports_ungranted_requirements() {
        let caps = CapabilitySet::new(vec![CAP_STDOUT.to_string()]);
        let required = vec![CAP_STDOUT.to_string(), "net:none".to_string()];
        assert_eq!(caps.missing_from(&required), vec!["net:none"]);
    }
}
