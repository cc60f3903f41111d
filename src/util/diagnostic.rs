//! User-friendly diagnostic messages.
//!
//! Every fatal error printed by the CLI carries its root cause, the context
//! that led to it, and what the user can try next.

use std::fmt;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when modules cannot be located.
    pub const LOCATE_MODULE: &str =
        "map the module to a location with `--module-location <module>=<uri>`";

    /// Suggestion when a library family is missing.
    pub const LIBRARY_VERSION: &str =
        "pin a library version with `--library junit=<version>` if the module belongs to JUnit";

    /// Suggestion for fetch failures.
    pub const FETCH_FAILED: &str = "check your network connection or retry with `--offline`";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(message)
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let severity = match (color, self.severity) {
            (true, Severity::Error) => "\x1b[1;31merror\x1b[0m".to_string(),
            (true, Severity::Warning) => "\x1b[1;33mwarning\x1b[0m".to_string(),
            (false, severity) => severity.to_string(),
        };

        let mut output = format!("{}: {}\n", severity, self.message);

        for ctx in &self.context {
            output.push_str(&format!("  -> {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            output.push_str("help: consider:\n");
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("2 modules could not be resolved")
            .with_context("missing: org.example.lib")
            .with_suggestion(suggestions::LOCATE_MODULE);

        let output = diag.format(false);
        assert!(output.starts_with("error: 2 modules"));
        assert!(output.contains("  -> missing: org.example.lib"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("1. map the module"));
    }

    #[test]
    fn test_warning_severity() {
        let diag = Diagnostic::warning("image not linked");
        assert_eq!(diag.severity, Severity::Warning);
        assert!(diag.to_string().starts_with("warning:"));
    }
}
