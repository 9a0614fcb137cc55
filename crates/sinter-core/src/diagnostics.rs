//! Diagnostic accumulation.
//!
//! Each pipeline stage runs to completion over the whole compilation unit,
//! pushing every diagnostic it can produce into a shared [`Diagnostics`]
//! collection. A stage with at least one error-severity entry prevents the
//! next stage from running but never cuts the current stage short, so the
//! user always gets the full report for the stage that failed.

use std::fmt;

use crate::Span;

/// Severity of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Blocks the next pipeline stage (and IR emission).
    Error,
    /// Reported but never blocks emission.
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// A single message with severity and source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: {}",
            self.span,
            self.severity.as_str(),
            self.message
        )
    }
}

/// Ordered collection of diagnostics for one compilation unit.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    has_errors: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error-severity diagnostic.
    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            span,
        });
    }

    /// Record a warning-severity diagnostic.
    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            span,
        });
    }

    /// Add a prebuilt diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.has_errors = true;
        }
        self.entries.push(diagnostic);
    }

    /// Whether any error-severity entry has been recorded.
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_set_error_flag() {
        let mut diags = Diagnostics::new();
        diags.warning(Span::new(1, 1, 1), "unused");
        assert!(!diags.has_errors());
        assert_eq!(diags.warning_count(), 1);
    }

    #[test]
    fn error_flag_is_sticky() {
        let mut diags = Diagnostics::new();
        diags.error(Span::new(2, 4, 1), "bad");
        diags.warning(Span::new(3, 1, 1), "meh");
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 2);
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn display_format() {
        let mut diags = Diagnostics::new();
        diags.error(Span::new(10, 5, 3), "unknown type 'Foo'");
        assert_eq!(format!("{diags}"), "10:5: error: unknown type 'Foo'\n");
    }
}
