//! Diagnostics sink — collects warnings and structural errors raised during
//! translation, each tagged with the source line number it came from.
//!
//! Warnings and structural errors never abort the pass; they accumulate here
//! and the caller decides what to do with them.  Fatal conditions are a
//! separate `TranslationError` and unwind immediately.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal conditions that abort the whole translation pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    /// The source tree is empty or its root is not a score.
    #[error("source tree is empty or has no score content")]
    EmptySourceTree,

    /// The skeleton builder found an unrecoverable structural problem
    /// (a part without an ID, or mismatched part-group start/stop).
    #[error("malformed skeleton at line {line}: {message}")]
    MalformedSkeleton { line: u32, message: String },

    /// An internal invariant of the translation engine was violated.
    /// This always indicates a bug, not bad input.
    #[error("internal invariant violation: {0}")]
    InternalInvariant(String),
}

/// How bad a diagnostic is.  `Warning` means the input was fully translated
/// anyway; `Structural` means an element was skipped or a default was
/// substituted, but the pass still completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Structural,
}

/// One recorded diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Source line number in the input document (0 when unknown).
    pub line: u32,
    /// Measure number in effect when the diagnostic was raised, if any.
    pub measure: Option<String>,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.severity {
            Severity::Warning => "warning",
            Severity::Structural => "error",
        };
        match &self.measure {
            Some(m) => write!(f, "{kind} (line {}, measure {m}): {}", self.line, self.message),
            None => write!(f, "{kind} (line {}): {}", self.line, self.message),
        }
    }
}

/// The injected sink.  The translator only ever appends; it never writes
/// to a fixed output stream.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    /// Measure number currently in effect, stamped onto new diagnostics.
    #[serde(skip)]
    current_measure: Option<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the measure number stamped onto subsequent diagnostics.
    pub fn set_measure(&mut self, number: Option<String>) {
        self.current_measure = number;
    }

    /// Record a recoverable warning.
    pub fn warning(&mut self, line: u32, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[msrlib] line {line}: {message}");
        self.items.push(Diagnostic {
            severity: Severity::Warning,
            line,
            measure: self.current_measure.clone(),
            message,
        });
    }

    /// Record a structural error: the offending element was skipped or a
    /// default was substituted, and translation continued.
    pub fn structural(&mut self, line: u32, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[msrlib] line {line}: {message}");
        self.items.push(Diagnostic {
            severity: Severity::Structural,
            line,
            measure: self.current_measure.clone(),
            message,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn warning_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn structural_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Structural)
            .count()
    }

    /// True if any recorded message contains the given fragment.
    /// Convenience for tests and callers filtering by condition.
    pub fn mentions(&self, fragment: &str) -> bool {
        self.items.iter().any(|d| d.message.contains(fragment))
    }
}
