//! Source formatters.
//!
//! A [`Formatter`] is a pure text-to-text function. The dispatcher shares a
//! single instance across worker threads, so implementations must be
//! `Send + Sync`; plain closures qualify through the blanket impl.
//!
//! [`SpacingFormatter`] is the rule set shipped with the binary.

pub mod spacing;

pub use spacing::SpacingFormatter;

use thiserror::Error;

/// The formatter could not make sense of its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unterminated literal starting on line {line}")]
    UnterminatedLiteral { line: usize },

    #[error("unterminated block comment starting on line {line}")]
    UnterminatedComment { line: usize },

    /// Free-form rejection from a custom formatter.
    #[error("{0}")]
    Rejected(String),
}

/// Text-to-text source formatter.
pub trait Formatter: Send + Sync {
    fn format(&self, source: &str) -> Result<String, FormatError>;
}

impl<F> Formatter for F
where
    F: Fn(&str) -> Result<String, FormatError> + Send + Sync,
{
    fn format(&self, source: &str) -> Result<String, FormatError> {
        self(source)
    }
}
