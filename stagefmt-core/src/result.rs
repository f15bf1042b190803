//! Per-target formatting outcomes.

use std::cmp::Ordering;
use std::fmt;

/// What kind of failure produced a [`FormattingResult::Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// Reading or writing the target failed.
    Io,
    /// The formatter rejected the content.
    Format,
    /// The formatter panicked.
    Panic,
}

/// Outcome of processing one target.
///
/// Ordered by severity (`AlreadyFormatted < WouldFormat < Formatted < Error`),
/// then by name.
#[derive(Debug, Clone)]
pub enum FormattingResult {
    AlreadyFormatted {
        name: String,
    },
    WouldFormat {
        name: String,
    },
    Formatted {
        name: String,
    },
    Error {
        name: String,
        message: String,
        cause: FailureCause,
    },
}

impl FormattingResult {
    pub fn name(&self) -> &str {
        match self {
            FormattingResult::AlreadyFormatted { name }
            | FormattingResult::WouldFormat { name }
            | FormattingResult::Formatted { name }
            | FormattingResult::Error { name, .. } => name,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FormattingResult::AlreadyFormatted { .. } => 0,
            FormattingResult::WouldFormat { .. } => 1,
            FormattingResult::Formatted { .. } => 2,
            FormattingResult::Error { .. } => 3,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FormattingResult::Error { .. })
    }

    /// Content differs from the formatted form (written or not).
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            FormattingResult::WouldFormat { .. } | FormattingResult::Formatted { .. }
        )
    }

    /// The report line for this outcome; `None` for already-formatted targets.
    pub fn report_line(&self) -> Option<String> {
        match self {
            FormattingResult::AlreadyFormatted { .. } => None,
            FormattingResult::WouldFormat { name } => Some(format!("🛠️ Would format {name}")),
            FormattingResult::Formatted { name } => Some(format!("✅ Formatted {name}")),
            FormattingResult::Error { message, .. } => Some(format!("⛔️ {message}")),
        }
    }
}

impl fmt::Display for FormattingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.report_line() {
            Some(line) => f.write_str(&line),
            None => write!(f, "{} is already formatted", self.name()),
        }
    }
}

impl Ord for FormattingResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.name().cmp(other.name()))
    }
}

impl PartialOrd for FormattingResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FormattingResult {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FormattingResult {}
