//! Process and wire-protocol exit statuses.

use std::fmt;

/// Exit status shared by the `stagefmt` binary and daemon responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Nothing failed (and nothing changed while change is fatal).
    Success,
    /// At least one target failed to format, or the command itself failed.
    Failure,
    /// Mutually exclusive or incomplete mode flags.
    BadArgs,
    /// At least one target changed, or would change in a dry run.
    FileChanged,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
            ExitStatus::BadArgs => 2,
            ExitStatus::FileChanged => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitStatus::Success),
            1 => Some(ExitStatus::Failure),
            2 => Some(ExitStatus::BadArgs),
            3 => Some(ExitStatus::FileChanged),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.code().fmt(f)
    }
}
