//! Rendering of sorted results into the user-facing report.

use std::fmt;

use stagefmt_core::{ExitStatus, FormattingResult};

pub const NOTHING_TO_FORMAT: &str = "Nothing to format";

pub const PRE_PUSH_WARNING: &str = "⚠️ The committed files have formatting errors. \
Please format the files and commit the formatting changes.";

/// Timings and counts for one command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormattingStats {
    pub configure_ms: f64,
    pub format_ms: f64,
    pub report_ms: f64,
    pub target_count: usize,
    /// Targets whose write updates the index.
    pub blob_count: usize,
    /// Targets whose write updates the working tree.
    pub file_count: usize,
    pub chars_processed: u64,
}

impl fmt::Display for FormattingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Time to configure: {:.3}ms", self.configure_ms)?;
        writeln!(f, "   Time to format: {:.3}ms", self.format_ms)?;
        writeln!(f, "   Time to report: {:.3}ms", self.report_ms)?;
        writeln!(f, "     Target count: {}", self.target_count)?;
        writeln!(f, "       Blob count: {}", self.blob_count)?;
        writeln!(f, "       File count: {}", self.file_count)?;
        write!(f, "  Chars processed: {}", self.chars_processed)
    }
}

/// Report text plus the flags scripted callers act on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandResult {
    /// One `\n`-terminated line per reported outcome.
    pub output: String,
    pub has_failure: bool,
    pub has_file_changed: bool,
    pub stats: Option<FormattingStats>,
}

impl CommandResult {
    /// Failures win over changes; changes only count when `fail_on_change`.
    pub fn exit_status(&self, fail_on_change: bool) -> ExitStatus {
        if self.has_failure {
            ExitStatus::Failure
        } else if fail_on_change && self.has_file_changed {
            ExitStatus::FileChanged
        } else {
            ExitStatus::Success
        }
    }
}

/// Render sorted `results`. `pre_push` adds the committed-files warning when
/// anything would change.
pub fn render(results: &[FormattingResult], pre_push: bool) -> CommandResult {
    let mut output = String::new();
    if results.is_empty() {
        output.push_str(NOTHING_TO_FORMAT);
        output.push('\n');
    }

    let mut has_failure = false;
    let mut has_file_changed = false;
    for result in results {
        has_failure |= result.is_error();
        has_file_changed |= result.is_change();
        if let Some(line) = result.report_line() {
            output.push_str(&line);
            output.push('\n');
        }
    }

    if pre_push && has_file_changed {
        output.push_str(PRE_PUSH_WARNING);
        output.push('\n');
    }

    CommandResult {
        output,
        has_failure,
        has_file_changed,
        stats: None,
    }
}
