//! Formatting pipeline: resolve a scope, dispatch, render the report.
//!
//! [`run`] is the shared entrypoint for the `stagefmt` binary and the daemon;
//! [`run_scope`] starts from an already resolved scope (stream mode).

pub mod dispatch;
pub mod error;
pub mod report;

pub use dispatch::Dispatcher;
pub use error::PipelineError;
pub use report::{CommandResult, FormattingStats};

use std::path::PathBuf;
use std::time::Instant;

use stagefmt_scope::{Scope, ScopeResolver};

/// Which resolver mode builds the scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    WorkingDir,
    PreCommit,
    PrePush { commit: String },
}

/// One formatting command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatRequest {
    pub mode: Mode,
    pub files: Vec<PathBuf>,
    pub dry_run: bool,
    pub collect_stats: bool,
}

/// Resolve, format and report one command.
pub fn run(
    request: &FormatRequest,
    resolver: &ScopeResolver,
    dispatcher: &Dispatcher,
) -> Result<CommandResult, PipelineError> {
    let started = Instant::now();
    let scope = match &request.mode {
        Mode::WorkingDir => resolver.working_dir(&request.files, request.dry_run),
        Mode::PreCommit => resolver.pre_commit(&request.files, request.dry_run)?,
        Mode::PrePush { commit } => resolver.pre_push(&request.files, commit)?,
    };
    let pre_push = matches!(request.mode, Mode::PrePush { .. });
    let stats_since = request.collect_stats.then_some(started);
    Ok(run_scope(&scope, pre_push, dispatcher, stats_since))
}

/// Format an already resolved scope. Statistics are collected when
/// `stats_since` (the moment configuration began) is given.
pub fn run_scope(
    scope: &Scope,
    pre_push: bool,
    dispatcher: &Dispatcher,
    stats_since: Option<Instant>,
) -> CommandResult {
    let configured = Instant::now();
    let chars_before = dispatcher.chars_processed();
    let results = dispatcher.dispatch(scope);
    let formatted = Instant::now();

    let mut result = report::render(&results, pre_push);
    tracing::info!(
        targets = scope.targets.len(),
        failed = result.has_failure,
        changed = result.has_file_changed,
        "formatting finished"
    );

    if let Some(started) = stats_since {
        result.stats = Some(FormattingStats {
            configure_ms: millis(configured - started),
            format_ms: millis(formatted - configured),
            report_ms: millis(formatted.elapsed()),
            target_count: scope.targets.len(),
            blob_count: scope.targets.iter().filter(|t| t.touches_index()).count(),
            file_count: scope
                .targets
                .iter()
                .filter(|t| t.touches_working_tree())
                .count(),
            chars_processed: dispatcher.chars_processed().saturating_sub(chars_before),
        });
    }
    result
}

fn millis(duration: std::time::Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}
