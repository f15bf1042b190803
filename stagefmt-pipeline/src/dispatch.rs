//! Concurrent dispatcher: format every target of a scope on a worker pool.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use stagefmt_core::{FailureCause, FormattingResult, Target};
use stagefmt_format::Formatter;
use stagefmt_scope::Scope;

use crate::error::PipelineError;

/// Applies one formatter to many targets in parallel.
///
/// Reads, formatting and working-tree writes run unsynchronized; index
/// updates are serialized by the targets' shared staging area.
pub struct Dispatcher {
    formatter: Arc<dyn Formatter>,
    pool: rayon::ThreadPool,
    chars_processed: AtomicU64,
}

impl Dispatcher {
    /// `jobs = None` sizes the pool to the available parallelism.
    pub fn new(formatter: Arc<dyn Formatter>, jobs: Option<usize>) -> Result<Self, PipelineError> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("stagefmt-{i}"));
        if let Some(jobs) = jobs {
            builder = builder.num_threads(jobs.max(1));
        }
        Ok(Self {
            formatter,
            pool: builder.build()?,
            chars_processed: AtomicU64::new(0),
        })
    }

    /// Characters read from targets since construction.
    pub fn chars_processed(&self) -> u64 {
        self.chars_processed.load(Ordering::Relaxed)
    }

    /// Format all targets of `scope`; one result per target, sorted by
    /// severity, then name.
    pub fn dispatch(&self, scope: &Scope) -> Vec<FormattingResult> {
        let mut results: Vec<FormattingResult> = self.pool.install(|| {
            scope
                .targets
                .par_iter()
                .map(|target| self.format_target(target, scope.dry_run))
                .collect()
        });
        results.sort();
        results
    }

    /// Read, format and (unless `dry_run`) write back one target.
    pub fn format_target(&self, target: &Target, dry_run: bool) -> FormattingResult {
        let name = target.name();

        let content = match target.read() {
            Ok(content) => content,
            Err(e) => return io_failure(name, &e),
        };
        self.chars_processed
            .fetch_add(content.chars().count() as u64, Ordering::Relaxed);

        let formatted = match panic::catch_unwind(AssertUnwindSafe(|| self.formatter.format(&content))) {
            Ok(Ok(formatted)) => formatted,
            Ok(Err(e)) => return unexpected(name, &e, FailureCause::Format),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                return unexpected(name, &reason, FailureCause::Panic);
            }
        };

        if formatted == content {
            tracing::debug!(file = %name, "already formatted");
            return FormattingResult::AlreadyFormatted { name };
        }
        if dry_run {
            tracing::debug!(file = %name, "would format");
            return FormattingResult::WouldFormat { name };
        }
        match target.write(&formatted) {
            Ok(()) => {
                tracing::debug!(file = %name, "formatted");
                FormattingResult::Formatted { name }
            }
            Err(e) => io_failure(name, &e),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("threads", &self.pool.current_num_threads())
            .field("chars_processed", &self.chars_processed())
            .finish_non_exhaustive()
    }
}

fn io_failure(name: String, cause: &dyn std::fmt::Display) -> FormattingResult {
    tracing::warn!(file = %name, error = %cause, "target I/O failed");
    FormattingResult::Error {
        message: format!("I/O error while processing {name}: {cause}; skipping."),
        name,
        cause: FailureCause::Io,
    }
}

fn unexpected(name: String, cause: &dyn std::fmt::Display, kind: FailureCause) -> FormattingResult {
    tracing::warn!(file = %name, error = %cause, "formatter failed");
    FormattingResult::Error {
        message: format!("Unexpected error formatting {name}: {cause}"),
        name,
        cause: kind,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "formatter panicked".to_string()
    }
}
