//! Error types for stagefmt-pipeline.

use thiserror::Error;

use stagefmt_scope::ScopeError;

/// Failures that abort a whole command (per-target failures never do).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to resolve targets: {0}")]
    Scope(#[from] ScopeError),

    #[error("failed to start formatting workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
