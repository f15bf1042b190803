//! Error types for stagefmt-core.

use std::path::PathBuf;

use thiserror::Error;

/// A `git` invocation that could not be started or exited non-zero.
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` process could not be spawned or its pipes failed.
    #[error("failed to run git {args}: {source}")]
    Spawn {
        args: String,
        #[source]
        source: std::io::Error,
    },

    /// The `git` process exited with a non-zero status.
    #[error("git {args} failed with {status}: {stderr}")]
    Failed {
        args: String,
        status: String,
        stderr: String,
    },

    /// The output of `git` was expected to be text but was not UTF-8.
    #[error("git {args} produced output that is not valid UTF-8")]
    NonUtf8Output { args: String },
}

/// Failure to read or write the content of a single target.
#[derive(Debug, Error)]
pub enum TargetError {
    /// Filesystem failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading a blob or updating the index failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Blob or stream content is not UTF-8 text.
    #[error("{name} is not valid UTF-8")]
    InvalidUtf8 { name: String },

    /// A writer panicked while holding the index lock.
    #[error("index update lock poisoned")]
    IndexLockPoisoned,

    /// The output callback of a stream target failed.
    #[error("failed to write to {name}: {source}")]
    Stream {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while loading layered settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error, with the offending file path.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Convenience constructor for [`TargetError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TargetError {
    TargetError::Io {
        path: path.into(),
        source,
    }
}
