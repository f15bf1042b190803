use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use stagefmt_pipeline::PipelineError;

/// Error surface for the daemon runtime, lock file and client protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (no usable lock file at {lock})")]
    DaemonNotRunning { lock: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
