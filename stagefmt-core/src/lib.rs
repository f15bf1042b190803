//! stagefmt core library: targets, results, the `git` collaborator, settings, errors.
//!
//! Public API surface:
//! - [`target`]: the [`Target`] sum type and its storage variants
//! - [`result`]: [`FormattingResult`] and its total order
//! - [`git`]: [`GitBackend`] and the process-backed [`GitCli`]
//! - [`settings`]: layered YAML [`Settings`]
//! - [`exit`]: [`ExitStatus`] shared by the CLI and the daemon protocol
//! - [`error`]: [`TargetError`], [`GitError`], [`SettingsError`]

pub mod error;
pub mod exit;
pub mod git;
pub mod result;
pub mod settings;
pub mod target;

pub use error::{GitError, SettingsError, TargetError};
pub use exit::ExitStatus;
pub use git::{GitBackend, GitCli};
pub use result::{FailureCause, FormattingResult};
pub use settings::{DaemonSettings, Settings};
pub use target::{BlobAndFile, IndexBlob, StagingArea, StreamTarget, Target, WorkingFile};
