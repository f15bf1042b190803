use thiserror::Error;

use stagefmt_core::GitError;

/// Errors raised while building a target set.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// Resolving the repository, its status or a commit tree failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// An entry of `git status --porcelain=v2 -z` could not be parsed.
    #[error("malformed status entry: {entry:?}")]
    MalformedStatus { entry: String },

    /// An entry of `git ls-tree -r -z` could not be parsed.
    #[error("malformed tree entry: {entry:?}")]
    MalformedTree { entry: String },
}
