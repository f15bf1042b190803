pub mod daemon;
pub mod format;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use stagefmt_core::GitBackend;

/// Root of the repository containing `cwd`.
pub fn repo_root(git: &dyn GitBackend, cwd: &Path) -> Result<PathBuf> {
    git.show_toplevel(cwd)
        .with_context(|| format!("{} is not inside a git repository", cwd.display()))
}

pub fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("could not determine current directory")
}
