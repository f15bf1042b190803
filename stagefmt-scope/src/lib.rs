//! Scope resolution: which targets one invocation formats.
//!
//! | mode | source of truth | targets |
//! |------|-----------------|---------|
//! | working directory | filesystem walk | [`WorkingFile`] |
//! | pre-commit | `git status` | [`BlobAndFile`] or [`IndexBlob`] |
//! | pre-push | `git ls-tree <commit>` | [`IndexBlob`] (always dry run) |
//! | stream | stdin | [`StreamTarget`] |

pub mod error;
pub mod paths;
pub mod porcelain;

pub use error::ScopeError;
pub use porcelain::GitChange;

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use stagefmt_core::{
    BlobAndFile, GitBackend, IndexBlob, Settings, StagingArea, StreamTarget, Target, WorkingFile,
};

/// Targets for one command plus whether results may be written back.
#[derive(Debug)]
pub struct Scope {
    pub targets: Vec<Target>,
    pub dry_run: bool,
}

impl Scope {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Builds a [`Scope`] for each operating mode.
///
/// Relative arguments are resolved against `cwd`.
#[derive(Clone)]
pub struct ScopeResolver {
    git: Arc<dyn GitBackend>,
    settings: Settings,
    cwd: PathBuf,
}

impl ScopeResolver {
    pub fn new(git: Arc<dyn GitBackend>, settings: Settings, cwd: impl Into<PathBuf>) -> Self {
        Self {
            git,
            settings,
            cwd: cwd.into(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    // ---- working directory ------------------------------------------------

    /// Every source file reachable from `args`, skipping build output.
    ///
    /// Arguments that do not exist are dropped without error.
    pub fn working_dir(&self, args: &[PathBuf], dry_run: bool) -> Scope {
        let mut files = Vec::new();
        for arg in args {
            let path = paths::normalize(&self.cwd.join(arg));
            if !path.exists() {
                tracing::debug!(path = %path.display(), "argument does not exist; skipping");
                continue;
            }
            if self.inside_build_output(&path) {
                tracing::debug!(path = %path.display(), "argument is inside build output; skipping");
                continue;
            }
            if path.is_file() {
                if self.settings.is_source_file(&path) {
                    files.push(path);
                }
                continue;
            }
            let walker = WalkDir::new(&path)
                .into_iter()
                .filter_entry(|entry| {
                    !(entry.file_type().is_dir() && self.settings.is_build_output_dir(entry.path()))
                });
            for entry in walker {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        if self.settings.is_source_file(entry.path()) {
                            files.push(entry.into_path());
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "skipping unreadable entry"),
                }
            }
        }
        files.sort();
        files.dedup();

        let targets = files
            .into_iter()
            .map(|path| WorkingFile::with_root(path, &self.cwd).into())
            .collect();
        Scope { targets, dry_run }
    }

    fn inside_build_output(&self, path: &Path) -> bool {
        path.ancestors()
            .any(|dir| self.settings.is_build_output_dir(dir))
    }

    // ---- pre-commit -------------------------------------------------------

    /// Staged source files matching `args` (all when `args` is empty or
    /// names the repository root).
    pub fn pre_commit(&self, args: &[PathBuf], dry_run: bool) -> Result<Scope, ScopeError> {
        let root = self.git.show_toplevel(&self.cwd)?;
        let filters = paths::path_filters(&root, &self.cwd, args);
        let changes = porcelain::parse_status(&self.git.status(&root)?)?;
        let staging = Arc::new(StagingArea::new(self.git.clone(), &root));

        let targets = changes
            .into_iter()
            .filter(|change| change.is_staged_content())
            .filter(|change| self.settings.is_source_file(&change.path))
            .filter(|change| paths::matches_filters(&change.path, &filters))
            .map(|change| {
                let file = root.join(&change.path);
                let clean = change.is_clean_in_worktree();
                let blob = IndexBlob::new(change.path, change.mode, change.hash, staging.clone());
                if clean {
                    BlobAndFile::new(blob, WorkingFile::with_root(file, &root)).into()
                } else {
                    blob.into()
                }
            })
            .collect::<Vec<Target>>();

        tracing::debug!(root = %root.display(), count = targets.len(), "pre-commit scope resolved");
        Ok(Scope { targets, dry_run })
    }

    // ---- pre-push ---------------------------------------------------------

    /// Source blobs in the tree of `commit` matching `args`.
    ///
    /// Always a dry run: committed history is never rewritten.
    pub fn pre_push(&self, args: &[PathBuf], commit: &str) -> Result<Scope, ScopeError> {
        let root = self.git.show_toplevel(&self.cwd)?;
        let filters = paths::path_filters(&root, &self.cwd, args);
        let entries = porcelain::parse_tree(&self.git.list_tree(&root, commit)?)?;
        let staging = Arc::new(StagingArea::new(self.git.clone(), &root));

        let targets = entries
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .filter(|entry| self.settings.is_source_file(&entry.path))
            .filter(|entry| paths::matches_filters(&entry.path, &filters))
            .map(|entry| IndexBlob::new(entry.path, entry.mode, entry.hash, staging.clone()).into())
            .collect::<Vec<Target>>();

        tracing::debug!(commit, count = targets.len(), "pre-push scope resolved");
        Ok(Scope {
            targets,
            dry_run: true,
        })
    }

    // ---- stream -----------------------------------------------------------

    /// A single stdin/stdout target; no version-control access.
    pub fn stream<R, W>(&self, input: R, output: W, dry_run: bool) -> Scope
    where
        R: Read + Send + 'static,
        W: FnMut(&str) -> io::Result<()> + Send + 'static,
    {
        Scope {
            targets: vec![StreamTarget::new(input, output).into()],
            dry_run,
        }
    }
}

impl std::fmt::Debug for ScopeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeResolver")
            .field("cwd", &self.cwd)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
