//! The `git` collaborator.
//!
//! Only the handful of plumbing commands needed to resolve staged/committed
//! content and write it back are exposed. [`GitBackend`] is the seam used by
//! the scope resolver and by index-backed targets, so tests can substitute an
//! in-memory fake; [`GitCli`] is the real implementation and spawns one `git`
//! process per call.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::GitError;

/// Version-control operations required by stagefmt.
///
/// Every method runs against the repository whose working tree is `root`
/// (or, for [`GitBackend::show_toplevel`], the repository containing `cwd`).
/// A non-zero exit from the underlying tool is reported as [`GitError`].
pub trait GitBackend: Send + Sync {
    /// Absolute path of the working-tree root containing `cwd`.
    fn show_toplevel(&self, cwd: &Path) -> Result<PathBuf, GitError>;

    /// NUL-delimited porcelain v2 status of tracked paths.
    fn status(&self, root: &Path) -> Result<Vec<u8>, GitError>;

    /// NUL-delimited recursive tree listing of `commit`.
    fn list_tree(&self, root: &Path, commit: &str) -> Result<Vec<u8>, GitError>;

    /// Raw content of the blob `hash`.
    fn read_blob(&self, root: &Path, hash: &str) -> Result<Vec<u8>, GitError>;

    /// Store `content` as a new blob and return its hash.
    fn write_blob(&self, root: &Path, content: &[u8]) -> Result<String, GitError>;

    /// Point the index entry at `path` to `(mode, hash)`.
    ///
    /// Not safe to call concurrently against the same repository; callers
    /// serialize through [`crate::StagingArea`].
    fn update_index(&self, root: &Path, mode: &str, hash: &str, path: &Path)
        -> Result<(), GitError>;
}

/// [`GitBackend`] that shells out to the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Use the `git` found on `PATH`.
    pub fn new() -> Self {
        Self::with_program("git")
    }

    /// Use a specific `git` executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, dir: &Path, args: &[OsString], input: Option<&[u8]>) -> Result<Vec<u8>, GitError> {
        let rendered = render_args(args);
        tracing::debug!(dir = %dir.display(), args = %rendered, "running git");

        let mut child = Command::new(&self.program)
            .current_dir(dir)
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GitError::Spawn {
                args: rendered.clone(),
                source,
            })?;

        if let Some(bytes) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(bytes).map_err(|source| GitError::Spawn {
                    args: rendered.clone(),
                    source,
                })?;
            }
        }

        let output = child.wait_with_output().map_err(|source| GitError::Spawn {
            args: rendered.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(GitError::Failed {
                args: rendered,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn run_text(&self, dir: &Path, args: &[OsString], input: Option<&[u8]>) -> Result<String, GitError> {
        let bytes = self.run(dir, args, input)?;
        String::from_utf8(bytes).map_err(|_| GitError::NonUtf8Output {
            args: render_args(args),
        })
    }
}

impl GitBackend for GitCli {
    fn show_toplevel(&self, cwd: &Path) -> Result<PathBuf, GitError> {
        let out = self.run_text(cwd, &os_args(["rev-parse", "--show-toplevel"]), None)?;
        Ok(PathBuf::from(out.trim_end()))
    }

    fn status(&self, root: &Path) -> Result<Vec<u8>, GitError> {
        self.run(
            root,
            &os_args(["status", "--porcelain=v2", "-z", "--untracked-files=no"]),
            None,
        )
    }

    fn list_tree(&self, root: &Path, commit: &str) -> Result<Vec<u8>, GitError> {
        self.run(root, &os_args(["ls-tree", "-r", "-z", commit]), None)
    }

    fn read_blob(&self, root: &Path, hash: &str) -> Result<Vec<u8>, GitError> {
        self.run(root, &os_args(["cat-file", "blob", hash]), None)
    }

    fn write_blob(&self, root: &Path, content: &[u8]) -> Result<String, GitError> {
        let out = self.run_text(
            root,
            &os_args(["hash-object", "-w", "--stdin"]),
            Some(content),
        )?;
        Ok(out.trim().to_string())
    }

    fn update_index(
        &self,
        root: &Path,
        mode: &str,
        hash: &str,
        path: &Path,
    ) -> Result<(), GitError> {
        let mut cacheinfo = OsString::from(format!("{mode},{hash},"));
        cacheinfo.push(path.as_os_str());
        let mut args = os_args(["update-index", "--cacheinfo"]);
        args.push(cacheinfo);
        self.run(root, &args, None).map(|_| ())
    }
}

fn os_args<const N: usize>(args: [&str; N]) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}

fn render_args(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
