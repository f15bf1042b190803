//! Targets: one unit of content that can be read, formatted and written back.
//!
//! ## Variants
//!
//! | variant | reads from | writes to |
//! |---------|-----------|-----------|
//! | [`WorkingFile`] | working-tree file | working-tree file |
//! | [`IndexBlob`] | object store (by hash) | new object + index entry |
//! | [`BlobAndFile`] | working-tree file | working-tree file, then index entry |
//! | [`StreamTarget`] | input stream (once) | output callback |
//!
//! Index updates are single-writer: every [`IndexBlob`] produced for one
//! command shares a [`StagingArea`], whose mutex serializes the
//! `update-index` step across concurrently formatted targets.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{io_err, TargetError};
use crate::git::GitBackend;

/// Display name of the standard-input target.
pub const STDIN_NAME: &str = "<stdin>";

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// A formattable unit of content.
#[derive(Debug)]
pub enum Target {
    WorkingFile(WorkingFile),
    IndexBlob(IndexBlob),
    BlobAndFile(BlobAndFile),
    Stream(StreamTarget),
}

impl Target {
    /// Identity used for reporting and result ordering.
    pub fn name(&self) -> String {
        match self {
            Target::WorkingFile(file) => file.name(),
            Target::IndexBlob(blob) => blob.name(),
            Target::BlobAndFile(pair) => pair.name(),
            Target::Stream(stream) => stream.name(),
        }
    }

    pub fn read(&self) -> Result<String, TargetError> {
        match self {
            Target::WorkingFile(file) => file.read(),
            Target::IndexBlob(blob) => blob.read(),
            Target::BlobAndFile(pair) => pair.read(),
            Target::Stream(stream) => stream.read(),
        }
    }

    pub fn write(&self, content: &str) -> Result<(), TargetError> {
        match self {
            Target::WorkingFile(file) => file.write(content),
            Target::IndexBlob(blob) => blob.write(content),
            Target::BlobAndFile(pair) => pair.write(content),
            Target::Stream(stream) => stream.write(content),
        }
    }

    /// Whether writing this target updates the version-control index.
    pub fn touches_index(&self) -> bool {
        matches!(self, Target::IndexBlob(_) | Target::BlobAndFile(_))
    }

    /// Whether writing this target updates a working-tree file.
    pub fn touches_working_tree(&self) -> bool {
        matches!(self, Target::WorkingFile(_) | Target::BlobAndFile(_))
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Target::WorkingFile(a), Target::WorkingFile(b)) => a == b,
            (Target::IndexBlob(a), Target::IndexBlob(b)) => a == b,
            (Target::BlobAndFile(a), Target::BlobAndFile(b)) => a == b,
            _ => false,
        }
    }
}

impl From<WorkingFile> for Target {
    fn from(file: WorkingFile) -> Self {
        Target::WorkingFile(file)
    }
}

impl From<IndexBlob> for Target {
    fn from(blob: IndexBlob) -> Self {
        Target::IndexBlob(blob)
    }
}

impl From<BlobAndFile> for Target {
    fn from(pair: BlobAndFile) -> Self {
        Target::BlobAndFile(pair)
    }
}

impl From<StreamTarget> for Target {
    fn from(stream: StreamTarget) -> Self {
        Target::Stream(stream)
    }
}

// ---------------------------------------------------------------------------
// WorkingFile
// ---------------------------------------------------------------------------

/// A file in the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingFile {
    path: PathBuf,
    root: Option<PathBuf>,
}

impl WorkingFile {
    /// A file reported under its full path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: None,
        }
    }

    /// A file reported relative to `root`.
    pub fn with_root(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: Some(root.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        let shown = self
            .root
            .as_deref()
            .and_then(|root| self.path.strip_prefix(root).ok())
            .unwrap_or(&self.path);
        shown.display().to_string()
    }

    pub fn read(&self) -> Result<String, TargetError> {
        fs::read_to_string(&self.path).map_err(|e| io_err(&self.path, e))
    }

    /// Replace the file through `<path>.stagefmt.tmp` + rename, keeping the
    /// original permissions. Symlinks are written through, not replaced.
    pub fn write(&self, content: &str) -> Result<(), TargetError> {
        let dest = fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        let tmp = PathBuf::from(format!("{}.stagefmt.tmp", dest.display()));
        let permissions = fs::metadata(&dest).map(|meta| meta.permissions()).ok();

        fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
        if let Some(permissions) = permissions {
            if let Err(e) = fs::set_permissions(&tmp, permissions) {
                let _ = fs::remove_file(&tmp);
                return Err(io_err(&tmp, e));
            }
        }
        if let Err(e) = fs::rename(&tmp, &dest) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&dest, e));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StagingArea
// ---------------------------------------------------------------------------

/// Shared access to one repository's object store and index.
pub struct StagingArea {
    git: Arc<dyn GitBackend>,
    root: PathBuf,
    index_lock: Mutex<()>,
}

impl StagingArea {
    pub fn new(git: Arc<dyn GitBackend>, root: impl Into<PathBuf>) -> Self {
        Self {
            git,
            root: root.into(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read_blob(&self, hash: &str) -> Result<Vec<u8>, TargetError> {
        Ok(self.git.read_blob(&self.root, hash)?)
    }

    /// Write `content` as a new object and point the index entry at `path`
    /// to it. Returns the new object hash.
    pub fn stage(&self, path: &Path, mode: &str, content: &str) -> Result<String, TargetError> {
        let hash = self.git.write_blob(&self.root, content.as_bytes())?;
        let _guard = self
            .index_lock
            .lock()
            .map_err(|_| TargetError::IndexLockPoisoned)?;
        self.git.update_index(&self.root, mode, &hash, path)?;
        tracing::debug!(path = %path.display(), hash = %hash, "index entry updated");
        Ok(hash)
    }
}

impl fmt::Debug for StagingArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingArea")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// IndexBlob
// ---------------------------------------------------------------------------

/// A blob referenced by the index (or by a commit tree).
///
/// Equality is by path only.
#[derive(Clone)]
pub struct IndexBlob {
    path: PathBuf,
    mode: String,
    hash: String,
    staging: Arc<StagingArea>,
}

impl IndexBlob {
    /// `path` is relative to the repository root.
    pub fn new(
        path: impl Into<PathBuf>,
        mode: impl Into<String>,
        hash: impl Into<String>,
        staging: Arc<StagingArea>,
    ) -> Self {
        Self {
            path: path.into(),
            mode: mode.into(),
            hash: hash.into(),
            staging,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn name(&self) -> String {
        self.path.display().to_string()
    }

    pub fn read(&self) -> Result<String, TargetError> {
        let bytes = self.staging.read_blob(&self.hash)?;
        String::from_utf8(bytes).map_err(|_| TargetError::InvalidUtf8 { name: self.name() })
    }

    pub fn write(&self, content: &str) -> Result<(), TargetError> {
        self.staging.stage(&self.path, &self.mode, content).map(|_| ())
    }
}

impl PartialEq for IndexBlob {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for IndexBlob {}

impl fmt::Debug for IndexBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob at {} ({} {})", self.path.display(), self.mode, self.hash)
    }
}

// ---------------------------------------------------------------------------
// BlobAndFile
// ---------------------------------------------------------------------------

/// A staged blob whose working-tree file holds identical content.
///
/// Reads come from the file; writes go to the file first and then to the
/// index. A failed file write is returned without touching the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobAndFile {
    blob: IndexBlob,
    file: WorkingFile,
}

impl BlobAndFile {
    pub fn new(blob: IndexBlob, file: WorkingFile) -> Self {
        Self { blob, file }
    }

    pub fn blob(&self) -> &IndexBlob {
        &self.blob
    }

    pub fn file(&self) -> &WorkingFile {
        &self.file
    }

    pub fn name(&self) -> String {
        self.file.name()
    }

    pub fn read(&self) -> Result<String, TargetError> {
        self.file.read()
    }

    pub fn write(&self, content: &str) -> Result<(), TargetError> {
        self.file.write(content)?;
        self.blob.write(content)
    }
}

// ---------------------------------------------------------------------------
// StreamTarget
// ---------------------------------------------------------------------------

type OutputFn = Box<dyn FnMut(&str) -> io::Result<()> + Send>;

/// Standard input / standard output piping.
///
/// The input stream is consumed by the first `read`; the content is retained
/// so it can be replayed when no formatted output was written.
pub struct StreamTarget {
    input: Mutex<Option<Box<dyn Read + Send>>>,
    output: Mutex<OutputFn>,
    consumed: Mutex<Option<String>>,
    written: Mutex<bool>,
}

impl StreamTarget {
    pub fn new<R, W>(input: R, output: W) -> Self
    where
        R: Read + Send + 'static,
        W: FnMut(&str) -> io::Result<()> + Send + 'static,
    {
        Self {
            input: Mutex::new(Some(Box::new(input))),
            output: Mutex::new(Box::new(output)),
            consumed: Mutex::new(None),
            written: Mutex::new(false),
        }
    }

    pub fn name(&self) -> String {
        STDIN_NAME.to_string()
    }

    pub fn read(&self) -> Result<String, TargetError> {
        let mut consumed = self.consumed.lock().map_err(|_| poisoned())?;
        if let Some(content) = consumed.as_ref() {
            return Ok(content.clone());
        }

        let mut input = self.input.lock().map_err(|_| poisoned())?;
        let mut bytes = Vec::new();
        if let Some(mut reader) = input.take() {
            reader
                .read_to_end(&mut bytes)
                .map_err(|e| io_err(STDIN_NAME, e))?;
        }
        let content = String::from_utf8(bytes).map_err(|_| TargetError::InvalidUtf8 {
            name: self.name(),
        })?;
        *consumed = Some(content.clone());
        Ok(content)
    }

    pub fn write(&self, content: &str) -> Result<(), TargetError> {
        let mut output = self.output.lock().map_err(|_| poisoned())?;
        (output)(content).map_err(|source| TargetError::Stream {
            name: self.name(),
            source,
        })?;
        *self.written.lock().map_err(|_| poisoned())? = true;
        Ok(())
    }

    /// Send the consumed input to the output unchanged if nothing was
    /// written, so piping already-formatted content is lossless.
    pub fn replay_if_unwritten(&self) -> Result<(), TargetError> {
        if *self.written.lock().map_err(|_| poisoned())? {
            return Ok(());
        }
        let content = self.consumed.lock().map_err(|_| poisoned())?.clone();
        match content {
            Some(content) => self.write(&content),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamTarget(<stdin>)")
    }
}

fn poisoned() -> TargetError {
    io_err(
        STDIN_NAME,
        io::Error::new(io::ErrorKind::Other, "stream state lock poisoned"),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GitError;
    use std::collections::HashMap;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// In-memory object store + index.
    #[derive(Default)]
    struct MemoryGit {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        index: Mutex<Vec<(String, String, PathBuf)>>,
        fail_update: bool,
    }

    impl GitBackend for MemoryGit {
        fn show_toplevel(&self, cwd: &Path) -> Result<PathBuf, GitError> {
            Ok(cwd.to_path_buf())
        }

        fn status(&self, _root: &Path) -> Result<Vec<u8>, GitError> {
            Ok(Vec::new())
        }

        fn list_tree(&self, _root: &Path, _commit: &str) -> Result<Vec<u8>, GitError> {
            Ok(Vec::new())
        }

        fn read_blob(&self, _root: &Path, hash: &str) -> Result<Vec<u8>, GitError> {
            self.objects
                .lock()
                .unwrap()
                .get(hash)
                .cloned()
                .ok_or_else(|| GitError::Failed {
                    args: format!("cat-file blob {hash}"),
                    status: "exit status: 128".to_string(),
                    stderr: "fatal: Not a valid object name".to_string(),
                })
        }

        fn write_blob(&self, _root: &Path, content: &[u8]) -> Result<String, GitError> {
            let mut objects = self.objects.lock().unwrap();
            let hash = format!("obj{}", objects.len());
            objects.insert(hash.clone(), content.to_vec());
            Ok(hash)
        }

        fn update_index(
            &self,
            _root: &Path,
            mode: &str,
            hash: &str,
            path: &Path,
        ) -> Result<(), GitError> {
            if self.fail_update {
                return Err(GitError::Failed {
                    args: "update-index".to_string(),
                    status: "exit status: 128".to_string(),
                    stderr: "fatal: Unable to create index.lock".to_string(),
                });
            }
            self.index
                .lock()
                .unwrap()
                .push((mode.to_string(), hash.to_string(), path.to_path_buf()));
            Ok(())
        }
    }

    fn staging(git: Arc<MemoryGit>) -> Arc<StagingArea> {
        Arc::new(StagingArea::new(git, "/repo"))
    }

    #[test]
    fn working_file_name_is_relative_to_root() {
        let file = WorkingFile::with_root("/repo/src/Main.kt", "/repo");
        assert_eq!(file.name(), "src/Main.kt");
        let bare = WorkingFile::new("/repo/src/Main.kt");
        assert_eq!(bare.name(), "/repo/src/Main.kt");
    }

    #[test]
    fn working_file_write_follows_symlinks() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("Real.kt");
        let link = tmp.path().join("Link.kt");
        fs::write(&real, "a=1").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        WorkingFile::new(&link).write("a = 1").unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "a = 1");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[test]
    fn working_file_write_replaces_content_and_cleans_tmp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Main.kt");
        fs::write(&path, "fun main()=Unit").unwrap();

        let file = WorkingFile::new(&path);
        file.write("fun main() = Unit").unwrap();

        assert_eq!(file.read().unwrap(), "fun main() = Unit");
        assert!(!tmp.path().join("Main.kt.stagefmt.tmp").exists());
    }

    #[test]
    #[cfg(unix)]
    fn working_file_write_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("script.kt");
        fs::write(&path, "a=1").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        WorkingFile::new(&path).write("a = 1").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn missing_working_file_read_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = WorkingFile::new(tmp.path().join("gone.kt")).read().unwrap_err();
        assert!(matches!(err, TargetError::Io { .. }), "got: {err}");
    }

    #[test]
    fn index_blob_reads_by_hash_and_stages_new_object() {
        let git = Arc::new(MemoryGit::default());
        git.objects
            .lock()
            .unwrap()
            .insert("abc".to_string(), b"val x=1".to_vec());
        let blob = IndexBlob::new("src/X.kt", "100644", "abc", staging(git.clone()));

        assert_eq!(blob.read().unwrap(), "val x=1");
        blob.write("val x = 1").unwrap();

        let index = git.index.lock().unwrap();
        assert_eq!(index.len(), 1);
        let (mode, hash, path) = &index[0];
        assert_eq!(mode, "100644");
        assert_eq!(path, Path::new("src/X.kt"));
        assert_eq!(
            git.objects.lock().unwrap().get(hash).map(Vec::as_slice),
            Some(b"val x = 1".as_slice())
        );
    }

    #[test]
    fn index_blobs_are_equal_by_path_only() {
        let git = Arc::new(MemoryGit::default());
        let area = staging(git);
        let a = IndexBlob::new("a.kt", "100644", "h1", area.clone());
        let b = IndexBlob::new("a.kt", "100755", "h2", area.clone());
        let c = IndexBlob::new("c.kt", "100644", "h1", area);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn blob_and_file_writes_both_locations() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("A.kt");
        fs::write(&path, "a=1").unwrap();
        let git = Arc::new(MemoryGit::default());
        let pair = BlobAndFile::new(
            IndexBlob::new("A.kt", "100644", "h", staging(git.clone())),
            WorkingFile::with_root(&path, tmp.path()),
        );

        assert_eq!(pair.name(), "A.kt");
        assert_eq!(pair.read().unwrap(), "a=1");
        pair.write("a = 1").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a = 1");
        assert_eq!(git.index.lock().unwrap().len(), 1);
    }

    #[test]
    fn blob_and_file_skips_index_when_file_write_fails() {
        let tmp = TempDir::new().unwrap();
        let missing_dir = tmp.path().join("nope").join("A.kt");
        let git = Arc::new(MemoryGit::default());
        let pair = BlobAndFile::new(
            IndexBlob::new("nope/A.kt", "100644", "h", staging(git.clone())),
            WorkingFile::new(&missing_dir),
        );

        assert!(pair.write("a = 1").is_err());
        assert!(git.index.lock().unwrap().is_empty());
    }

    #[test]
    fn index_update_failure_surfaces_as_git_error() {
        let git = Arc::new(MemoryGit {
            fail_update: true,
            ..MemoryGit::default()
        });
        let blob = IndexBlob::new("a.kt", "100644", "h", staging(git));
        let err = blob.write("x").unwrap_err();
        assert!(matches!(err, TargetError::Git(_)), "got: {err}");
    }

    #[test]
    fn stream_target_reads_once_and_replays_when_unwritten() {
        let sink = Arc::new(Mutex::new(String::new()));
        let captured = sink.clone();
        let stream = StreamTarget::new(Cursor::new(b"a = 1".to_vec()), move |s: &str| {
            captured.lock().unwrap().push_str(s);
            Ok(())
        });

        assert_eq!(stream.read().unwrap(), "a = 1");
        assert_eq!(stream.read().unwrap(), "a = 1", "content is retained");
        stream.replay_if_unwritten().unwrap();
        assert_eq!(sink.lock().unwrap().as_str(), "a = 1");
    }

    #[test]
    fn stream_target_does_not_replay_after_write() {
        let sink = Arc::new(Mutex::new(String::new()));
        let captured = sink.clone();
        let stream = StreamTarget::new(Cursor::new(b"a=1".to_vec()), move |s: &str| {
            captured.lock().unwrap().push_str(s);
            Ok(())
        });

        stream.read().unwrap();
        stream.write("a = 1").unwrap();
        stream.replay_if_unwritten().unwrap();
        assert_eq!(sink.lock().unwrap().as_str(), "a = 1");
    }

    #[test]
    fn target_flags_describe_storage() {
        let git = Arc::new(MemoryGit::default());
        let blob = IndexBlob::new("a.kt", "100644", "h", staging(git));
        let file = WorkingFile::new("/repo/a.kt");
        let pair: Target = BlobAndFile::new(blob.clone(), file.clone()).into();
        let blob: Target = blob.into();
        let file: Target = file.into();

        assert!(blob.touches_index() && !blob.touches_working_tree());
        assert!(!file.touches_index() && file.touches_working_tree());
        assert!(pair.touches_index() && pair.touches_working_tree());
    }
}
