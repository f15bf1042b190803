//! Scope resolution for every mode.
//!
//! Version-control state comes from an in-memory backend; the last section
//! drives a real repository and returns early when `git` is unavailable.

use assert_fs::prelude::*;
use rstest::rstest;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use stagefmt_core::{GitBackend, GitCli, GitError, Settings, Target};
use stagefmt_scope::ScopeResolver;

const H1: &str = "1111111111111111111111111111111111111111";
const H2: &str = "2222222222222222222222222222222222222222";

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeGit {
    root: PathBuf,
    status: String,
    trees: HashMap<String, String>,
    blobs: HashMap<String, String>,
    index_updates: Mutex<Vec<PathBuf>>,
}

impl GitBackend for FakeGit {
    fn show_toplevel(&self, _cwd: &Path) -> Result<PathBuf, GitError> {
        Ok(self.root.clone())
    }

    fn status(&self, _root: &Path) -> Result<Vec<u8>, GitError> {
        Ok(self.status.clone().into_bytes())
    }

    fn list_tree(&self, _root: &Path, commit: &str) -> Result<Vec<u8>, GitError> {
        self.trees
            .get(commit)
            .map(|tree| tree.clone().into_bytes())
            .ok_or_else(|| GitError::Failed {
                args: format!("ls-tree -r -z {commit}"),
                status: "exit status: 128".into(),
                stderr: "fatal: Not a valid object name".into(),
            })
    }

    fn read_blob(&self, _root: &Path, hash: &str) -> Result<Vec<u8>, GitError> {
        Ok(self.blobs.get(hash).cloned().unwrap_or_default().into_bytes())
    }

    fn write_blob(&self, _root: &Path, _content: &[u8]) -> Result<String, GitError> {
        Ok(H2.to_string())
    }

    fn update_index(&self, _root: &Path, _mode: &str, _hash: &str, path: &Path) -> Result<(), GitError> {
        self.index_updates.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

fn record(xy: &str, path: &str) -> String {
    format!("1 {xy} N... 100644 100644 100644 {H1} {H1} {path}\0")
}

fn rename(xy: &str, new: &str, old: &str) -> String {
    format!("2 {xy} N... 100644 100644 100644 {H1} {H1} R100 {new}\0{old}\0")
}

fn resolver(git: FakeGit, cwd: &Path) -> ScopeResolver {
    ScopeResolver::new(Arc::new(git), Settings::default(), cwd)
}

fn names(targets: &[Target]) -> Vec<String> {
    targets.iter().map(Target::name).collect()
}

// ---------------------------------------------------------------------------
// 1. Working directory
// ---------------------------------------------------------------------------

fn gradle_tree() -> assert_fs::TempDir {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    tmp.child("app/build.gradle.kts").touch().expect("touch");
    tmp.child("app/src/Main.kt").write_str("fun main()=Unit").expect("write");
    tmp.child("app/src/notes.txt").touch().expect("touch");
    tmp.child("app/build/generated/Gen.kt").touch().expect("touch");
    // No descriptor next to this one: not build output.
    tmp.child("lib/build/Kept.kt").touch().expect("touch");
    tmp
}

#[test]
fn working_dir_collects_sources_and_skips_build_output() {
    let tmp = gradle_tree();
    let scope = resolver(FakeGit::default(), tmp.path()).working_dir(&[PathBuf::from(".")], false);

    assert!(!scope.dry_run);
    assert_eq!(names(&scope.targets), vec!["app/src/Main.kt", "lib/build/Kept.kt"]);
    assert!(scope.targets.iter().all(|t| matches!(t, Target::WorkingFile(_))));
}

#[rstest]
#[case::build_dir_itself("app/build")]
#[case::inside_build_dir("app/build/generated")]
#[case::file_inside_build_dir("app/build/generated/Gen.kt")]
fn working_dir_skips_arguments_inside_build_output(#[case] arg: &str) {
    let tmp = gradle_tree();
    let scope = resolver(FakeGit::default(), tmp.path()).working_dir(&[PathBuf::from(arg)], true);
    assert!(scope.is_empty(), "got {:?}", names(&scope.targets));
}

#[test]
fn working_dir_drops_missing_and_duplicate_arguments() {
    let tmp = gradle_tree();
    let scope = resolver(FakeGit::default(), tmp.path()).working_dir(
        &[
            PathBuf::from("does/not/exist.kt"),
            PathBuf::from("app/src/Main.kt"),
            PathBuf::from("app/src"),
        ],
        false,
    );
    assert_eq!(names(&scope.targets), vec!["app/src/Main.kt"]);
}

#[test]
fn working_dir_ignores_non_source_file_argument() {
    let tmp = gradle_tree();
    let scope = resolver(FakeGit::default(), tmp.path())
        .working_dir(&[PathBuf::from("app/src/notes.txt")], false);
    assert!(scope.is_empty());
}

// ---------------------------------------------------------------------------
// 2. Pre-commit
// ---------------------------------------------------------------------------

#[test]
fn pre_commit_builds_pair_or_blob_by_unstaged_code() {
    let repo = assert_fs::TempDir::new().expect("tempdir");
    let git = FakeGit {
        root: repo.path().to_path_buf(),
        status: [
            record("M.", "src/Clean.kt"),
            record("MM", "src/Dirty.kt"),
            record("A.", "src/Added.kt"),
            record(".M", "src/Unstaged.kt"),
            record("D.", "src/Deleted.kt"),
            record("M.", "README.md"),
        ]
        .concat(),
        ..FakeGit::default()
    };

    let scope = resolver(git, repo.path()).pre_commit(&[], false).expect("scope");
    let mut kinds: Vec<(String, &str)> = scope
        .targets
        .iter()
        .map(|t| {
            let kind = match t {
                Target::BlobAndFile(_) => "pair",
                Target::IndexBlob(_) => "blob",
                _ => "other",
            };
            (t.name(), kind)
        })
        .collect();
    kinds.sort();

    assert_eq!(
        kinds,
        vec![
            ("src/Added.kt".to_string(), "pair"),
            ("src/Clean.kt".to_string(), "pair"),
            ("src/Dirty.kt".to_string(), "blob"),
        ]
    );
}

#[test]
fn pre_commit_rename_yields_one_target_at_new_path() {
    let repo = assert_fs::TempDir::new().expect("tempdir");
    let git = FakeGit {
        root: repo.path().to_path_buf(),
        status: rename("R.", "src/New.kt", "src/Old.kt"),
        ..FakeGit::default()
    };

    let scope = resolver(git, repo.path()).pre_commit(&[], false).expect("scope");
    assert_eq!(names(&scope.targets), vec!["src/New.kt"]);
}

#[test]
fn pre_commit_applies_path_filters_from_subdirectory() {
    let repo = assert_fs::TempDir::new().expect("tempdir");
    repo.child("app/src").create_dir_all().expect("mkdir");
    repo.child("lib").create_dir_all().expect("mkdir");
    let root = repo.path().canonicalize().expect("canon");
    let git = FakeGit {
        root: root.clone(),
        status: [record("M.", "app/src/A.kt"), record("M.", "lib/B.kt")].concat(),
        ..FakeGit::default()
    };

    let scope = resolver(git, &root.join("app"))
        .pre_commit(&[PathBuf::from("src")], false)
        .expect("scope");
    assert_eq!(names(&scope.targets), vec!["app/src/A.kt"]);
}

#[test]
fn pre_commit_blob_write_never_touches_working_file() {
    let repo = assert_fs::TempDir::new().expect("tempdir");
    repo.child("Dirty.kt").write_str("working copy").expect("write");
    let git = Arc::new(FakeGit {
        root: repo.path().to_path_buf(),
        status: record("MM", "Dirty.kt"),
        ..FakeGit::default()
    });

    let scope = ScopeResolver::new(git.clone(), Settings::default(), repo.path())
        .pre_commit(&[], false)
        .expect("scope");
    scope.targets[0].write("staged = 1").expect("write");

    repo.child("Dirty.kt").assert("working copy");
    assert_eq!(*git.index_updates.lock().unwrap(), vec![PathBuf::from("Dirty.kt")]);
}

// ---------------------------------------------------------------------------
// 3. Pre-push
// ---------------------------------------------------------------------------

#[test]
fn pre_push_lists_blobs_of_commit_and_forces_dry_run() {
    let repo = assert_fs::TempDir::new().expect("tempdir");
    let mut trees = HashMap::new();
    trees.insert(
        "HEAD".to_string(),
        format!(
            "100644 blob {H1}\tsrc/A.kt\0100644 blob {H2}\tdocs/readme.md\0160000 commit {H2}\tvendor/sub.kt\0"
        ),
    );
    let mut blobs = HashMap::new();
    blobs.insert(H1.to_string(), "val a=1".to_string());
    let git = FakeGit {
        root: repo.path().to_path_buf(),
        trees,
        blobs,
        ..FakeGit::default()
    };

    let scope = resolver(git, repo.path()).pre_push(&[], "HEAD").expect("scope");
    assert!(scope.dry_run);
    assert_eq!(names(&scope.targets), vec!["src/A.kt"]);
    assert!(matches!(scope.targets[0], Target::IndexBlob(_)));
    assert_eq!(scope.targets[0].read().expect("read"), "val a=1");
}

#[test]
fn pre_push_unknown_commit_is_git_error() {
    let repo = assert_fs::TempDir::new().expect("tempdir");
    let git = FakeGit {
        root: repo.path().to_path_buf(),
        ..FakeGit::default()
    };
    let err = resolver(git, repo.path()).pre_push(&[], "nope").unwrap_err();
    assert!(err.to_string().contains("ls-tree"), "got: {err}");
}

// ---------------------------------------------------------------------------
// 4. Stream
// ---------------------------------------------------------------------------

#[test]
fn stream_scope_has_single_stdin_target() {
    let scope = resolver(FakeGit::default(), Path::new("/")).stream(
        std::io::Cursor::new(b"x=1".to_vec()),
        |_: &str| Ok(()),
        true,
    );
    assert_eq!(names(&scope.targets), vec!["<stdin>"]);
    assert_eq!(scope.targets[0].read().expect("read"), "x=1");
}

// ---------------------------------------------------------------------------
// 5. Real repository
// ---------------------------------------------------------------------------

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .current_dir(dir)
        .args(args)
        .status()
        .expect("spawn git");
    assert!(status.success(), "git {args:?} failed");
}

#[test]
fn real_repository_rename_and_unstaged_change() {
    if Command::new("git").arg("--version").output().is_err() {
        return;
    }
    let repo = assert_fs::TempDir::new().expect("tempdir");
    git(repo.path(), &["init", "-q"]);
    git(repo.path(), &["config", "user.email", "dev@example.com"]);
    git(repo.path(), &["config", "user.name", "Dev"]);
    repo.child("Old.kt").write_str("val a = 1\nval b = 2\nval c = 3\n").expect("write");
    repo.child("Edited.kt").write_str("val x = 1\n").expect("write");
    git(repo.path(), &["add", "."]);
    git(repo.path(), &["commit", "-q", "-m", "init"]);

    git(repo.path(), &["mv", "Old.kt", "New.kt"]);
    repo.child("Edited.kt").write_str("val x=2\n").expect("write");
    git(repo.path(), &["add", "Edited.kt"]);
    repo.child("Edited.kt").write_str("val x=3\n").expect("write");

    let scope = ScopeResolver::new(Arc::new(GitCli::new()), Settings::default(), repo.path())
        .pre_commit(&[], false)
        .expect("scope");

    let mut found: Vec<(String, bool)> = scope
        .targets
        .iter()
        .map(|t| (t.name(), matches!(t, Target::BlobAndFile(_))))
        .collect();
    found.sort();
    assert_eq!(
        found,
        vec![("Edited.kt".to_string(), false), ("New.kt".to_string(), true)]
    );
}
