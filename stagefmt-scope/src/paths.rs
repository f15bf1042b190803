//! Path helpers shared by the resolver modes.

use std::path::{Component, Path, PathBuf};

/// Lexically resolve `.` and `..` components without touching the disk.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` made absolute against `cwd`, with symlinks resolved when it exists.
pub fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    let joined = cwd.join(path);
    joined.canonicalize().unwrap_or_else(|_| normalize(&joined))
}

/// Turn file arguments into root-relative prefixes.
///
/// An empty result means "every path". An argument naming the root itself
/// clears the list; an argument outside the root is kept absolute and
/// matches nothing.
pub fn path_filters(root: &Path, cwd: &Path, args: &[PathBuf]) -> Vec<PathBuf> {
    let root = absolutize(root, Path::new(""));
    let mut filters = Vec::with_capacity(args.len());
    for arg in args {
        let resolved = absolutize(cwd, arg);
        if resolved == root {
            return Vec::new();
        }
        match resolved.strip_prefix(&root) {
            Ok(relative) => filters.push(relative.to_path_buf()),
            Err(_) => filters.push(resolved),
        }
    }
    filters
}

/// Whether a root-relative `path` passes `filters`.
pub fn matches_filters(path: &Path, filters: &[PathBuf]) -> bool {
    filters.is_empty() || filters.iter().any(|filter| path.starts_with(filter))
}
