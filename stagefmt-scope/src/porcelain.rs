//! Parsers for the NUL-delimited output of `git status --porcelain=v2 -z`
//! and `git ls-tree -r -z`.

use std::path::PathBuf;

use crate::error::ScopeError;

/// One changed path from the status listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitChange {
    /// Relative to the repository root.
    pub path: PathBuf,
    /// Index mode (`mI`).
    pub mode: String,
    /// Index blob hash (`hI`).
    pub hash: String,
    pub staged: char,
    pub unstaged: char,
}

impl GitChange {
    /// Added, copied, modified or renamed in the index.
    pub fn is_staged_content(&self) -> bool {
        matches!(self.staged, 'A' | 'C' | 'M' | 'R')
    }

    /// Working tree matches the index for this path.
    pub fn is_clean_in_worktree(&self) -> bool {
        self.unstaged == '.'
    }
}

/// One blob from a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub kind: String,
    pub hash: String,
    pub path: PathBuf,
}

/// Parse ordinary (`1`) and rename/copy (`2`) status records.
///
/// A rename record is followed by a separate entry holding the original
/// path; that entry is consumed and never reported. Unmerged (`u`),
/// untracked (`?`), ignored (`!`) and header (`#`) entries are skipped.
pub fn parse_status(raw: &[u8]) -> Result<Vec<GitChange>, ScopeError> {
    let text = String::from_utf8_lossy(raw);
    let mut entries = text.split('\0').filter(|entry| !entry.is_empty());
    let mut changes = Vec::new();

    while let Some(entry) = entries.next() {
        match entry.as_bytes()[0] {
            b'1' => changes.push(parse_record(entry, 9)?),
            b'2' => {
                changes.push(parse_record(entry, 10)?);
                // Original path of the rename/copy.
                entries.next();
            }
            b'u' | b'?' | b'!' | b'#' => {}
            _ => {
                return Err(ScopeError::MalformedStatus {
                    entry: entry.to_string(),
                })
            }
        }
    }
    Ok(changes)
}

/// `<kind> XY sub mH mI mW hH hI [Xscore] path`; `fields` counts the path.
fn parse_record(entry: &str, fields: usize) -> Result<GitChange, ScopeError> {
    let malformed = || ScopeError::MalformedStatus {
        entry: entry.to_string(),
    };
    let parts: Vec<&str> = entry.splitn(fields, ' ').collect();
    if parts.len() != fields {
        return Err(malformed());
    }
    let mut xy = parts[1].chars();
    let (Some(staged), Some(unstaged), None) = (xy.next(), xy.next(), xy.next()) else {
        return Err(malformed());
    };
    Ok(GitChange {
        path: PathBuf::from(parts[fields - 1]),
        mode: parts[4].to_string(),
        hash: parts[7].to_string(),
        staged,
        unstaged,
    })
}

/// Parse `<mode> SP <type> SP <hash> TAB <path>` entries.
pub fn parse_tree(raw: &[u8]) -> Result<Vec<TreeEntry>, ScopeError> {
    let text = String::from_utf8_lossy(raw);
    text.split('\0')
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let malformed = || ScopeError::MalformedTree {
                entry: entry.to_string(),
            };
            let (meta, path) = entry.split_once('\t').ok_or_else(malformed)?;
            let mut meta = meta.split(' ');
            match (meta.next(), meta.next(), meta.next(), meta.next()) {
                (Some(mode), Some(kind), Some(hash), None) => Ok(TreeEntry {
                    mode: mode.to_string(),
                    kind: kind.to_string(),
                    hash: hash.to_string(),
                    path: PathBuf::from(path),
                }),
                _ => Err(malformed()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_A: &str = "1111111111111111111111111111111111111111";
    const HASH_B: &str = "2222222222222222222222222222222222222222";

    #[test]
    fn parses_ordinary_and_rename_records() {
        let raw = format!(
            "# branch.oid abc\0\
             1 M. N... 100644 100644 100644 {HASH_A} {HASH_B} src/A.kt\0\
             2 R. N... 100644 100644 100644 {HASH_A} {HASH_B} R100 src/New Name.kt\0src/Old.kt\0\
             1 MM N... 100644 100644 100644 {HASH_A} {HASH_B} src/B.kt\0\
             ? untracked.kt\0"
        );

        let changes = parse_status(raw.as_bytes()).unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].path, PathBuf::from("src/A.kt"));
        assert_eq!(changes[0].hash, HASH_B);
        assert_eq!(changes[0].mode, "100644");
        assert!(changes[0].is_clean_in_worktree());
        assert_eq!(changes[1].path, PathBuf::from("src/New Name.kt"));
        assert_eq!(changes[1].staged, 'R');
        assert!(!changes[2].is_clean_in_worktree());
    }

    #[test]
    fn unmerged_entries_are_skipped() {
        let raw = format!(
            "u UU N... 100644 100644 100644 100644 {HASH_A} {HASH_A} {HASH_B} C.kt\0"
        );
        assert!(parse_status(raw.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn truncated_record_is_malformed() {
        let err = parse_status(b"1 M. N... 100644\0").unwrap_err();
        assert!(matches!(err, ScopeError::MalformedStatus { .. }), "got: {err}");
    }

    #[test]
    fn staged_codes_select_formattable_changes() {
        let change = |staged| GitChange {
            path: PathBuf::from("a.kt"),
            mode: "100644".into(),
            hash: HASH_A.into(),
            staged,
            unstaged: '.',
        };
        for code in ['A', 'C', 'M', 'R'] {
            assert!(change(code).is_staged_content(), "{code}");
        }
        for code in ['.', 'D', 'T', 'U'] {
            assert!(!change(code).is_staged_content(), "{code}");
        }
    }

    #[test]
    fn parses_tree_listing() {
        let raw = format!(
            "100644 blob {HASH_A}\tsrc/A.kt\0160000 commit {HASH_B}\tvendor/lib\0"
        );
        let entries = parse_tree(raw.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, "blob");
        assert_eq!(entries[0].path, PathBuf::from("src/A.kt"));
        assert_eq!(entries[1].kind, "commit");
    }

    #[test]
    fn tree_entry_without_tab_is_malformed() {
        let err = parse_tree(b"100644 blob abc src/A.kt\0").unwrap_err();
        assert!(matches!(err, ScopeError::MalformedTree { .. }), "got: {err}");
    }
}
