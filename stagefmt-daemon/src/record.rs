//! The lock file record: `"<protocolVersion> <port>"`.

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

use crate::error::{io_err, DaemonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonRecord {
    pub version: u32,
    pub port: u16,
}

impl fmt::Display for DaemonRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.version, self.port)
    }
}

impl FromStr for DaemonRecord {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(version), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("expected \"<version> <port>\", got {s:?}"));
        };
        Ok(Self {
            version: version
                .parse()
                .map_err(|e| format!("bad version {version:?}: {e}"))?,
            port: port.parse().map_err(|e| format!("bad port {port:?}: {e}"))?,
        })
    }
}

/// Read the record at `path`.
///
/// A missing file, or one that does not hold a complete record (for example
/// while a starting daemon has not written it yet), yields `None`.
pub fn read_record(path: &Path) -> Result<Option<DaemonRecord>, DaemonError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    match contents.parse() {
        Ok(record) => Ok(Some(record)),
        Err(reason) => {
            tracing::debug!(path = %path.display(), %reason, "ignoring unreadable lock file");
            Ok(None)
        }
    }
}
