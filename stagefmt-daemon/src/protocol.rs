//! Line protocol between clients and the daemon.
//!
//! Request: one newline-terminated line, `<command> [args...]`.
//! Response: `"<exitCode>\n<body>"`, then the daemon closes the connection.
//! `exit` gets no response.

use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::Path;

use stagefmt_core::ExitStatus;

use crate::error::{io_err, DaemonError};
use crate::paths::{lock_path, CONNECT_TIMEOUT, RESPONSE_TIMEOUT};
use crate::record::read_record;

// ---------------------------------------------------------------------------
// Commands and replies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCommand {
    Exit,
    Status,
    PreCommit { files: Vec<String> },
    PrePush { commit: String, files: Vec<String> },
    /// A known command with unusable arguments.
    Invalid { command: String, reason: String },
    Unknown(String),
}

impl DaemonCommand {
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        let Some(command) = tokens.next() else {
            return DaemonCommand::Unknown(String::new());
        };
        match command {
            "exit" => DaemonCommand::Exit,
            "status" => DaemonCommand::Status,
            "pre-commit" => DaemonCommand::PreCommit {
                files: tokens.map(str::to_string).collect(),
            },
            "pre-push" => match tokens.next() {
                Some(commit) => DaemonCommand::PrePush {
                    commit: commit.to_string(),
                    files: tokens.map(str::to_string).collect(),
                },
                None => DaemonCommand::Invalid {
                    command: command.to_string(),
                    reason: "pre-push requires a commit reference".to_string(),
                },
            },
            other => DaemonCommand::Unknown(other.to_string()),
        }
    }

    /// Wire form, without the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            DaemonCommand::Exit => "exit".to_string(),
            DaemonCommand::Status => "status".to_string(),
            DaemonCommand::PreCommit { files } => join("pre-commit", files),
            DaemonCommand::PrePush { commit, files } => {
                join(&format!("pre-push {commit}"), files)
            }
            DaemonCommand::Invalid { command, .. } => command.clone(),
            DaemonCommand::Unknown(command) => command.clone(),
        }
    }
}

fn join(head: &str, files: &[String]) -> String {
    std::iter::once(head)
        .chain(files.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A decoded daemon response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonReply {
    pub code: i32,
    pub body: String,
}

impl DaemonReply {
    pub fn new(status: ExitStatus, body: impl Into<String>) -> Self {
        Self {
            code: status.code(),
            body: body.into(),
        }
    }

    pub fn status(&self) -> Option<ExitStatus> {
        ExitStatus::from_code(self.code)
    }

    pub fn to_wire(&self) -> String {
        format!("{}\n{}", self.code, self.body)
    }

    pub fn parse(raw: &str) -> Result<Self, DaemonError> {
        let (code, body) = raw.split_once('\n').unwrap_or((raw, ""));
        let code = code
            .trim()
            .parse()
            .map_err(|_| DaemonError::Protocol(format!("bad exit code in response: {code:?}")))?;
        Ok(Self {
            code,
            body: body.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Result of [`request_stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Stopped,
    /// Nothing answered on the recorded port; the lock file was deleted.
    StaleLockRemoved,
}

fn connect(root: &Path) -> Result<TcpStream, DaemonError> {
    let lock = lock_path(root);
    let record = read_record(&lock)?.ok_or_else(|| DaemonError::DaemonNotRunning {
        lock: lock.clone(),
    })?;
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, record.port));
    TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|err| {
        if matches!(
            err.kind(),
            ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::TimedOut
        ) {
            DaemonError::DaemonNotRunning { lock }
        } else {
            io_err(addr.to_string(), err)
        }
    })
}

fn write_line(stream: &mut TcpStream, command: &DaemonCommand) -> Result<(), DaemonError> {
    let line = format!("{}\n", command.to_line());
    stream
        .write_all(line.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(|e| io_err("daemon socket write", e))
}

/// Send one command to the daemon serving `root` and wait for its reply.
pub fn send_command(root: &Path, command: &DaemonCommand) -> Result<DaemonReply, DaemonError> {
    let mut stream = connect(root)?;
    write_line(&mut stream, command)?;
    stream
        .set_read_timeout(Some(RESPONSE_TIMEOUT))
        .map_err(|e| io_err("daemon socket", e))?;

    let mut raw = String::new();
    stream
        .read_to_string(&mut raw)
        .map_err(|e| io_err("daemon socket read", e))?;
    if raw.is_empty() {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }
    DaemonReply::parse(&raw)
}

/// Human-readable status text of the running daemon.
pub fn request_status(root: &Path) -> Result<String, DaemonError> {
    let reply = send_command(root, &DaemonCommand::Status)?;
    match reply.status() {
        Some(ExitStatus::Success) => Ok(reply.body),
        _ => Err(DaemonError::Protocol(reply.body)),
    }
}

/// Ask the daemon serving `root` to exit. A daemon that cannot be reached
/// is considered gone and its stale lock file is deleted.
pub fn request_stop(root: &Path) -> Result<StopOutcome, DaemonError> {
    let lock = lock_path(root);
    if read_record(&lock)?.is_none() {
        return Ok(StopOutcome::NotRunning);
    }

    let sent = connect(root).and_then(|mut stream| write_line(&mut stream, &DaemonCommand::Exit));
    match sent {
        Ok(()) => Ok(StopOutcome::Stopped),
        Err(err) => {
            tracing::warn!(error = %err, "daemon did not answer; removing stale lock file");
            match std::fs::remove_file(&lock) {
                Ok(()) => Ok(StopOutcome::StaleLockRemoved),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(StopOutcome::StaleLockRemoved),
                Err(e) => Err(io_err(&lock, e)),
            }
        }
    }
}
