//! Long-lived per-repository daemon: lock file, TCP server, idle supervisor.

mod error;
pub mod lock;
pub mod paths;
pub mod protocol;
pub mod record;
mod runtime;

pub use error::DaemonError;
pub use lock::{DaemonLock, LockAttempt};
pub use paths::{lock_path, DAEMON_VERSION};
pub use protocol::{
    request_status, request_stop, send_command, DaemonCommand, DaemonReply, StopOutcome,
};
pub use record::{read_record, DaemonRecord};
pub use runtime::{
    init_tracing, Daemon, DaemonConfig, DaemonServices, ShutdownReason, StartOutcome,
};
