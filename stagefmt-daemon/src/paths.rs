use std::path::{Path, PathBuf};
use std::time::Duration;

use stagefmt_core::settings::STATE_DIR;

/// Wire/lock-file protocol version of this build. A daemon started with a
/// higher version displaces a running daemon with a lower one.
pub const DAEMON_VERSION: u32 = 1;

pub const LOCK_FILE: &str = "daemon.lock";

/// Pause after asking an older daemon to exit, before taking the lock.
pub const HANDOFF_WAIT: Duration = Duration::from_millis(100);

/// How long the daemon waits for a client's command line.
pub const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(10);

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a client waits for the daemon to finish a command.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(600);

/// `<root>/.stagefmt/daemon.lock`
pub fn lock_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(LOCK_FILE)
}
