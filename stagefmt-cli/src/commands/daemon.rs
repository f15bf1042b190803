//! `stagefmt --daemon | --stop-daemon | --daemon-status`

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use stagefmt_core::{settings, ExitStatus, GitBackend, GitCli};
use stagefmt_daemon::{
    request_status, request_stop, Daemon, DaemonConfig, DaemonError, DaemonServices,
    ShutdownReason, StartOutcome, StopOutcome,
};
use stagefmt_format::SpacingFormatter;
use stagefmt_pipeline::Dispatcher;
use stagefmt_scope::ScopeResolver;

use super::{current_dir, repo_root};

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Run the formatting daemon for this repository in the foreground.
    #[arg(long = "daemon", conflicts_with_all = ["stop", "status"])]
    pub start: bool,

    /// Ask the repository's daemon to exit.
    #[arg(long = "stop-daemon", conflicts_with = "status")]
    pub stop: bool,

    /// Print the repository daemon's status.
    #[arg(long = "daemon-status")]
    pub status: bool,
}

impl DaemonArgs {
    pub fn requested(&self) -> bool {
        self.start || self.stop || self.status
    }

    pub fn run(self) -> Result<ExitStatus> {
        let cwd = current_dir()?;
        let git: Arc<dyn GitBackend> = Arc::new(GitCli::new());
        let root = repo_root(git.as_ref(), &cwd)?;

        if self.start {
            let settings = settings::load(Some(&root)).context("failed to load settings")?;
            let config = DaemonConfig::from_settings(&root, &settings);
            let dispatcher = Dispatcher::new(Arc::new(SpacingFormatter::new()), settings.jobs)
                .context("failed to start formatting workers")?;
            let services = DaemonServices {
                resolver: ScopeResolver::new(git, settings, &root),
                dispatcher,
            };

            match Daemon::new(config, services)
                .start_blocking()
                .context("daemon exited with error")?
            {
                StartOutcome::AlreadyRunning => println!("daemon is already running"),
                StartOutcome::Stopped(reason) => println!("daemon stopped: {}", describe(reason)),
            }
            return Ok(ExitStatus::Success);
        }

        crate::init_tracing();
        if self.stop {
            match request_stop(&root).context("failed to stop daemon")? {
                StopOutcome::NotRunning => println!("daemon is not running"),
                StopOutcome::Stopped => println!("daemon stop requested"),
                StopOutcome::StaleLockRemoved => {
                    println!("daemon was not answering; removed stale lock file")
                }
            }
        } else {
            match request_status(&root) {
                Ok(status) => println!("{status}"),
                Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
                Err(err) => return Err(err).context("failed to query daemon status"),
            }
        }
        Ok(ExitStatus::Success)
    }
}

fn describe(reason: ShutdownReason) -> &'static str {
    match reason {
        ShutdownReason::ExitCommand => "exit requested",
        ShutdownReason::IdleTimeout => "idle timeout",
        ShutdownReason::MaxRuntime => "maximum runtime reached",
    }
}
