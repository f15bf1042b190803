//! Daemon runtime: lock, TCP accept loop and timeout supervisor.
//!
//! ```text
//! Starting -> Listening -> (Handling -> Listening)* -> ShuttingDown -> Stopped
//! ```
//!
//! The accept loop and the supervisor are two tasks sharing a [`Clock`]
//! behind a `RwLock`. Either an `exit` command or the supervisor ends the
//! loop through a broadcast channel; cleanup then runs exactly once.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use stagefmt_core::{ExitStatus, Settings};
use stagefmt_pipeline::{self as pipeline, CommandResult, Dispatcher, FormatRequest, Mode};
use stagefmt_scope::ScopeResolver;

use crate::error::{io_err, DaemonError};
use crate::lock::{DaemonLock, LockAttempt};
use crate::paths::{lock_path, CLIENT_READ_TIMEOUT, DAEMON_VERSION, HANDOFF_WAIT};
use crate::protocol::{self, DaemonCommand, DaemonReply};
use crate::record::{read_record, DaemonRecord};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Why a daemon that started successfully stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    ExitCommand,
    IdleTimeout,
    MaxRuntime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Another daemon holds the lock; nothing was changed.
    AlreadyRunning,
    Stopped(ShutdownReason),
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub root: PathBuf,
    pub version: u32,
    pub idle_timeout: Duration,
    pub max_runtime: Duration,
    pub check_interval: Duration,
    pub handoff_wait: Duration,
}

impl DaemonConfig {
    pub fn from_settings(root: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            root: root.into(),
            version: DAEMON_VERSION,
            idle_timeout: settings.daemon.idle_timeout(),
            max_runtime: settings.daemon.max_runtime(),
            check_interval: settings.daemon.check_interval(),
            handoff_wait: HANDOFF_WAIT,
        }
    }
}

/// The warm collaborators every command reuses.
pub struct DaemonServices {
    pub resolver: ScopeResolver,
    pub dispatcher: Dispatcher,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Clock {
    started: Instant,
    started_at: DateTime<Utc>,
    last_command: Instant,
}

impl Clock {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            started_at: Utc::now(),
            last_command: now,
        }
    }

    fn idle(&self) -> Duration {
        self.last_command.elapsed()
    }

    fn runtime(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    idle_timeout: Duration,
    max_runtime: Duration,
}

fn expiry(idle: Duration, runtime: Duration, limits: Limits) -> Option<ShutdownReason> {
    if idle >= limits.idle_timeout {
        Some(ShutdownReason::IdleTimeout)
    } else if runtime >= limits.max_runtime {
        Some(ShutdownReason::MaxRuntime)
    } else {
        None
    }
}

fn status_text(clock: &Clock, limits: Limits) -> String {
    let idle = clock.idle().as_secs();
    let runtime = clock.runtime().as_secs();
    format!(
        "Daemon Status:\n\
         Started at: {}\n\
         Idle time: {idle}s\n\
         Total runtime: {runtime}s\n\
         Time until idle timeout: {}s\n\
         Time until max runtime timeout: {}s",
        clock.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        limits.idle_timeout.as_secs().saturating_sub(idle),
        limits.max_runtime.as_secs().saturating_sub(runtime),
    )
}

/// Everything that must be released on every termination path.
struct DaemonResources {
    supervisor: Option<JoinHandle<()>>,
    lock: Option<DaemonLock>,
}

impl DaemonResources {
    fn cleanup(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.abort();
        }
        if let Some(mut lock) = self.lock.take() {
            if let Err(err) = lock.release() {
                tracing::warn!(error = %err, "error during cleanup");
            }
        }
    }
}

impl Drop for DaemonResources {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

pub struct Daemon {
    config: DaemonConfig,
    services: Arc<DaemonServices>,
}

impl Daemon {
    pub fn new(config: DaemonConfig, services: DaemonServices) -> Self {
        Self {
            config,
            services: Arc::new(services),
        }
    }

    /// Start the daemon on a fresh runtime and block until it stops.
    pub fn start_blocking(self) -> Result<StartOutcome, DaemonError> {
        init_tracing();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| io_err("tokio-runtime", e))?;
        runtime.block_on(self.run())
    }

    pub async fn run(self) -> Result<StartOutcome, DaemonError> {
        let lock_file = lock_path(&self.config.root);
        self.displace_older(&lock_file).await?;

        let mut lock = match DaemonLock::acquire(&lock_file)? {
            LockAttempt::Acquired(lock) => lock,
            LockAttempt::Held => {
                tracing::info!(lock = %lock_file.display(), "daemon is already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
        };

        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .map_err(|e| io_err("127.0.0.1:0", e))?;
        let port = listener
            .local_addr()
            .map_err(|e| io_err("127.0.0.1:0", e))?
            .port();

        let clock = Arc::new(RwLock::new(Clock::new()));
        let limits = Limits {
            idle_timeout: self.config.idle_timeout,
            max_runtime: self.config.max_runtime,
        };
        lock.write_record(&DaemonRecord {
            version: self.config.version,
            port,
        })?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel::<ShutdownReason>(4);
        let supervisor = tokio::spawn(supervise(
            clock.clone(),
            limits,
            self.config.check_interval,
            shutdown_tx,
        ));
        let mut resources = DaemonResources {
            supervisor: Some(supervisor),
            lock: Some(lock),
        };

        tracing::info!(
            root = %self.config.root.display(),
            port,
            version = self.config.version,
            "daemon listening"
        );

        let reason = self
            .accept_loop(listener, clock, limits, shutdown_rx)
            .await;
        resources.cleanup();
        tracing::info!(?reason, "daemon stopped");
        Ok(StartOutcome::Stopped(reason))
    }

    /// Ask a running daemon with an older protocol version to exit, then
    /// give it a fixed moment to let go of the lock.
    async fn displace_older(&self, lock_file: &Path) -> Result<(), DaemonError> {
        let Some(record) = read_record(lock_file)? else {
            return Ok(());
        };
        if record.version >= self.config.version {
            return Ok(());
        }
        tracing::info!(
            old = record.version,
            new = self.config.version,
            "stopping older daemon"
        );
        let root = self.config.root.clone();
        let outcome = tokio::task::spawn_blocking(move || protocol::request_stop(&root))
            .await
            .map_err(|err| DaemonError::Protocol(format!("hand-off join error: {err}")))??;
        tracing::debug!(?outcome, "older daemon asked to exit");
        tokio::time::sleep(self.config.handoff_wait).await;
        Ok(())
    }

    /// Serve one connection at a time until shutdown is requested. The
    /// listener is closed when this returns.
    async fn accept_loop(
        &self,
        listener: TcpListener,
        clock: Arc<RwLock<Clock>>,
        limits: Limits,
        mut shutdown_rx: broadcast::Receiver<ShutdownReason>,
    ) -> ShutdownReason {
        loop {
            tokio::select! {
                biased;
                reason = shutdown_rx.recv() => {
                    return reason.unwrap_or(ShutdownReason::ExitCommand);
                }
                accepted = listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "client connected");
                            stream
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "accept failed");
                            continue;
                        }
                    };
                    match self.handle_client(stream, &clock, limits).await {
                        Ok(Some(reason)) => return reason,
                        Ok(None) => {}
                        Err(err) => tracing::error!(error = %err, "error handling client connection"),
                    }
                }
            }
        }
    }

    async fn handle_client(
        &self,
        stream: TcpStream,
        clock: &RwLock<Clock>,
        limits: Limits,
    ) -> Result<Option<ShutdownReason>, DaemonError> {
        let (reader, mut writer) = stream.into_split();
        let mut line = String::new();
        let read = tokio::time::timeout(
            CLIENT_READ_TIMEOUT,
            BufReader::new(reader).read_line(&mut line),
        )
        .await;
        match read {
            Err(_) => {
                tracing::warn!("client sent no command in time; dropping connection");
                return Ok(None);
            }
            Ok(Err(err)) => return Err(io_err("daemon socket read", err)),
            Ok(Ok(0)) => return Ok(None),
            Ok(Ok(_)) => {}
        }

        let command = DaemonCommand::parse(&line);
        tracing::info!(command = %command.to_line(), "handling command");

        let reply = match command {
            DaemonCommand::Exit => return Ok(Some(ShutdownReason::ExitCommand)),
            DaemonCommand::Status => {
                let mut clock = clock.write().await;
                let body = status_text(&clock, limits);
                clock.last_command = Instant::now();
                DaemonReply::new(ExitStatus::Success, body)
            }
            DaemonCommand::PreCommit { files } => {
                let request = FormatRequest {
                    mode: Mode::PreCommit,
                    files: files.into_iter().map(PathBuf::from).collect(),
                    dry_run: false,
                    collect_stats: false,
                };
                self.run_pipeline(request, false, clock).await
            }
            DaemonCommand::PrePush { commit, files } => {
                let request = FormatRequest {
                    mode: Mode::PrePush { commit },
                    files: files.into_iter().map(PathBuf::from).collect(),
                    dry_run: true,
                    collect_stats: false,
                };
                self.run_pipeline(request, true, clock).await
            }
            DaemonCommand::Invalid { reason, .. } => DaemonReply::new(ExitStatus::BadArgs, reason),
            DaemonCommand::Unknown(command) => {
                DaemonReply::new(ExitStatus::Failure, format!("Unknown command: {command}"))
            }
        };

        writer
            .write_all(reply.to_wire().as_bytes())
            .await
            .map_err(|e| io_err("daemon socket write", e))?;
        writer
            .shutdown()
            .await
            .map_err(|e| io_err("daemon socket shutdown", e))?;
        Ok(None)
    }

    async fn run_pipeline(
        &self,
        request: FormatRequest,
        fail_on_change: bool,
        clock: &RwLock<Clock>,
    ) -> DaemonReply {
        let services = self.services.clone();
        let joined = tokio::task::spawn_blocking(move || -> Result<CommandResult, DaemonError> {
            Ok(pipeline::run(&request, &services.resolver, &services.dispatcher)?)
        })
        .await;

        let result = match joined {
            Ok(result) => result,
            Err(err) => Err(DaemonError::Protocol(format!("pipeline join error: {err}"))),
        };
        match result {
            Ok(result) => {
                clock.write().await.last_command = Instant::now();
                DaemonReply::new(result.exit_status(fail_on_change), result.output)
            }
            Err(err) => {
                tracing::error!(error = %err, "command failed");
                DaemonReply::new(ExitStatus::Failure, err.to_string())
            }
        }
    }
}

async fn supervise(
    clock: Arc<RwLock<Clock>>,
    limits: Limits,
    check_interval: Duration,
    shutdown_tx: broadcast::Sender<ShutdownReason>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut interval = tokio::time::interval(check_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let (idle, runtime) = {
                    let clock = clock.read().await;
                    (clock.idle(), clock.runtime())
                };
                if let Some(reason) = expiry(idle, runtime, limits) {
                    tracing::info!(
                        ?reason,
                        idle_secs = idle.as_secs(),
                        runtime_secs = runtime.as_secs(),
                        "shutting down"
                    );
                    let _ = shutdown_tx.send(reason);
                    break;
                }
            }
        }
    }
}

/// Install the stderr subscriber (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
