//! stagefmt — format staged, committed or working-tree source files.
//!
//! # Usage
//!
//! ```text
//! stagefmt [--dry-run] [--set-exit-if-changed] <files>...
//! stagefmt --pre-commit [--use-daemon] [<files>...]
//! stagefmt --pre-push --dry-run [--push-commit <ref>] [--use-daemon] [<files>...]
//! stagefmt -                      # stdin to stdout
//! stagefmt --daemon | --stop-daemon | --daemon-status
//! ```
//!
//! Exit codes: 0 success, 1 a target failed, 2 bad arguments, 3 a target
//! changed while `--set-exit-if-changed` (or `--pre-push`) is in effect.

mod commands;

use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use commands::{daemon::DaemonArgs, format::FormatArgs};
use stagefmt_core::ExitStatus;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "stagefmt",
    version,
    about = "Format source files in the working tree, the git index or a commit",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    format: FormatArgs,

    #[command(flatten)]
    daemon: DaemonArgs,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let outcome = if cli.daemon.requested() {
        cli.daemon.run()
    } else {
        init_tracing();
        cli.format.run()
    };

    let status = match outcome {
        Ok(status) => status,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitStatus::Failure
        }
    };
    ExitCode::from(status.code() as u8)
}

/// stderr subscriber for one-shot runs (`RUST_LOG`, default `warn`).
pub(crate) fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
