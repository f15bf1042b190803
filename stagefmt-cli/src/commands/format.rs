//! One-shot formatting: working tree, pre-commit, pre-push and stdin.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use stagefmt_core::{settings, ExitStatus, GitBackend, GitCli, Settings, Target};
use stagefmt_daemon::{send_command, DaemonCommand, DaemonError};
use stagefmt_format::SpacingFormatter;
use stagefmt_pipeline::{self as pipeline, report::PRE_PUSH_WARNING, Dispatcher, FormatRequest, Mode};
use stagefmt_scope::{paths::absolutize, ScopeResolver};

use super::{current_dir, repo_root};

const STDIN_ARG: &str = "-";

#[derive(Args, Debug)]
pub struct FormatArgs {
    /// Files or directories to format; a lone `-` formats stdin to stdout.
    pub files: Vec<PathBuf>,

    /// Report what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Exit with status 3 when any file changed or would change.
    #[arg(long)]
    pub set_exit_if_changed: bool,

    /// Format staged files, updating the index (and clean working copies).
    #[arg(long)]
    pub pre_commit: bool,

    /// Check the files of a commit; requires `--dry-run`.
    #[arg(long)]
    pub pre_push: bool,

    /// Commit checked by `--pre-push`.
    #[arg(long, value_name = "REF", default_value = "HEAD")]
    pub push_commit: String,

    /// Print timing and volume statistics to stderr.
    #[arg(
        long,
        env = "STAGEFMT_STATS",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub print_stats: bool,

    /// Send `--pre-commit`/`--pre-push` to a running daemon, formatting
    /// in-process when none answers.
    #[arg(long)]
    pub use_daemon: bool,
}

impl FormatArgs {
    pub fn run(self) -> Result<ExitStatus> {
        let started = Instant::now();
        if let Err(message) = self.validate() {
            eprintln!("{} {message}", "error:".red().bold());
            return Ok(ExitStatus::BadArgs);
        }

        let cwd = current_dir()?;
        let git: Arc<dyn GitBackend> = Arc::new(GitCli::new());
        let mode = self.mode();

        let root = match mode {
            Mode::WorkingDir => git.show_toplevel(&cwd).ok(),
            _ => Some(repo_root(git.as_ref(), &cwd)?),
        };
        let settings = settings::load(root.as_deref()).context("failed to load settings")?;

        if self.use_daemon && mode != Mode::WorkingDir {
            if let Some(root) = &root {
                if let Some(status) = self.run_in_daemon(root, &cwd, &mode)? {
                    return Ok(status);
                }
            }
        }

        let dispatcher = dispatcher(&settings)?;
        let resolver = ScopeResolver::new(git, settings, cwd);
        if self.is_stream() {
            return self.run_stream(&resolver, &dispatcher, started);
        }

        let request = FormatRequest {
            mode,
            files: self.files.clone(),
            dry_run: self.dry_run,
            collect_stats: self.print_stats,
        };
        let result = pipeline::run(&request, &resolver, &dispatcher).context("formatting failed")?;

        print_report(&result.output);
        if let Some(stats) = &result.stats {
            eprintln!("{stats}");
        }
        Ok(result.exit_status(self.fail_on_change()))
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.pre_commit && self.pre_push {
            return Err("--pre-commit and --pre-push cannot be combined");
        }
        if self.pre_push && !self.dry_run {
            return Err("--pre-push only checks committed files; add --dry-run");
        }
        if self.is_stream() && (self.pre_commit || self.pre_push) {
            return Err("stdin cannot be combined with --pre-commit or --pre-push");
        }
        if self.files.is_empty() && !self.pre_commit && !self.pre_push {
            return Err("no files given; pass paths, `-` for stdin, or a hook mode");
        }
        Ok(())
    }

    fn mode(&self) -> Mode {
        if self.pre_commit {
            Mode::PreCommit
        } else if self.pre_push {
            Mode::PrePush {
                commit: self.push_commit.clone(),
            }
        } else {
            Mode::WorkingDir
        }
    }

    fn is_stream(&self) -> bool {
        matches!(self.files.as_slice(), [only] if only.as_os_str() == STDIN_ARG)
    }

    fn fail_on_change(&self) -> bool {
        self.set_exit_if_changed || self.pre_push
    }

    /// `Ok(None)` means no daemon answered and the caller should format
    /// in-process.
    fn run_in_daemon(&self, root: &Path, cwd: &Path, mode: &Mode) -> Result<Option<ExitStatus>> {
        let files = self
            .files
            .iter()
            .map(|file| absolutize(cwd, file).display().to_string())
            .collect();
        let command = match mode {
            Mode::PrePush { commit } => DaemonCommand::PrePush {
                commit: commit.clone(),
                files,
            },
            _ => DaemonCommand::PreCommit { files },
        };

        match send_command(root, &command) {
            Ok(reply) => {
                print_report(&reply.body);
                Ok(Some(reply.status().unwrap_or(ExitStatus::Failure)))
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                tracing::info!("no daemon answering; formatting in-process");
                Ok(None)
            }
            Err(err) => Err(err).context("daemon request failed"),
        }
    }

    /// Formatted content goes to stdout; the report only with `--dry-run`.
    fn run_stream(
        &self,
        resolver: &ScopeResolver,
        dispatcher: &Dispatcher,
        started: Instant,
    ) -> Result<ExitStatus> {
        let scope = resolver.stream(
            io::stdin(),
            |content: &str| {
                let mut stdout = io::stdout().lock();
                stdout.write_all(content.as_bytes())?;
                stdout.flush()
            },
            self.dry_run,
        );
        let stats_since = self.print_stats.then_some(started);
        let result = pipeline::run_scope(&scope, false, dispatcher, stats_since);

        if self.dry_run {
            print_report(&result.output);
        } else {
            for target in &scope.targets {
                if let Target::Stream(stream) = target {
                    stream
                        .replay_if_unwritten()
                        .context("failed to write stdout")?;
                }
            }
            if result.has_failure {
                eprint!("{}", result.output);
            }
        }
        if let Some(stats) = &result.stats {
            eprintln!("{stats}");
        }
        Ok(result.exit_status(self.fail_on_change()))
    }
}

fn dispatcher(settings: &Settings) -> Result<Dispatcher> {
    Dispatcher::new(Arc::new(SpacingFormatter::new()), settings.jobs)
        .context("failed to start formatting workers")
}

fn print_report(output: &str) {
    for line in output.lines() {
        if line.starts_with("⛔️") {
            println!("{}", line.red());
        } else if line.starts_with("🛠️") || line == PRE_PUSH_WARNING {
            println!("{}", line.yellow());
        } else if line.starts_with("✅") {
            println!("{}", line.green());
        } else {
            println!("{line}");
        }
    }
}
