//! Layered YAML settings.
//!
//! # Layers
//!
//! ```text
//! built-in defaults
//!   <- <home>/.stagefmt/config.yaml   (user)
//!   <- <root>/.stagefmt/config.yaml   (repository)
//! ```
//!
//! Later layers override individual keys of earlier ones; absent files are
//! skipped. `load_at` takes explicit directories for tests, `load` derives the
//! home directory from `dirs::home_dir()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Per-user and per-repository state directory name.
pub const STATE_DIR: &str = ".stagefmt";

/// Settings file name inside [`STATE_DIR`].
pub const SETTINGS_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Effective settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Source file extension, without the leading dot.
    pub extension: String,
    /// A directory named `build_dir_name` is build output when a sibling
    /// file carries one of these names.
    pub build_descriptors: Vec<String>,
    pub build_dir_name: String,
    /// Formatting worker count; `None` means one per available CPU.
    pub jobs: Option<usize>,
    pub daemon: DaemonSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extension: "kt".to_string(),
            build_descriptors: vec!["build.gradle.kts".to_string(), "build.gradle".to_string()],
            build_dir_name: "build".to_string(),
            jobs: None,
            daemon: DaemonSettings::default(),
        }
    }
}

impl Settings {
    /// Whether `path` names a source file by extension.
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.extension)
    }

    /// Whether `dir` is a build output directory: its name is
    /// `build_dir_name` and its parent holds a build descriptor.
    pub fn is_build_output_dir(&self, dir: &Path) -> bool {
        let named = dir
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name == self.build_dir_name);
        if !named {
            return false;
        }
        let Some(parent) = dir.parent() else {
            return false;
        };
        self.build_descriptors
            .iter()
            .any(|descriptor| parent.join(descriptor).is_file())
    }
}

/// Daemon lifetime limits, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub idle_timeout_secs: u64,
    pub max_runtime_secs: u64,
    pub check_interval_secs: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 24 * 60 * 60,
            max_runtime_secs: 7 * 24 * 60 * 60,
            check_interval_secs: 60,
        }
    }
}

impl DaemonSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_runtime(&self) -> Duration {
        Duration::from_secs(self.max_runtime_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// One settings file; every key optional.
#[derive(Debug, Default, Deserialize)]
struct SettingsOverlay {
    extension: Option<String>,
    build_descriptors: Option<Vec<String>>,
    build_dir_name: Option<String>,
    jobs: Option<usize>,
    #[serde(default)]
    daemon: DaemonOverlay,
}

#[derive(Debug, Default, Deserialize)]
struct DaemonOverlay {
    idle_timeout_secs: Option<u64>,
    max_runtime_secs: Option<u64>,
    check_interval_secs: Option<u64>,
}

impl SettingsOverlay {
    fn apply(self, settings: &mut Settings) {
        if let Some(extension) = self.extension {
            settings.extension = extension.trim_start_matches('.').to_string();
        }
        if let Some(descriptors) = self.build_descriptors {
            settings.build_descriptors = descriptors;
        }
        if let Some(name) = self.build_dir_name {
            settings.build_dir_name = name;
        }
        if self.jobs.is_some() {
            settings.jobs = self.jobs;
        }
        if let Some(secs) = self.daemon.idle_timeout_secs {
            settings.daemon.idle_timeout_secs = secs;
        }
        if let Some(secs) = self.daemon.max_runtime_secs {
            settings.daemon.max_runtime_secs = secs;
        }
        if let Some(secs) = self.daemon.check_interval_secs {
            settings.daemon.check_interval_secs = secs.max(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// `<base>/.stagefmt/config.yaml` (pure, no I/O).
pub fn settings_path(base: &Path) -> PathBuf {
    base.join(STATE_DIR).join(SETTINGS_FILE)
}

/// Merge defaults with the user file under `home` and the repository file
/// under `root`, in that order.
pub fn load_at(home: Option<&Path>, root: Option<&Path>) -> Result<Settings, SettingsError> {
    let mut settings = Settings::default();
    for base in [home, root].into_iter().flatten() {
        if let Some(overlay) = read_overlay(&settings_path(base))? {
            overlay.apply(&mut settings);
        }
    }
    Ok(settings)
}

/// `load_at` convenience wrapper using the current user's home directory.
pub fn load(root: Option<&Path>) -> Result<Settings, SettingsError> {
    let home = dirs::home_dir();
    load_at(home.as_deref(), root)
}

fn read_overlay(path: &Path) -> Result<Option<SettingsOverlay>, SettingsError> {
    if !path.is_file() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(Some(SettingsOverlay::default()));
    }
    tracing::debug!(path = %path.display(), "loading settings layer");
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}
