//! TOML configuration for a certification run.
//!
//! Every section has defaults, so an empty file is valid apart from the
//! target key and tag, which must come from the file or the command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dispatch::DispatchPlan;
use crate::lab::RunTarget;
use crate::monitor::Timing;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CERTRUN_CONFIG";

const SYSTEM_CONFIG_PATH: &str = "/etc/certrun/certrun.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RunConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Resolve configuration, in order:
    /// 1. `explicit`, which must load.
    /// 2. The path in `CERTRUN_CONFIG`.
    /// 3. `/etc/certrun/certrun.toml`.
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Resolved> {
        match explicit {
            Some(path) => Ok(Resolved {
                config: Self::load(path)?,
                source: ConfigSource::File(path.to_path_buf()),
                skipped: Vec::new(),
            }),
            None => Ok(Self::load_or_default()),
        }
    }

    /// Steps 2-4 of [`RunConfig::resolve`]. Unreadable files fall through.
    pub fn load_or_default() -> Resolved {
        let mut candidates = Vec::new();
        if let Some(env_path) = std::env::var_os(CONFIG_ENV) {
            candidates.push(PathBuf::from(env_path));
        }
        let system_path = PathBuf::from(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            candidates.push(system_path);
        }

        let mut skipped = Vec::new();
        for path in candidates {
            match Self::load(&path) {
                Ok(config) => {
                    return Resolved {
                        config,
                        source: ConfigSource::File(path),
                        skipped,
                    }
                }
                Err(e) => skipped.push((path, format!("{e:#}"))),
            }
        }

        Resolved {
            config: Self::default(),
            source: ConfigSource::Defaults,
            skipped,
        }
    }

    /// Reject configurations a run cannot start from.
    pub fn validate(&self) -> Result<()> {
        if self.run.target_key.trim().is_empty() {
            bail!("run.target_key must be set");
        }
        if self.run.tag.trim().is_empty() {
            bail!("run.tag must be set");
        }
        if self.run.machine.trim().is_empty() {
            bail!("run.machine must not be empty");
        }
        if !self.run.single_machine && !self.run.multi_machine {
            bail!("at least one of run.single_machine and run.multi_machine must be enabled");
        }
        Ok(())
    }

    pub fn target(&self) -> RunTarget {
        RunTarget::new(&self.run.target_key, &self.run.tag)
    }

    pub fn plan(&self) -> DispatchPlan {
        DispatchPlan {
            single_machine: self.run.single_machine,
            multi_machine: self.run.multi_machine,
        }
    }

    pub fn timing(&self) -> Timing {
        Timing {
            poll_interval: Duration::from_secs(self.timing.poll_interval_secs),
            filter_settle: Duration::from_secs(self.timing.filter_settle_secs),
        }
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

/// Outcome of [`RunConfig::resolve`].
///
/// Resolution runs before tracing is initialised, so what happened is kept
/// here and logged by [`Resolved::log`] once a subscriber exists.
#[derive(Debug)]
pub struct Resolved {
    pub config: RunConfig,
    pub source: ConfigSource,
    /// Candidate files that could not be loaded, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

impl Resolved {
    pub fn log(&self) {
        for (path, error) in &self.skipped {
            warn!(path = %path.display(), %error, "config file could not be loaded, trying fallback");
        }
        match &self.source {
            ConfigSource::File(path) => info!(path = %path.display(), "loaded run configuration"),
            ConfigSource::Defaults => debug!("no config file found, using compiled-in defaults"),
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Identity of the run and which tests it queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// Target (hardware profile) key on the controller.
    pub target_key: String,
    /// Project tag grouping the run's queued tests.
    pub tag: String,
    /// Name of the machine under test.
    pub machine: String,
    /// Secondary machine for multi-machine tests.
    pub support_machine: Option<String>,
    pub single_machine: bool,
    pub multi_machine: bool,
    /// Build and upload the whole-run package when monitoring ends.
    pub package_on_finish: bool,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            target_key: String::new(),
            tag: String::new(),
            machine: "CL1".to_string(),
            support_machine: None,
            single_machine: true,
            multi_machine: true,
            package_on_finish: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_secs: u64,
    /// Wait after applying result filters.
    pub filter_settle_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            filter_settle_secs: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage / notify / logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory result artifacts are uploaded into.
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Receives run stats as JSON after every completed test.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
