use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::catalog::GroupAndName;
use crate::request::FtraceConfig;
use crate::resolver::VendorEvents;

/// Top-level configuration for the tracemux daemon.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error), unless `--log-level`
    /// is given. Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Kernel tracefs location.
    #[serde(default)]
    pub tracefs: TraceFsConfig,

    /// Userspace category helper configuration.
    #[serde(default)]
    pub atrace: AtraceConfig,

    /// Extra events per category, as "group/name" strings.
    #[serde(default)]
    pub vendor_events: BTreeMap<String, Vec<String>>,

    /// Sessions admitted and activated when the daemon starts.
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,

    /// Prometheus health metrics server configuration.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Kernel tracefs location.
#[derive(Debug, Default, Deserialize)]
pub struct TraceFsConfig {
    /// tracefs mount point. Empty: auto-detect.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Userspace category helper configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AtraceConfig {
    /// Helper binary, looked up in PATH unless absolute. Default: "atrace".
    #[serde(default = "default_atrace_binary")]
    pub binary: String,

    /// Legacy-compatibility mode (single helper session, tracing_on not
    /// trusted as a contention signal). Default: false.
    #[serde(default)]
    pub legacy: bool,

    /// Kill the helper if a single run exceeds this. Default: 10s.
    #[serde(default = "default_atrace_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// A named session request.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session name, used in logs.
    pub name: String,

    /// The request handed to the muxer.
    #[serde(flatten)]
    pub request: FtraceConfig,
}

/// Prometheus health metrics server configuration.
#[derive(Debug, Deserialize)]
pub struct HealthConfig {
    /// Listen address. Default: ":9090".
    #[serde(default = "default_health_addr")]
    pub addr: String,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_atrace_binary() -> String {
    "atrace".to_string()
}

fn default_atrace_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_health_addr() -> String {
    ":9090".to_string()
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tracefs: TraceFsConfig::default(),
            atrace: AtraceConfig::default(),
            vendor_events: BTreeMap::new(),
            sessions: Vec::new(),
            health: HealthConfig::default(),
        }
    }
}

impl Default for AtraceConfig {
    fn default() -> Self {
        Self {
            binary: default_atrace_binary(),
            legacy: false,
            timeout: default_atrace_timeout(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            addr: default_health_addr(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.atrace.binary.is_empty() {
            bail!("atrace.binary must not be empty");
        }

        if self.atrace.timeout.is_zero() {
            bail!("atrace.timeout must be positive");
        }

        if self.sessions.is_empty() {
            bail!("at least one session is required");
        }

        let mut names = HashSet::new();
        for session in &self.sessions {
            if session.name.is_empty() {
                bail!("session name must not be empty");
            }
            if !names.insert(session.name.as_str()) {
                bail!("duplicate session name: {}", session.name);
            }
        }

        self.vendor_events()?;

        Ok(())
    }

    /// Parse the vendor event table.
    pub fn vendor_events(&self) -> Result<VendorEvents> {
        let mut table = VendorEvents::new();

        for (category, events) in &self.vendor_events {
            let parsed = events
                .iter()
                .map(|event| event.parse::<GroupAndName>())
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("invalid vendor event for category {category}"))?;
            table.insert(category.clone(), parsed);
        }

        Ok(table)
    }
}
