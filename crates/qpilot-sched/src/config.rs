//! Configuration for the dispatcher, watcher, pilots and logging.
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (`QPILOT_` prefix)
//! 2. Configuration file (YAML)
//! 3. Default values

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatcher::DispatchConfig;
use crate::queue::BackoffPolicy;

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dispatch: DispatchSection,
    pub watch: WatchSection,
    pub pilots: PilotsSection,
    pub preprocessing: PreprocessingSection,
    pub logging: LoggingSection,
}

/// How jobs are dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// Refuse unsafe converters and preprocessing that executes programs.
    pub exclude_unsafe: bool,
    /// Dispatch through the task queue instead of inline.
    pub background: bool,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            exclude_unsafe: true,
            background: false,
        }
    }
}

/// Backoff of the result watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_secs: u64,
    pub timeout_secs: u64,
    /// Transient entries older than this are discarded as ERROR.
    pub stale_after_secs: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_secs: 60,
            timeout_secs: 24 * 60 * 60,
            stale_after_secs: 24 * 60 * 60,
        }
    }
}

/// Per-pilot settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotsSection {
    pub simulator: SimulatorSection,
    pub qmware: QmwareSection,
}

/// Local simulator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSection {
    pub max_qubits: u32,
    /// Fixed sampling seed for reproducible counts.
    pub seed: Option<u64>,
}

impl Default for SimulatorSection {
    fn default() -> Self {
        Self {
            max_qubits: 20,
            seed: None,
        }
    }
}

/// QMware REST settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QmwareSection {
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for QmwareSection {
    fn default() -> Self {
        Self {
            endpoint: "https://api.qmware.net".to_string(),
            token: None,
        }
    }
}

impl fmt::Debug for QmwareSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QmwareSection")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Program preprocessing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingSection {
    /// Interpreter used for `PYTHON` programs.
    pub python_interpreter: String,
}

impl Default for PreprocessingSection {
    fn default() -> Self {
        Self {
            python_interpreter: "python3".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// "trace", "debug", "info", "warn" or "error"
    pub level: String,
    /// "console" or "json"
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "console".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml_ng::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// File (or defaults), then process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.merge_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `QPILOT_*` overrides read through `lookup`.
    ///
    /// Only variables that are set override; unparsable values are errors.
    pub fn merge_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn parsed<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value })
        }
        macro_rules! apply {
            ($key:literal => $field:expr) => {
                if let Some(v) = lookup($key) {
                    $field = parsed($key, v)?;
                }
            };
        }

        apply!("QPILOT_EXCLUDE_UNSAFE" => self.dispatch.exclude_unsafe);
        apply!("QPILOT_BACKGROUND" => self.dispatch.background);
        apply!("QPILOT_WATCH_INITIAL_DELAY_MS" => self.watch.initial_delay_ms);
        apply!("QPILOT_WATCH_BACKOFF_FACTOR" => self.watch.backoff_factor);
        apply!("QPILOT_WATCH_MAX_DELAY_SECS" => self.watch.max_delay_secs);
        apply!("QPILOT_WATCH_TIMEOUT_SECS" => self.watch.timeout_secs);
        apply!("QPILOT_STALE_AFTER_SECS" => self.watch.stale_after_secs);
        apply!("QPILOT_SIM_MAX_QUBITS" => self.pilots.simulator.max_qubits);
        if let Some(v) = lookup("QPILOT_SIM_SEED") {
            self.pilots.simulator.seed = Some(parsed("QPILOT_SIM_SEED", v)?);
        }
        if let Some(v) = lookup("QPILOT_QMWARE_ENDPOINT") {
            self.pilots.qmware.endpoint = v;
        }
        if let Some(v) = lookup("QPILOT_QMWARE_TOKEN") {
            self.pilots.qmware.token = Some(v);
        }
        if let Some(v) = lookup("QPILOT_PYTHON_INTERPRETER") {
            self.preprocessing.python_interpreter = v;
        }
        if let Some(v) = lookup("QPILOT_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("QPILOT_LOG_FORMAT") {
            self.logging.format = v;
        }
        Ok(self)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.watch.backoff_factor.is_finite() && self.watch.backoff_factor >= 1.0) {
            return Err(ConfigError::Validation(
                "watch.backoff_factor must be at least 1".into(),
            ));
        }
        if self.watch.max_delay_secs == 0 {
            return Err(ConfigError::Validation(
                "watch.max_delay_secs must be positive".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "console" | "json") {
            return Err(ConfigError::Validation(format!(
                "logging.format must be \"console\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        if self.pilots.simulator.max_qubits == 0 {
            return Err(ConfigError::Validation(
                "pilots.simulator.max_qubits must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Watch backoff derived from the `watch` section.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(self.watch.initial_delay_ms),
            factor: self.watch.backoff_factor,
            max_interval: Duration::from_secs(self.watch.max_delay_secs),
            timeout: Duration::from_secs(self.watch.timeout_secs),
        }
    }

    /// Dispatcher settings derived from this configuration.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            exclude_unsafe: self.dispatch.exclude_unsafe,
            background: self.dispatch.background,
            watch: self.backoff(),
            stale_after: Duration::from_secs(self.watch.stale_after_secs),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),
}
