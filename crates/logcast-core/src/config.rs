//! Engine configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! build_mode = "development"
//! min_level = "DEBUG"          # optional; overrides the build-mode default
//!
//! [app]
//! name = "checkout"
//! version = "2.4.1"
//!
//! [file]
//! logs_dir = "./logs"
//! instance = "checkout"
//!
//! [remote]
//! batch_size = 50
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::level::LogLevel;

/// Build configuration the host was compiled or deployed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    #[default]
    Release,
}

impl BuildMode {
    /// Minimum level used when no explicit override is configured.
    pub fn default_min_level(self) -> LogLevel {
        match self {
            BuildMode::Development => LogLevel::Trace,
            BuildMode::Release => LogLevel::Info,
        }
    }
}

/// Root configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub build_mode: BuildMode,

    /// Explicit minimum level; wins over the build-mode default.
    pub min_level: Option<LogLevel>,

    pub app: AppInfo,

    pub stats: StatsConfig,

    pub performance: PerformanceConfig,

    /// Local JSONL sink; disabled when absent.
    pub file: Option<FileSinkConfig>,

    /// Remote sink tuning. The sink itself is only created when a transport
    /// is supplied to the builder.
    pub remote: RemoteSinkConfig,

    /// Upper bound for each sink's flush inside [`Engine::flush`](crate::Engine::flush).
    pub flush_timeout_ms: u64,

    /// How long a logging call waits for its sinks before returning. A sink
    /// that misses it keeps its queued entries but is no longer waited on
    /// until it catches up.
    pub write_timeout_ms: u64,

    /// Entries each sink may have queued before new ones are dropped.
    pub sink_queue_capacity: usize,
}

impl EngineConfig {
    /// Config for a development build (TRACE and above).
    pub fn development() -> Self {
        Self {
            build_mode: BuildMode::Development,
            ..Self::default()
        }
    }

    /// Config for a release build (INFO and above).
    pub fn release() -> Self {
        Self::default()
    }

    /// Set an explicit minimum level.
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    /// Enable the file sink.
    pub fn with_file(mut self, file: FileSinkConfig) -> Self {
        self.file = Some(file);
        self
    }

    /// The minimum level the engine starts with.
    pub fn effective_min_level(&self) -> LogLevel {
        self.min_level
            .unwrap_or_else(|| self.build_mode.default_min_level())
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject values that would make a sink or the stats timer misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stats.enabled && self.stats.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "stats.interval_secs must be greater than zero".into(),
            ));
        }
        if self.remote.batch_size == 0 {
            return Err(ConfigError::Invalid("remote.batch_size must be at least 1".into()));
        }
        if self.remote.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "remote.queue_capacity must be at least 1".into(),
            ));
        }
        if self.sink_queue_capacity == 0 {
            return Err(ConfigError::Invalid("sink_queue_capacity must be at least 1".into()));
        }
        if let Some(file) = &self.file {
            if file.instance.trim().is_empty() {
                return Err(ConfigError::Invalid("file.instance must not be empty".into()));
            }
            if file.max_files == 0 {
                return Err(ConfigError::Invalid("file.max_files must be at least 1".into()));
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            build_mode: BuildMode::default(),
            min_level: None,
            app: AppInfo::default(),
            stats: StatsConfig::default(),
            performance: PerformanceConfig::default(),
            file: None,
            remote: RemoteSinkConfig::default(),
            flush_timeout_ms: 2_000,
            write_timeout_ms: 100,
            sink_queue_capacity: 1_024,
        }
    }
}

/// Host application identity attached to context and business events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub build: Option<String>,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: "logcast".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            build: None,
        }
    }
}

/// Rolling statistics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub enabled: bool,
    /// Seconds between summary entries.
    pub interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

impl StatsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Performance event settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Operations longer than this also emit a WARN slow-operation entry.
    pub slow_threshold_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 5_000,
        }
    }
}

/// Local JSONL file sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSinkConfig {
    /// Directory holding `raw/<date>_<instance>.jsonl`
    pub logs_dir: PathBuf,
    /// Instance name used in the file name
    pub instance: String,
    /// Entries held in memory before an automatic flush
    pub buffer_entries: usize,
    /// Active file size that triggers rotation
    pub max_file_bytes: u64,
    /// Rotated generations kept besides the active file
    pub max_files: usize,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            instance: "app".to_string(),
            buffer_entries: 50,
            max_file_bytes: 5 * 1024 * 1024,
            max_files: 3,
        }
    }
}

impl FileSinkConfig {
    pub fn new(logs_dir: impl Into<PathBuf>, instance: impl Into<String>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            instance: instance.into(),
            ..Self::default()
        }
    }
}

/// Remote telemetry sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSinkConfig {
    /// Entries below this level are not forwarded
    pub min_level: LogLevel,
    pub batch_size: usize,
    /// Partial batches are sent after this long
    pub flush_interval_ms: u64,
    pub max_retries: u32,
    /// Delay before retry `n` is `n * retry_backoff_ms`
    pub retry_backoff_ms: u64,
    /// Entries queued beyond this are dropped
    pub queue_capacity: usize,
}

impl Default for RemoteSinkConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            batch_size: 20,
            flush_interval_ms: 5_000,
            max_retries: 3,
            retry_backoff_ms: 200,
            queue_capacity: 1024,
        }
    }
}
