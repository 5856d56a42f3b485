use procward_core::EngineSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides, e.g. `PROCWARD_ENGINE__KILL_DELAY_SECS`
pub const ENV_PREFIX: &str = "PROCWARD";

/// Main configuration for procward daemon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enforcement engine tunables
    pub engine: EngineConfig,

    /// Locations of the files the daemon reads and writes
    pub paths: PathsConfig,

    /// Logging configuration
    pub logging: LogConfig,

    /// File watching for hot reload
    pub reload: ReloadConfig,
}

/// Enforcement engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between ticks, sub-second values allowed (default: 1.0)
    pub polling_interval_secs: f64,

    /// Seconds a launcher target must be missing before it is started (default: 3.0)
    pub relaunch_delay_secs: f64,

    /// Consecutive launch failures before giving up, 0 = unlimited (default: 5)
    pub max_relaunch_retries: u32,

    /// Seconds a killer target must be present before it is terminated (default: 0.0)
    pub kill_delay_secs: f64,

    /// Consecutive terminate failures before giving up, 0 = unlimited (default: 3)
    pub max_killer_retries: u32,

    /// Also refuse to launch protected names (default: false)
    pub guard_launchers: bool,

    /// Seconds between the polite terminate request and the forced kill (default: 2.0)
    pub terminate_grace_secs: f64,
}

/// File locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Launcher/killer entry document (JSON)
    pub entries: PathBuf,

    /// Extra protected names, one per line
    pub exclusions: PathBuf,

    /// Append-only event history (JSON lines)
    pub history: PathBuf,

    /// Status document rewritten after every tick
    pub status: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log directory path (default: ./logs/)
    pub log_dir: PathBuf,

    /// Daily-rotated log file name (default: procward-daemon.log)
    pub file_name: String,

    /// Default filter when RUST_LOG is unset (default: info)
    pub level: String,
}

/// Hot reload settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Seconds between modification checks of config, entries and exclusions (default: 2)
    pub watch_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            polling_interval_secs: 1.0,
            relaunch_delay_secs: 3.0,
            max_relaunch_retries: 5,
            kill_delay_secs: 0.0,
            max_killer_retries: 3,
            guard_launchers: false,
            terminate_grace_secs: 2.0,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            entries: PathBuf::from("./data/entries.json"),
            exclusions: PathBuf::from("./data/exclusions.txt"),
            history: PathBuf::from("./logs/history.jsonl"),
            status: PathBuf::from("./data/status.json"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            file_name: "procward-daemon.log".to_string(),
            level: "info".to_string(),
        }
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            watch_interval_secs: 2,
        }
    }
}

impl EngineConfig {
    /// Convert to the engine's runtime settings
    pub fn to_settings(&self) -> EngineSettings {
        EngineSettings {
            polling_interval: secs(self.polling_interval_secs),
            relaunch_delay: secs(self.relaunch_delay_secs),
            max_relaunch_retries: self.max_relaunch_retries,
            kill_delay: secs(self.kill_delay_secs),
            max_killer_retries: self.max_killer_retries,
            guard_launchers: self.guard_launchers,
        }
    }

    pub fn terminate_grace(&self) -> Duration {
        secs(self.terminate_grace_secs)
    }
}

/// Upper bound for delays and the terminate grace period (one day)
pub const MAX_DELAY_SECS: f64 = 86_400.0;

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value.min(MAX_DELAY_SECS)).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Example
    /// ```no_run
    /// use procward_daemon::config::Config;
    ///
    /// let config = Config::load_from_file("/etc/procward/config.toml").unwrap();
    /// println!("Polling interval: {}", config.engine.polling_interval_secs);
    /// ```
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load defaults, then the TOML file if present, then `PROCWARD_*` overrides
    pub fn load_layered(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Save configuration to TOML file
    ///
    /// # Arguments
    /// * `path` - Path where to save the configuration
    pub fn save_to_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// Checks that all intervals and delays are within reasonable ranges
    pub fn validate(&self) -> Result<(), String> {
        let engine = &self.engine;

        if !engine.polling_interval_secs.is_finite()
            || engine.polling_interval_secs < 0.05
            || engine.polling_interval_secs > 3600.0
        {
            return Err(format!(
                "Polling interval must be 0.05-3600 seconds, got: {}",
                engine.polling_interval_secs
            ));
        }

        for (name, value) in [
            ("Relaunch delay", engine.relaunch_delay_secs),
            ("Kill delay", engine.kill_delay_secs),
            ("Terminate grace", engine.terminate_grace_secs),
        ] {
            if !value.is_finite() || !(0.0..=MAX_DELAY_SECS).contains(&value) {
                return Err(format!(
                    "{} must be 0-{} seconds, got: {}",
                    name, MAX_DELAY_SECS, value
                ));
            }
        }

        if self.reload.watch_interval_secs == 0 {
            return Err("Reload watch interval must be > 0".to_string());
        }

        if self.logging.file_name.trim().is_empty() {
            return Err("Log file name must not be empty".to_string());
        }

        if self.paths.entries.as_os_str().is_empty() {
            return Err("Entries path must not be empty".to_string());
        }

        Ok(())
    }

    /// Get full path to the daemon log file
    pub fn log_path(&self) -> PathBuf {
        self.logging.log_dir.join(&self.logging.file_name)
    }
}
