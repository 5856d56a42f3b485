//! Hot reload of configuration, entries and exclusions
//!
//! A background task polls file modification times and publishes fresh
//! values through `tokio::sync::watch` channels. The enforcement loop picks
//! them up at the start of its next tick, so a tick always runs against one
//! consistent set of inputs.

use crate::config::Config;
use procward_core::store;
use procward_core::{EngineSettings, ExclusionPolicy, SaveDataSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Remembers the last seen modification time of one file
#[derive(Debug, Clone)]
pub struct FileStamp {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            modified: modified_time(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the file appeared, disappeared or was modified since last check
    pub fn changed(&mut self) -> bool {
        let current = modified_time(&self.path);
        if current != self.modified {
            self.modified = current;
            true
        } else {
            false
        }
    }

    /// Point at another file
    pub fn retarget(&mut self, path: &Path) {
        self.path = path.to_path_buf();
        self.modified = modified_time(path);
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// What one poll found and published
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub config: bool,
    pub entries: bool,
    pub exclusions: bool,
}

impl ReloadOutcome {
    pub fn any(&self) -> bool {
        self.config || self.entries || self.exclusions
    }
}

/// Receiving ends handed to the enforcement loop
#[derive(Debug, Clone)]
pub struct ReloadHandles {
    pub entries: watch::Receiver<Arc<SaveDataSet>>,
    pub settings: watch::Receiver<EngineSettings>,
}

pub struct Reloader {
    config_path: Option<PathBuf>,
    config: Config,
    config_stamp: Option<FileStamp>,
    entries_stamp: FileStamp,
    exclusions_stamp: FileStamp,
    entries_tx: watch::Sender<Arc<SaveDataSet>>,
    settings_tx: watch::Sender<EngineSettings>,
    exclusions: Arc<ExclusionPolicy>,
}

impl Reloader {
    /// Load the initial entries and exclusions and set up the channels
    ///
    /// `config_path` is `None` when running on defaults with no file to watch.
    pub fn new(
        config_path: Option<&Path>,
        config: Config,
        exclusions: Arc<ExclusionPolicy>,
    ) -> (Self, ReloadHandles) {
        let entries = store::load_save_data(&config.paths.entries);
        let count = exclusions.reload_from_file(&config.paths.exclusions);
        debug!("{} protected names in effect", count);

        let (entries_tx, entries_rx) = watch::channel(Arc::new(entries));
        let (settings_tx, settings_rx) = watch::channel(config.engine.to_settings());

        let reloader = Self {
            config_path: config_path.map(Path::to_path_buf),
            config_stamp: config_path.map(FileStamp::new),
            entries_stamp: FileStamp::new(&config.paths.entries),
            exclusions_stamp: FileStamp::new(&config.paths.exclusions),
            config,
            entries_tx,
            settings_tx,
            exclusions,
        };

        let handles = ReloadHandles {
            entries: entries_rx,
            settings: settings_rx,
        };

        (reloader, handles)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check every watched file once and publish whatever changed
    pub fn poll(&mut self) -> ReloadOutcome {
        let mut outcome = ReloadOutcome::default();

        let config_changed = self
            .config_stamp
            .as_mut()
            .map(FileStamp::changed)
            .unwrap_or(false);
        if config_changed {
            if let Some(path) = self.config_path.clone() {
                match Config::load_layered(&path) {
                    Ok(config) => match config.validate() {
                        Ok(()) => outcome.config = self.apply_config(config),
                        Err(e) => warn!("Ignoring reloaded configuration: {}", e),
                    },
                    Err(e) => warn!("Failed to reload configuration {:?}: {}", path, e),
                }
            }
        }

        if self.entries_stamp.changed() {
            let entries = store::load_save_data(self.entries_stamp.path());
            self.entries_tx.send_replace(Arc::new(entries));
            outcome.entries = true;
        }

        if self.exclusions_stamp.changed() {
            let count = self
                .exclusions
                .reload_from_file(self.exclusions_stamp.path());
            info!("Exclusions reloaded, {} protected names", count);
            outcome.exclusions = true;
        }

        outcome
    }

    // Returns true when anything the loop consumes was republished
    fn apply_config(&mut self, config: Config) -> bool {
        let mut changed = false;

        if config.engine != self.config.engine {
            info!("Engine settings reloaded");
            self.settings_tx.send_replace(config.engine.to_settings());
            changed = true;
        }

        if config.paths.entries != self.config.paths.entries {
            info!("Entries path changed to {:?}", config.paths.entries);
            self.entries_stamp.retarget(&config.paths.entries);
            let entries = store::load_save_data(&config.paths.entries);
            self.entries_tx.send_replace(Arc::new(entries));
            changed = true;
        }

        if config.paths.exclusions != self.config.paths.exclusions {
            info!("Exclusions path changed to {:?}", config.paths.exclusions);
            self.exclusions_stamp.retarget(&config.paths.exclusions);
            self.exclusions.reload_from_file(&config.paths.exclusions);
            changed = true;
        }

        if config.logging != self.config.logging || config.paths.history != self.config.paths.history
        {
            warn!("Logging and history path changes take effect after restart");
        }

        self.config = config;
        changed
    }

    /// Poll until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        let interval = Duration::from_secs(self.config.reload.watch_interval_secs.max(1));
        info!("Watching for file changes every {:?}", interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Reload watcher stopped");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    let outcome = self.poll();
                    if outcome.any() {
                        debug!("Reload outcome: {:?}", outcome);
                    }
                }
            }
        }
    }
}
