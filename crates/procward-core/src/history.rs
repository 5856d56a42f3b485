//! Observability feed
//!
//! The engine reports a narrow stream of [`EngineEvent`]s to a
//! [`HistorySink`]. Sinks must not fail the caller; write errors are logged
//! and dropped.

use crate::types::{EntryId, EntryKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Target needs correction
    Detected,
    ActionStarted,
    ActionSucceeded,
    ActionFailed,
    /// Retry ceiling reached; no more attempts until the condition clears
    RetriesExhausted,
    /// Condition cleared after failures or exhaustion
    Recovered,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Detected => "detected",
            EventType::ActionStarted => "action_started",
            EventType::ActionSucceeded => "action_succeeded",
            EventType::ActionFailed => "action_failed",
            EventType::RetriesExhausted => "retries_exhausted",
            EventType::Recovered => "recovered",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub timestamp: DateTime<Utc>,
    pub entry_id: EntryId,
    pub entry_kind: EntryKind,
    /// Bare name of the process the event concerns
    pub target: String,
    pub event_type: EventType,
    pub detail: String,
}

impl EngineEvent {
    pub fn new(
        entry_id: EntryId,
        entry_kind: EntryKind,
        target: &str,
        event_type: EventType,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            entry_id,
            entry_kind,
            target: target.to_string(),
            event_type,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} ({}): {}",
            self.event_type, self.entry_kind, self.target, self.entry_id, self.detail
        )
    }
}

/// Consumer of engine events
pub trait HistorySink: Send + Sync {
    fn record(&self, event: &EngineEvent);
}

/// Writes every event to the tracing log
#[derive(Debug, Default)]
pub struct TracingSink;

impl HistorySink for TracingSink {
    fn record(&self, event: &EngineEvent) {
        match event.event_type {
            EventType::ActionFailed => warn!("{}", event),
            EventType::RetriesExhausted => error!("{}", event),
            _ => info!("{}", event),
        }
    }
}

/// Appends events as JSON lines
#[derive(Debug)]
pub struct JsonlHistory {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlHistory {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }

    fn write_line(&self, event: &EngineEvent) -> crate::Result<()> {
        let line = serde_json::to_string(event)?;
        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if guard.is_none() {
            *guard = Some(self.open()?);
        }

        let written = match guard.as_mut() {
            Some(file) => writeln!(file, "{}", line),
            None => Ok(()),
        };

        if let Err(e) = written {
            // Reopen on the next event
            *guard = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Read back a history file, skipping lines that do not parse
    pub fn read_all(path: &Path) -> crate::Result<Vec<EngineEvent>> {
        let content = std::fs::read_to_string(path)?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl HistorySink for JsonlHistory {
    fn record(&self, event: &EngineEvent) {
        if let Err(e) = self.write_line(event) {
            warn!("Failed to append history to {:?}: {}", self.path, e);
        }
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn take(&self) -> Vec<EngineEvent> {
        match self.events.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl HistorySink for RecordingSink {
    fn record(&self, event: &EngineEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Forwards every event to several sinks
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn HistorySink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl HistorySink for FanoutSink {
    fn record(&self, event: &EngineEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}
