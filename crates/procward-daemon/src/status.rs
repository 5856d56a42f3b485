//! Status export for the CLI
//!
//! After every tick the daemon rewrites a small JSON document with the
//! engine counters and the state of every tracked target, so `procward
//! status` can show what the supervisor is doing without talking to it.

use procward_core::{EngineStats, EntryId, EntryKind, Phase, Slot, TargetStatus};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Complete status snapshot written by the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Unix timestamp when the snapshot was taken
    pub timestamp: u64,

    /// Daemon runtime in seconds
    pub runtime_secs: u64,

    /// Process id of the daemon that wrote the file
    pub daemon_pid: u32,

    /// Number of processes in the last snapshot
    pub process_count: usize,

    /// Number of protected names currently in effect
    pub protected_names: usize,

    /// Cumulative engine counters
    pub stats: EngineStats,

    /// Per-target runtime state
    pub targets: Vec<TargetRecord>,
}

/// One tracked launcher, companion or killer target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub entry_id: EntryId,
    pub kind: EntryKind,
    /// Companion index, `None` for the entry's primary target
    pub auxiliary: Option<usize>,
    pub target: String,
    pub phase: Phase,
    pub consecutive_failures: u32,
    pub next_eligible_in_secs: Option<f64>,
    pub last_known_pid: Option<u32>,
}

impl From<&TargetStatus> for TargetRecord {
    fn from(status: &TargetStatus) -> Self {
        Self {
            entry_id: status.key.entry_id,
            kind: status.key.kind,
            auxiliary: match status.key.slot {
                Slot::Primary => None,
                Slot::Auxiliary(index) => Some(index),
            },
            target: status.target.clone(),
            phase: status.phase,
            consecutive_failures: status.consecutive_failures,
            next_eligible_in_secs: status.next_eligible_in.map(|d| d.as_secs_f64()),
            last_known_pid: status.last_known_pid,
        }
    }
}

impl EngineStatus {
    pub fn new(
        runtime: Duration,
        process_count: usize,
        protected_names: usize,
        stats: &EngineStats,
        targets: &[TargetStatus],
    ) -> Self {
        Self {
            timestamp: Self::current_timestamp(),
            runtime_secs: runtime.as_secs(),
            daemon_pid: std::process::id(),
            process_count,
            protected_names,
            stats: stats.clone(),
            targets: targets.iter().map(TargetRecord::from).collect(),
        }
    }

    /// Get current timestamp
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    /// Targets that stopped retrying
    pub fn exhausted(&self) -> impl Iterator<Item = &TargetRecord> {
        self.targets
            .iter()
            .filter(|t| t.phase == Phase::RetryExhausted)
    }

    /// Write the snapshot, replacing the previous file atomically
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procward_core::TargetKey;

    fn sample_targets() -> Vec<TargetStatus> {
        let id = EntryId::new();
        vec![
            TargetStatus {
                key: TargetKey::primary(id, EntryKind::Launcher),
                target: "app".to_string(),
                phase: Phase::CoolingDown,
                consecutive_failures: 2,
                next_eligible_in: Some(Duration::from_millis(1500)),
                last_known_pid: None,
            },
            TargetStatus {
                key: TargetKey::auxiliary(id, 0),
                target: "helper".to_string(),
                phase: Phase::RetryExhausted,
                consecutive_failures: 5,
                next_eligible_in: None,
                last_known_pid: Some(42),
            },
        ]
    }

    #[test]
    fn test_target_record_from_status() {
        let targets = sample_targets();
        let status = EngineStatus::new(
            Duration::from_secs(90),
            120,
            16,
            &EngineStats::default(),
            &targets,
        );

        assert_eq!(status.runtime_secs, 90);
        assert_eq!(status.targets.len(), 2);
        assert_eq!(status.targets[0].auxiliary, None);
        assert_eq!(status.targets[0].next_eligible_in_secs, Some(1.5));
        assert_eq!(status.targets[1].auxiliary, Some(0));
        assert_eq!(status.targets[1].kind, EntryKind::Launcher);
        assert_eq!(status.exhausted().count(), 1);
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("status.json");

        let mut stats = EngineStats::default();
        stats.record_tick(1_700_000_000);
        stats.record_launch();

        let status = EngineStatus::new(Duration::from_secs(5), 3, 15, &stats, &sample_targets());
        status.write_to(&path).unwrap();

        let loaded = EngineStatus::read_from(&path).unwrap();
        assert_eq!(loaded, status);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_read_missing_is_error() {
        assert!(EngineStatus::read_from(Path::new("/definitely/not/here/status.json")).is_err());
    }
}
