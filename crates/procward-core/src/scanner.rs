use crate::matching::ProcessSnapshot;
use crate::types::ProcessInfo;
use crate::{Error, Result};
use sysinfo::System;
use tracing::debug;

/// Source of process table snapshots
pub trait SnapshotProvider: Send {
    fn snapshot(&mut self) -> Result<ProcessSnapshot>;
}

/// Сканер процессов
///
/// Keeps one `sysinfo::System` alive between snapshots so refreshes only
/// pay for what changed.
pub struct ProcessScanner {
    system: System,
}

impl Default for ProcessScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessScanner {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Refresh and list every running process
    pub fn scan(&mut self) -> Result<Vec<ProcessInfo>> {
        self.system.refresh_processes();

        let processes: Vec<ProcessInfo> = self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| {
                ProcessInfo::new(
                    pid.as_u32(),
                    process.name(),
                    process.exe().map(|p| p.to_path_buf()),
                )
            })
            .collect();

        if processes.is_empty() {
            return Err(Error::Scanner(
                "Process table is empty, refusing to act on it".to_string(),
            ));
        }

        debug!("Scanned {} processes", processes.len());
        Ok(processes)
    }

    /// Processes whose name contains `filter` (case-insensitive)
    pub fn scan_filtered(&mut self, filter: &str) -> Result<Vec<ProcessInfo>> {
        let needle = filter.to_lowercase();
        let mut processes: Vec<ProcessInfo> = self
            .scan()?
            .into_iter()
            .filter(|p| needle.is_empty() || p.name.to_lowercase().contains(&needle))
            .collect();
        processes.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.pid.cmp(&b.pid))
        });
        Ok(processes)
    }
}

impl SnapshotProvider for ProcessScanner {
    fn snapshot(&mut self) -> Result<ProcessSnapshot> {
        Ok(ProcessSnapshot::new(self.scan()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_finds_self() {
        let mut scanner = ProcessScanner::new();
        let processes = scanner.scan().expect("Failed to scan");

        let own = std::process::id();
        assert!(processes.iter().any(|p| p.pid == own));
    }

    #[test]
    fn test_snapshot_not_empty() {
        let mut scanner = ProcessScanner::new();
        let snapshot = scanner.snapshot().expect("Failed to snapshot");
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_scan_filtered_sorted() {
        let mut scanner = ProcessScanner::new();
        let all = scanner.scan_filtered("").expect("Failed to scan");
        let names: Vec<String> = all.iter().map(|p| p.name.to_lowercase()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);

        let none = scanner
            .scan_filtered("no-such-process-name-procward")
            .expect("Failed to scan");
        assert!(none.is_empty());
    }
}
