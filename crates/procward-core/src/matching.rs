//! Snapshot reconciliation
//!
//! Normalises process names and matches entry descriptors against a
//! point-in-time view of the process table.

use crate::types::{EntryDescriptor, ProcessInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

const EXE_SUFFIX: &str = ".exe";

/// Reduce a name or path to the lowercase file name without `.exe`
///
/// Both `/` and `\` are treated as separators regardless of host, so Windows
/// paths normalise the same way everywhere.
pub fn bare_name(input: &str) -> String {
    let trimmed = input.trim().trim_matches('"');
    let file = trimmed
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(trimmed)
        .trim();
    let lower = file.to_lowercase();

    match lower.strip_suffix(EXE_SUFFIX) {
        Some(stem) => stem.trim_end().to_string(),
        None => lower,
    }
}

/// Does the string look like a path rather than a bare name?
pub fn is_full_path(input: &str) -> bool {
    input.contains('\\') || input.contains('/')
}

fn normalize_path(input: &str) -> String {
    input.trim().trim_matches('"').replace('/', "\\").to_lowercase()
}

/// Compare two paths case-insensitively with separators unified
pub fn paths_equal(a: &str, b: &Path) -> bool {
    normalize_path(a) == normalize_path(&b.to_string_lossy())
}

/// Point-in-time process table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub processes: Vec<ProcessInfo>,
    pub taken_at: DateTime<Utc>,
}

impl ProcessSnapshot {
    pub fn new(processes: Vec<ProcessInfo>) -> Self {
        Self {
            processes,
            taken_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Processes matching the descriptor by bare name or by full path
    pub fn find(&self, descriptor: &EntryDescriptor) -> Vec<&ProcessInfo> {
        if descriptor.is_blank() {
            return Vec::new();
        }

        let target = descriptor.target_name();
        let full_path = descriptor.path.trim();
        let by_path = is_full_path(full_path);

        self.processes
            .iter()
            .filter(|p| {
                if !target.is_empty() && p.bare_name() == target {
                    return true;
                }
                by_path
                    && p
                        .path
                        .as_deref()
                        .map(|path| paths_equal(full_path, path))
                        .unwrap_or(false)
            })
            .collect()
    }

    pub fn is_running(&self, descriptor: &EntryDescriptor) -> bool {
        !self.find(descriptor).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn snapshot() -> ProcessSnapshot {
        ProcessSnapshot::new(vec![
            ProcessInfo::new(4, "System", None),
            ProcessInfo::new(
                1200,
                "notepad.exe",
                Some(PathBuf::from(r"C:\Windows\System32\notepad.exe")),
            ),
            ProcessInfo::new(
                3300,
                "App.EXE",
                Some(PathBuf::from(r"C:\Program Files\App\App.exe")),
            ),
        ])
    }

    #[test]
    fn test_bare_name_strips_extension_and_dirs() {
        assert_eq!(bare_name("notepad.exe"), "notepad");
        assert_eq!(bare_name("NOTEPAD.EXE"), "notepad");
        assert_eq!(bare_name(r"C:\Windows\System32\svchost.exe"), "svchost");
        assert_eq!(bare_name("/usr/bin/helper"), "helper");
        assert_eq!(bare_name("  \"Calc.exe\"  "), "calc");
    }

    #[test]
    fn test_bare_name_keeps_other_extensions() {
        assert_eq!(bare_name("script.bat"), "script.bat");
        assert_eq!(bare_name("exe"), "exe");
    }

    #[test]
    fn test_bare_name_empty() {
        assert_eq!(bare_name(""), "");
        assert_eq!(bare_name("   "), "");
    }

    #[test]
    fn test_is_full_path() {
        assert!(is_full_path(r"C:\apps\app.exe"));
        assert!(is_full_path("/opt/app"));
        assert!(!is_full_path("app.exe"));
    }

    #[test]
    fn test_find_by_bare_name_case_insensitive() {
        let snap = snapshot();
        let found = snap.find(&EntryDescriptor::new("notepad", ""));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pid, 1200);

        assert!(snap.is_running(&EntryDescriptor::new("", "APP.exe")));
    }

    #[test]
    fn test_find_by_full_path() {
        let snap = snapshot();
        let desc = EntryDescriptor::new("App", "c:/program files/app/app.exe");
        let found = snap.find(&desc);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pid, 3300);
    }

    #[test]
    fn test_find_blank_descriptor_matches_nothing() {
        let snap = snapshot();
        assert!(snap.find(&EntryDescriptor::default()).is_empty());
    }

    #[test]
    fn test_not_running() {
        let snap = snapshot();
        assert!(!snap.is_running(&EntryDescriptor::new("helper", "helper.exe")));
        assert!(!ProcessSnapshot::empty().is_running(&EntryDescriptor::new("x", "x.exe")));
    }
}
