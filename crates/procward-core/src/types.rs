use crate::matching::bare_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Current version of the persisted entry document
pub const SCHEMA_VERSION: u32 = 1;

/// Stable entry identifier, assigned once at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Launcher,
    Killer,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Launcher => write!(f, "launcher"),
            EntryKind::Killer => write!(f, "killer"),
        }
    }
}

/// One executable a launcher or killer entry refers to
///
/// `path` is either a bare executable name (matched against running process
/// names) or a full path (also used to launch). `name` is the user label and
/// the fallback match key when `path` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryDescriptor {
    pub name: String,
    pub path: String,
    pub arguments: String,
    pub enabled: bool,
    pub aux_enabled: bool,
    pub run_as_admin: bool,
    pub working_dir: Option<PathBuf>,
}

impl Default for EntryDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: String::new(),
            arguments: String::new(),
            enabled: true,
            aux_enabled: true,
            run_as_admin: false,
            working_dir: None,
        }
    }
}

impl EntryDescriptor {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            ..Self::default()
        }
    }

    pub fn with_arguments(mut self, arguments: &str) -> Self {
        self.arguments = arguments.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    // Name and path both empty: nothing to match or launch
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty() && self.path.trim().is_empty()
    }

    /// Normalised process name used for matching and exclusion lookups
    pub fn target_name(&self) -> String {
        if self.path.trim().is_empty() {
            bare_name(&self.name)
        } else {
            bare_name(&self.path)
        }
    }

    /// What to hand to the OS when launching
    pub fn launch_target(&self) -> &str {
        if self.path.trim().is_empty() {
            self.name.trim()
        } else {
            self.path.trim()
        }
    }

    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            self.path.trim()
        } else {
            self.name.trim()
        }
    }

    /// Companion descriptors are active only with both switches on
    pub fn is_active_companion(&self) -> bool {
        self.enabled && self.aux_enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    /// Keep the primary running; start companions once it is up
    #[default]
    Launch,
    /// Never start the primary; start companions whenever it is seen running
    Detect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherEntry {
    pub id: EntryId,
    #[serde(default)]
    pub mode: LaunchMode,
    pub primary: EntryDescriptor,
    #[serde(default)]
    pub auxiliaries: Vec<EntryDescriptor>,
}

impl LauncherEntry {
    pub fn new(primary: EntryDescriptor) -> Self {
        Self {
            id: EntryId::new(),
            mode: LaunchMode::Launch,
            primary,
            auxiliaries: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: LaunchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_auxiliary(mut self, auxiliary: EntryDescriptor) -> Self {
        self.auxiliaries.push(auxiliary);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillerEntry {
    pub id: EntryId,
    pub primary: EntryDescriptor,
}

impl KillerEntry {
    pub fn new(primary: EntryDescriptor) -> Self {
        Self {
            id: EntryId::new(),
            primary,
        }
    }
}

/// Persisted launcher and killer lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveDataSet {
    pub schema_version: u32,
    #[serde(default)]
    pub launchers: Vec<LauncherEntry>,
    #[serde(default)]
    pub killers: Vec<KillerEntry>,
}

impl Default for SaveDataSet {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            launchers: Vec::new(),
            killers: Vec::new(),
        }
    }
}

impl SaveDataSet {
    pub fn is_empty(&self) -> bool {
        self.launchers.is_empty() && self.killers.is_empty()
    }

    pub fn enabled_launchers(&self) -> impl Iterator<Item = &LauncherEntry> {
        self.launchers.iter().filter(|e| e.primary.enabled)
    }

    pub fn enabled_killers(&self) -> impl Iterator<Item = &KillerEntry> {
        self.killers.iter().filter(|e| e.primary.enabled)
    }
}

/// Информация о процессе
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub path: Option<PathBuf>,
}

impl ProcessInfo {
    pub fn new(pid: u32, name: &str, path: Option<PathBuf>) -> Self {
        Self {
            pid,
            name: name.to_string(),
            path,
        }
    }

    pub fn bare_name(&self) -> String {
        bare_name(&self.name)
    }
}

/// Engine counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub total_ticks: u64,
    pub total_detections: u64,
    pub total_launches: u64,
    pub total_terminations: u64,
    pub total_failures: u64,
    pub total_exhausted: u64,
    pub last_tick_timestamp: i64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&mut self, timestamp: i64) {
        self.last_tick_timestamp = timestamp;
        self.total_ticks += 1;
    }

    pub fn record_detection(&mut self) {
        self.total_detections += 1;
    }

    pub fn record_launch(&mut self) {
        self.total_launches += 1;
    }

    pub fn record_termination(&mut self) {
        self.total_terminations += 1;
    }

    pub fn record_failure(&mut self) {
        self.total_failures += 1;
    }

    pub fn record_exhausted(&mut self) {
        self.total_exhausted += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== EntryDescriptor Tests =====

    #[test]
    fn test_descriptor_defaults_enabled() {
        let desc = EntryDescriptor::default();
        assert!(desc.enabled);
        assert!(desc.aux_enabled);
        assert!(!desc.run_as_admin);
        assert!(desc.is_blank());
    }

    #[test]
    fn test_target_name_prefers_path() {
        let desc = EntryDescriptor::new("My Editor", r"C:\Tools\Editor.EXE");
        assert_eq!(desc.target_name(), "editor");
        assert_eq!(desc.launch_target(), r"C:\Tools\Editor.EXE");
        assert_eq!(desc.label(), "My Editor");
    }

    #[test]
    fn test_target_name_falls_back_to_name() {
        let desc = EntryDescriptor::new("notepad", "");
        assert_eq!(desc.target_name(), "notepad");
        assert_eq!(desc.launch_target(), "notepad");
        assert!(!desc.is_blank());
    }

    #[test]
    fn test_active_companion_needs_both_flags() {
        let mut desc = EntryDescriptor::new("helper", "helper.exe");
        assert!(desc.is_active_companion());

        desc.aux_enabled = false;
        assert!(!desc.is_active_companion());

        desc.aux_enabled = true;
        desc.enabled = false;
        assert!(!desc.is_active_companion());
    }

    // ===== Entry Tests =====

    #[test]
    fn test_entry_ids_are_unique() {
        let a = LauncherEntry::new(EntryDescriptor::new("a", "a.exe"));
        let b = LauncherEntry::new(EntryDescriptor::new("a", "a.exe"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_enabled_filters() {
        let mut data = SaveDataSet::default();
        data.launchers
            .push(LauncherEntry::new(EntryDescriptor::new("a", "a.exe")));
        data.launchers
            .push(LauncherEntry::new(EntryDescriptor::new("b", "b.exe").disabled()));
        data.killers
            .push(KillerEntry::new(EntryDescriptor::new("c", "c.exe").disabled()));

        assert_eq!(data.enabled_launchers().count(), 1);
        assert_eq!(data.enabled_killers().count(), 0);
        assert!(!data.is_empty());
    }

    #[test]
    fn test_save_data_deserialization_with_defaults() {
        let json = r#"{
            "schema_version": 1,
            "launchers": [{
                "id": "6f1c1b9e-3f57-4c4e-9a59-2b1b3f7c0d11",
                "primary": { "name": "App", "path": "C:\\apps\\app.exe" },
                "auxiliaries": [{ "name": "Helper", "path": "helper.exe", "arguments": "--quiet" }]
            }],
            "killers": [{
                "id": "0d7d8a43-2a0c-4d39-8f0e-a1b5b9b6c2e0",
                "primary": { "name": "notepad" }
            }]
        }"#;

        let data: SaveDataSet = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(data.launchers.len(), 1);
        assert_eq!(data.launchers[0].mode, LaunchMode::Launch);
        assert!(data.launchers[0].primary.enabled);
        assert_eq!(data.launchers[0].auxiliaries[0].arguments, "--quiet");
        assert_eq!(data.killers[0].primary.target_name(), "notepad");
    }

    #[test]
    fn test_launch_mode_serialization() {
        let entry = LauncherEntry::new(EntryDescriptor::new("a", "a.exe"))
            .with_mode(LaunchMode::Detect);
        let json = serde_json::to_string(&entry).expect("Failed to serialize");
        assert!(json.contains("\"mode\":\"detect\""));
    }

    // ===== ProcessInfo Tests =====

    #[test]
    fn test_process_info_bare_name() {
        let proc = ProcessInfo::new(42, "Notepad.exe", None);
        assert_eq!(proc.bare_name(), "notepad");
    }

    // ===== EngineStats Tests =====

    #[test]
    fn test_engine_stats_creation() {
        let stats = EngineStats::new();
        assert_eq!(stats.total_ticks, 0);
        assert_eq!(stats.total_launches, 0);
        assert_eq!(stats.total_terminations, 0);
        assert_eq!(stats.last_tick_timestamp, 0);
    }

    #[test]
    fn test_record_tick() {
        let mut stats = EngineStats::new();

        stats.record_tick(1000);
        assert_eq!(stats.last_tick_timestamp, 1000);
        assert_eq!(stats.total_ticks, 1);

        stats.record_tick(2000);
        assert_eq!(stats.last_tick_timestamp, 2000);
        assert_eq!(stats.total_ticks, 2);
    }

    #[test]
    fn test_stats_workflow() {
        let mut stats = EngineStats::new();

        stats.record_detection();
        stats.record_failure();
        stats.record_failure();
        stats.record_exhausted();
        stats.record_launch();
        stats.record_termination();

        assert_eq!(stats.total_detections, 1);
        assert_eq!(stats.total_failures, 2);
        assert_eq!(stats.total_exhausted, 1);
        assert_eq!(stats.total_launches, 1);
        assert_eq!(stats.total_terminations, 1);
    }

    #[test]
    fn test_engine_stats_serialization() {
        let mut stats = EngineStats::new();
        stats.record_tick(1000);

        let json = serde_json::to_string(&stats).expect("Failed to serialize");
        assert!(json.contains("\"total_ticks\":1"));

        let deserialized: EngineStats =
            serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(deserialized, stats);
    }
}
