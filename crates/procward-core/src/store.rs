//! Loading of persisted entry data
//!
//! Any problem with the entry document degrades to an empty or partial set
//! with a warning; the engine must keep running on whatever could be read.

use crate::types::{SaveDataSet, SCHEMA_VERSION};
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Parse an entry document strictly
pub fn parse_save_data(content: &str) -> Result<SaveDataSet> {
    let data: SaveDataSet = serde_json::from_str(content)?;
    if data.schema_version > SCHEMA_VERSION {
        warn!(
            "Entry document schema version {} is newer than supported {}, reading best-effort",
            data.schema_version, SCHEMA_VERSION
        );
    }
    Ok(sanitize(data))
}

/// Read an entry document, propagating errors
pub fn read_save_data(path: &Path) -> Result<SaveDataSet> {
    let content = std::fs::read_to_string(path)?;
    parse_save_data(&content)
        .map_err(|e| Error::Store(format!("Failed to parse {:?}: {}", path, e)))
}

/// Read an entry document, falling back to an empty set
pub fn load_save_data(path: &Path) -> SaveDataSet {
    match read_save_data(path) {
        Ok(data) => {
            info!(
                "Loaded {} launchers and {} killers from {:?}",
                data.launchers.len(),
                data.killers.len(),
                path
            );
            data
        }
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("Entry file {:?} not found, starting with no entries", path);
            SaveDataSet::default()
        }
        Err(e) => {
            warn!("{}, starting with no entries", e);
            SaveDataSet::default()
        }
    }
}

/// Write an entry document as pretty JSON
pub fn save_data(path: &Path, data: &SaveDataSet) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(data)?;
    std::fs::write(path, content)?;
    Ok(())
}

// Drop blank entries and later duplicates of an id
fn sanitize(mut data: SaveDataSet) -> SaveDataSet {
    let mut ids = HashSet::new();

    data.launchers.retain(|entry| {
        if entry.primary.is_blank() {
            warn!("Dropping launcher entry {} with no name or path", entry.id);
            return false;
        }
        if !ids.insert(entry.id) {
            warn!("Dropping launcher entry with duplicate id {}", entry.id);
            return false;
        }
        true
    });

    data.killers.retain(|entry| {
        if entry.primary.is_blank() {
            warn!("Dropping killer entry {} with no name or path", entry.id);
            return false;
        }
        if !ids.insert(entry.id) {
            warn!("Dropping killer entry with duplicate id {}", entry.id);
            return false;
        }
        true
    });

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryDescriptor, KillerEntry, LaunchMode, LauncherEntry};

    const DOC: &str = r#"{
        "schema_version": 1,
        "launchers": [
            {
                "id": "6f1c1b9e-3f57-4c4e-9a59-2b1b3f7c0d11",
                "mode": "detect",
                "primary": { "name": "App", "path": "C:\\apps\\app.exe" },
                "auxiliaries": [{ "name": "Helper", "path": "helper.exe" }]
            },
            {
                "id": "6f1c1b9e-3f57-4c4e-9a59-2b1b3f7c0d11",
                "primary": { "name": "Dup", "path": "dup.exe" }
            },
            {
                "id": "9b0f5a43-1f1e-4d2a-8a5c-7c7d3c1e2f00",
                "primary": { "name": "", "path": "  " }
            }
        ],
        "killers": [
            { "id": "0d7d8a43-2a0c-4d39-8f0e-a1b5b9b6c2e0", "primary": { "name": "notepad" } }
        ]
    }"#;

    #[test]
    fn test_parse_sanitizes() {
        let data = parse_save_data(DOC).unwrap();
        assert_eq!(data.launchers.len(), 1);
        assert_eq!(data.launchers[0].primary.name, "App");
        assert_eq!(data.launchers[0].mode, LaunchMode::Detect);
        assert_eq!(data.killers.len(), 1);
    }

    #[test]
    fn test_parse_malformed_is_error() {
        assert!(parse_save_data("{ not json").is_err());
        assert!(parse_save_data(r#"{"launchers": []}"#).is_err());
    }

    #[test]
    fn test_newer_schema_read_best_effort() {
        let data = parse_save_data(r#"{"schema_version": 99, "killers": []}"#).unwrap();
        assert_eq!(data.schema_version, 99);
        assert!(data.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let data = load_save_data(Path::new("/definitely/not/here/entries.json"));
        assert!(data.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.json");
        std::fs::write(&path, "garbage").unwrap();

        assert!(load_save_data(&path).is_empty());
        assert!(matches!(read_save_data(&path), Err(Error::Store(_))));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("entries.json");

        let mut data = SaveDataSet::default();
        data.launchers.push(
            LauncherEntry::new(EntryDescriptor::new("App", r"C:\apps\app.exe"))
                .with_auxiliary(EntryDescriptor::new("Helper", "helper.exe")),
        );
        data.killers
            .push(KillerEntry::new(EntryDescriptor::new("notepad", "")));

        save_data(&path, &data).unwrap();
        assert_eq!(load_save_data(&path), data);
    }
}
