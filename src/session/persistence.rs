// ABOUTME: Snapshot persistence — save and load every session's retained turns as one JSON file.
// ABOUTME: Writes are atomic (tmp + rename) so readers never observe a partial file.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::session::turn::Turn;

/// All sessions as persisted on disk: session key -> ordered `{role, content}` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub sessions: BTreeMap<String, Vec<Turn>>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Load a snapshot from disk, if it exists.
pub fn load_snapshot_from(path: &Path) -> anyhow::Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let snapshot: Snapshot = serde_json::from_str(&content)?;
    Ok(Some(snapshot))
}

/// Save a snapshot to disk (atomic write via tmp + rename).
pub fn save_snapshot_to(path: &Path, snapshot: &Snapshot) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(&tmp_path, &content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> Snapshot {
        let mut sessions = BTreeMap::new();
        sessions.insert(
            "default".to_string(),
            vec![Turn::user("hello"), Turn::assistant("Hi!")],
        );
        sessions.insert(
            "tab-7".to_string(),
            vec![Turn::user("what's up"), Turn::assistant("the stars")],
        );
        Snapshot { sessions }
    }

    #[test]
    fn snapshot_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data").join("sessions.json");

        let original = sample_snapshot();
        save_snapshot_to(&path, &original).unwrap();

        let loaded = load_snapshot_from(&path).unwrap();
        assert_eq!(loaded, Some(original));
    }

    #[test]
    fn file_layout_is_key_to_role_content_list() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.json");
        save_snapshot_to(&path, &sample_snapshot()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["default"][0]["role"], "user");
        assert_eq!(raw["default"][1]["content"], "Hi!");
        assert!(raw["default"][0].get("image").is_none());
    }

    #[test]
    fn load_nonexistent_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope").join("sessions.json");
        assert!(load_snapshot_from(&missing).unwrap().is_none());
    }

    #[test]
    fn load_corrupt_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_snapshot_from(&path).is_err());
    }

    #[test]
    fn save_is_atomic() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.json");
        save_snapshot_to(&path, &sample_snapshot()).unwrap();

        assert!(path.exists());
        assert!(
            !path.with_extension("json.tmp").exists(),
            "tmp file should not survive a successful save"
        );
    }

    #[test]
    fn save_overwrites_existing_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.json");

        let mut snapshot = sample_snapshot();
        save_snapshot_to(&path, &snapshot).unwrap();

        snapshot.sessions.remove("tab-7");
        save_snapshot_to(&path, &snapshot).unwrap();

        let loaded = load_snapshot_from(&path).unwrap().unwrap();
        assert_eq!(loaded.sessions.len(), 1);
        assert!(loaded.sessions.contains_key("default"));
    }
}
