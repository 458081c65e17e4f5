//! services/api/src/adapters/storage.rs
//!
//! A file-backed implementation of the `StateStore` port. Stands in for the
//! browser's localStorage: one JSON object mapping keys to string values,
//! rewritten in full on every `set`.

use chatrelay_core::ports::{PortError, PortResult, StateStore};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_map(&self) -> HashMap<String, String> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(err) => {
                warn!(path = %self.path.display(), "ignoring malformed state file: {err}");
                HashMap::new()
            }
        }
    }
}

impl StateStore for FileStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_map().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        let serialized = serde_json::to_string_pretty(&map)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PortError::Unexpected(e.to_string()))?;
            }
        }
        fs::write(&self.path, serialized).map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("chatrelay-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn set_then_get_round_trips() {
        let path = temp_path("roundtrip");
        let store = FileStateStore::new(path.clone());
        store.set("chat-sessions", "[]").unwrap();
        assert_eq!(store.get("chat-sessions").as_deref(), Some("[]"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_file_reads_as_absent() {
        let store = FileStateStore::new(temp_path("absent"));
        assert_eq!(store.get("chat-sessions"), None);
    }

    #[test]
    fn malformed_file_reads_as_absent() {
        let path = temp_path("malformed");
        fs::write(&path, "{{{not json").unwrap();
        let store = FileStateStore::new(path.clone());
        assert_eq!(store.get("chat-sessions"), None);
        let _ = fs::remove_file(path);
    }
}
