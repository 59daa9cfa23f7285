// Recent files - Most-recently-opened native project files
// Persisted as JSON in the user's config directory

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_RECENT_CAPACITY: usize = 10;

const RECENT_FILE: &str = "recent.json";

/// Bounded, de-duplicated list, most recent first
#[derive(Debug, Clone, PartialEq)]
pub struct RecentFiles {
    entries: Vec<PathBuf>,
    capacity: usize,
    storage_path: Option<PathBuf>,
}

impl RecentFiles {
    /// Empty list that is never written to disk
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
            storage_path: None,
        }
    }

    /// Load from `<config_dir>/perfseq/recent.json`
    pub fn load(capacity: usize) -> Self {
        match default_storage_path() {
            Some(path) => Self::load_from(&path, capacity),
            None => Self::in_memory(capacity),
        }
    }

    /// Load from a specific file; a missing or corrupt file starts empty
    pub fn load_from(path: &Path, capacity: usize) -> Self {
        let mut recent = Self::in_memory(capacity);
        recent.storage_path = Some(path.to_path_buf());

        match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<StoredRecent>(&json) {
                Ok(stored) => {
                    for entry in stored.files.into_iter().rev() {
                        recent.push_front(entry);
                    }
                    log::debug!("Loaded {} recent files", recent.entries.len());
                }
                Err(e) => log::warn!("Failed to parse recent files list, starting fresh: {}", e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to read recent files list: {}", e),
        }
        recent
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move `path` to the front and persist the list
    pub fn add(&mut self, path: &Path) {
        self.push_front(path.to_path_buf());
        self.save();
    }

    pub fn remove(&mut self, path: &Path) {
        self.entries.retain(|e| e != path);
        self.save();
    }

    fn push_front(&mut self, path: PathBuf) {
        self.entries.retain(|e| *e != path);
        self.entries.insert(0, path);
        self.entries.truncate(self.capacity);
    }

    fn save(&self) {
        let Some(path) = &self.storage_path else {
            return;
        };
        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            log::warn!("Failed to create config directory: {}", e);
            return;
        }
        let stored = StoredRecent {
            files: self.entries.clone(),
        };
        match serde_json::to_string_pretty(&stored) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write recent files list: {}", e);
                }
            }
            Err(e) => log::warn!("Failed to serialize recent files list: {}", e),
        }
    }
}

impl Default for RecentFiles {
    fn default() -> Self {
        Self::in_memory(DEFAULT_RECENT_CAPACITY)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredRecent {
    files: Vec<PathBuf>,
}

fn default_storage_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("perfseq").join(RECENT_FILE))
}
