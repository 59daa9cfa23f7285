// Engine configuration - Tunables loaded from <config_dir>/perfseq/config.ron

use crate::command::DEFAULT_MAX_HISTORY;
use crate::project::recent::DEFAULT_RECENT_CAPACITY;
use crate::sequencer::timeline::{PPQN, Tempo, Tick};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Every field falls back to its default when missing from the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Start tempo of a new song
    pub default_bpm: f64,
    /// Undo entries kept per stack
    pub max_history: usize,
    pub recent_capacity: usize,
    /// Internal driver period in milliseconds
    pub driver_period_ms: u64,
    /// Ticks moved by one unaccelerated fast-seek step
    pub fast_seek_step: Tick,
    pub fast_seek_growth: f64,
    pub fast_seek_cap: f64,
    /// Idle time after which tap tempo starts over
    pub tap_reset_ms: u64,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_bpm: 120.0,
            max_history: DEFAULT_MAX_HISTORY,
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            driver_period_ms: 5,
            fast_seek_step: PPQN / 4,
            fast_seek_growth: 1.1,
            fast_seek_cap: 60.0,
            tap_reset_ms: 5000,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// `<config_dir>/perfseq/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("perfseq").join("config.ron"))
    }

    /// Load from the default location
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// A missing file yields defaults; a malformed one is reported and ignored
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                log::warn!("Failed to read config {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match ron::from_str::<EngineConfig>(&contents) {
            Ok(config) => config.sanitized(),
            Err(e) => {
                log::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn sanitized(mut self) -> Self {
        self.default_bpm = Tempo::clamped(self.default_bpm).bpm();
        self.max_history = self.max_history.max(1);
        self.recent_capacity = self.recent_capacity.max(1);
        self.driver_period_ms = self.driver_period_ms.clamp(1, 100);
        if !(self.fast_seek_growth >= 1.0) {
            self.fast_seek_growth = 1.1;
        }
        if !(self.fast_seek_cap >= 1.0) {
            self.fast_seek_cap = 60.0;
        }
        self.event_capacity = self.event_capacity.max(16);
        self
    }

    pub fn driver_period(&self) -> Duration {
        Duration::from_millis(self.driver_period_ms)
    }

    pub fn tap_reset(&self) -> Duration {
        Duration::from_millis(self.tap_reset_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("config.ron"));
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_history, DEFAULT_MAX_HISTORY);
        assert_eq!(config.recent_capacity, DEFAULT_RECENT_CAPACITY);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(default_bpm: 95.0, max_history: 20)").unwrap();

        let config = EngineConfig::load_from(&path);
        assert_eq!(config.default_bpm, 95.0);
        assert_eq!(config.max_history, 20);
        assert_eq!(config.tap_reset_ms, 5000);
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(default_bpm: \"fast\"").unwrap();
        assert_eq!(EngineConfig::load_from(&path), EngineConfig::default());
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(default_bpm: 5000.0, driver_period_ms: 0)").unwrap();

        let config = EngineConfig::load_from(&path);
        assert_eq!(config.default_bpm, 600.0);
        assert_eq!(config.driver_period_ms, 1);
    }
}
