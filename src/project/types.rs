// Types for project persistence

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::sequencer::arrangement::Arrangement;
use crate::sequencer::tempo::TempoMarker;
use crate::sequencer::timeline::{PPQN, Tick};
use crate::sequencer::transport::{PlayMode, TransportSettings};

/// Project format version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProjectVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn current() -> Self {
        Self::new(1, 0, 0)
    }

    /// Same major version as the running build
    pub fn is_compatible(&self) -> bool {
        self.major == Self::current().major
    }
}

impl std::fmt::Display for ProjectVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Project metadata, stored as manifest.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectMetadata {
    /// Project name
    pub name: String,
    /// Version of the project format
    pub version: ProjectVersion,
    /// Creation timestamp (RFC 3339)
    pub created: String,
    /// Last modification timestamp (RFC 3339)
    pub modified: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProjectMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name: name.into(),
            version: ProjectVersion::current(),
            created: now.clone(),
            modified: now,
            author: None,
            description: None,
        }
    }

    pub fn touch(&mut self) {
        self.modified = chrono::Utc::now().to_rfc3339();
    }
}

/// Transport state worth restoring with the song
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportFile {
    pub bpm: f64,
    pub settings: TransportSettings,
    pub left_tick: Tick,
    pub right_tick: Tick,
    #[serde(default)]
    pub looping: bool,
    #[serde(default)]
    pub play_mode: PlayMode,
}

impl Default for TransportFile {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            settings: TransportSettings::default(),
            left_tick: 0,
            right_tick: PPQN * 16,
            looping: false,
            play_mode: PlayMode::Song,
        }
    }
}

/// Where the song sat in a setlist when it was saved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetlistInfo {
    pub setlist: PathBuf,
    pub song_index: usize,
}

/// Complete project, stored as project.ron
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub metadata: ProjectMetadata,
    pub transport: TransportFile,
    pub arrangement: Arrangement,
    pub tempo_markers: Vec<TempoMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setlist: Option<SetlistInfo>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ProjectMetadata::new(name),
            transport: TransportFile::default(),
            arrangement: Arrangement::new(),
            tempo_markers: vec![TempoMarker::new(0, 120.0)],
            setlist: None,
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new("Untitled")
    }
}
