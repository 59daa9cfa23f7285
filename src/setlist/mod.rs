// Setlist - Ordered list of song files played as one live set
//
// The sequencer only tracks position and mode. Loading a song is delegated
// to a caller-supplied loader so the engine can stop the transport and swap
// the whole performance atomically.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetlistError {
    #[error("Cannot read setlist {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Setlist is empty")]
    Empty,

    #[error("Setlist mode is not active")]
    NotActive,

    #[error("Song {} missing: {}", .index + 1, .path.display())]
    EntryMissing { index: usize, path: PathBuf },

    #[error("Song {} failed to load ({}): {reason}", .index + 1, .path.display())]
    EntryFailed {
        index: usize,
        path: PathBuf,
        reason: String,
    },
}

impl SetlistError {
    /// Index of the entry that failed, if any
    pub fn failed_index(&self) -> Option<usize> {
        match self {
            SetlistError::EntryMissing { index, .. } | SetlistError::EntryFailed { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetlistEntry {
    pub path: PathBuf,
}

/// Result of a successful jump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpOutcome {
    /// The entry at this index is now loaded
    Loaded(usize),
    /// The step would leave the list; nothing changed
    Boundary,
}

/// Setlist traversal state
///
/// `current_index` always points into `entries` while the list is non-empty.
#[derive(Debug, Clone, Default)]
pub struct SetlistSequencer {
    entries: Vec<SetlistEntry>,
    current_index: usize,
    mode_enabled: bool,
    source: Option<PathBuf>,
}

impl SetlistSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse setlist text: one path per line, `#` comments and blank lines
    /// skipped, relative paths resolved against `base_dir`
    pub fn parse(text: &str, base_dir: &Path) -> Vec<SetlistEntry> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                let path = Path::new(line);
                let path = if path.is_relative() {
                    base_dir.join(path)
                } else {
                    path.to_path_buf()
                };
                SetlistEntry { path }
            })
            .collect()
    }

    /// Read a setlist file and enable setlist mode on it
    pub fn load_file(&mut self, path: &Path) -> Result<usize, SetlistError> {
        let text = fs::read_to_string(path).map_err(|source| SetlistError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let entries = Self::parse(&text, base_dir);
        self.enable(entries)?;
        self.source = Some(path.to_path_buf());
        log::info!(
            "Setlist {} loaded with {} songs",
            path.display(),
            self.entries.len()
        );
        Ok(self.entries.len())
    }

    /// Enable setlist mode on a list of entries, positioned at the first one
    pub fn enable(&mut self, entries: Vec<SetlistEntry>) -> Result<(), SetlistError> {
        if entries.is_empty() {
            self.disable();
            return Err(SetlistError::Empty);
        }
        self.entries = entries;
        self.current_index = 0;
        self.mode_enabled = true;
        self.source = None;
        Ok(())
    }

    pub fn disable(&mut self) {
        if self.mode_enabled {
            log::info!("Setlist mode disabled");
        }
        self.mode_enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.mode_enabled
    }

    pub fn entries(&self) -> &[SetlistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> Option<&SetlistEntry> {
        self.entries.get(self.current_index)
    }

    /// File the setlist was read from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Step by `delta` (-1, 0 or +1) and load that entry, or with `verify`
    /// load every entry from the first and finish positioned on entry 0
    ///
    /// Any load failure disables setlist mode and is returned; the caller
    /// decides what to fall back to. Stepping off either end is not an error.
    pub fn jump<E, F>(
        &mut self,
        delta: i32,
        verify: bool,
        mut loader: F,
    ) -> Result<JumpOutcome, SetlistError>
    where
        E: fmt::Display,
        F: FnMut(&Path) -> Result<(), E>,
    {
        if !self.mode_enabled {
            return Err(SetlistError::NotActive);
        }
        if self.entries.is_empty() {
            self.disable();
            return Err(SetlistError::Empty);
        }

        if verify {
            for index in 0..self.entries.len() {
                self.try_load(index, &mut loader)?;
            }
            self.current_index = 0;
            self.try_load(0, &mut loader)?;
            log::info!("Setlist verified: {} songs", self.entries.len());
            return Ok(JumpOutcome::Loaded(0));
        }

        let target = self.current_index as i64 + delta.signum() as i64;
        if target < 0 || target >= self.entries.len() as i64 {
            return Ok(JumpOutcome::Boundary);
        }
        let target = target as usize;
        self.try_load(target, &mut loader)?;
        self.current_index = target;
        Ok(JumpOutcome::Loaded(target))
    }

    /// Advance after a stop marker once the transport has fully stopped
    pub fn advance_on_stop_marker<E, F>(&mut self, loader: F) -> Result<JumpOutcome, SetlistError>
    where
        E: fmt::Display,
        F: FnMut(&Path) -> Result<(), E>,
    {
        self.jump(1, false, loader)
    }

    fn try_load<E, F>(&mut self, index: usize, loader: &mut F) -> Result<(), SetlistError>
    where
        E: fmt::Display,
        F: FnMut(&Path) -> Result<(), E>,
    {
        let path = self.entries[index].path.clone();
        let result = if path.is_file() {
            loader(&path).map_err(|e| SetlistError::EntryFailed {
                index,
                path,
                reason: e.to_string(),
            })
        } else {
            Err(SetlistError::EntryMissing { index, path })
        };
        if let Err(e) = &result {
            log::error!("{}", e);
            self.disable();
        }
        result
    }

    /// Presentation title for the current song
    pub fn title(&self) -> Option<String> {
        if !self.mode_enabled {
            return None;
        }
        let entry = self.current()?;
        Some(format!(
            "Setlist, Song {:02} - [{}]",
            self.current_index + 1,
            entry.path.display()
        ))
    }
}
