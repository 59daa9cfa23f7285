// UndoRecord - Closed set of undoable edit kinds
//
// Every record holds the state it will restore. Applying a record swaps that
// state with the live one, so after `apply` the same record holds the state
// needed to go back the other way.

use crate::sequencer::arrangement::Arrangement;
use crate::sequencer::tempo::TempoMarker;
use crate::sequencer::track::Track;
use crate::sequencer::trigger::Trigger;
use std::fmt;
use thiserror::Error;

/// Result type for undo/redo operations
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors that can occur while walking the history
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("A hold window is open")]
    HoldOpen,

    #[error("Track {0} does not exist")]
    TrackOutOfRange(usize),

    #[error("Tempo history is empty")]
    TempoHistoryEmpty,
}

/// Record kind, reported back by undo/redo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UndoKind {
    Trigger,
    Track,
    Perf,
    CollapseExpand,
    Bpm,
    Import,
}

impl fmt::Display for UndoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UndoKind::Trigger => "trigger edit",
            UndoKind::Track => "track edit",
            UndoKind::Perf => "song edit",
            UndoKind::CollapseExpand => "collapse/expand",
            UndoKind::Bpm => "tempo edit",
            UndoKind::Import => "MIDI import",
        };
        f.write_str(name)
    }
}

/// Song-wide state restored by a `Perf` record
#[derive(Debug, Clone, PartialEq)]
pub struct PerfSnapshot {
    pub arrangement: Arrangement,
    /// Song transpose in semitones
    pub transpose: i32,
}

/// State captured before a MIDI import
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSnapshot {
    pub arrangement: Arrangement,
    pub tempo: Vec<TempoMarker>,
}

/// One entry of the undo or redo stack
#[derive(Debug, Clone, PartialEq)]
pub enum UndoRecord {
    /// Trigger list of a single track
    Trigger { track: usize, triggers: Vec<Trigger> },
    /// A whole track (patterns, triggers, flags)
    Track { track: usize, state: Box<Track> },
    /// The whole arrangement plus the song transpose
    Perf(Box<PerfSnapshot>),
    /// Trigger lists of every track
    CollapseExpand(Vec<Vec<Trigger>>),
    /// Marker for the tempo track's own history
    Bpm,
    /// Arrangement plus tempo markers from before an import
    Import(Box<ImportSnapshot>),
}

impl UndoRecord {
    pub fn kind(&self) -> UndoKind {
        match self {
            UndoRecord::Trigger { .. } => UndoKind::Trigger,
            UndoRecord::Track { .. } => UndoKind::Track,
            UndoRecord::Perf(_) => UndoKind::Perf,
            UndoRecord::CollapseExpand(_) => UndoKind::CollapseExpand,
            UndoRecord::Bpm => UndoKind::Bpm,
            UndoRecord::Import(_) => UndoKind::Import,
        }
    }

    /// Affected track index for single-track records
    pub fn track(&self) -> Option<usize> {
        match self {
            UndoRecord::Trigger { track, .. } | UndoRecord::Track { track, .. } => Some(*track),
            _ => None,
        }
    }
}

/// Which stack a record is being taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    Undo,
    Redo,
}

/// State a record can be applied to
///
/// `apply_record` swaps the record's payload with the live state. On error
/// neither the state nor the record may have changed.
pub trait UndoTarget {
    fn apply_record(
        &mut self,
        record: &mut UndoRecord,
        direction: HistoryDirection,
    ) -> CommandResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_and_track() {
        let record = UndoRecord::Trigger {
            track: 3,
            triggers: Vec::new(),
        };
        assert_eq!(record.kind(), UndoKind::Trigger);
        assert_eq!(record.track(), Some(3));

        let record = UndoRecord::CollapseExpand(Vec::new());
        assert_eq!(record.kind(), UndoKind::CollapseExpand);
        assert_eq!(record.track(), None);
        assert_eq!(UndoRecord::Bpm.kind().to_string(), "tempo edit");
    }
}
