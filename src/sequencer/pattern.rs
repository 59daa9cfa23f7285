// Pattern - Looped block of MIDI events referenced by triggers
// A pattern is like a "clip" in other DAWs

use crate::midi::event::PatternEvent;
use crate::sequencer::timeline::{PPQN, Tick};
use serde::{Deserialize, Serialize};

/// Identifier of a pattern, unique within its track
pub type PatternId = u32;

/// Default pattern length: one 4/4 bar
pub const DEFAULT_PATTERN_LENGTH: Tick = PPQN * 4;

/// A pattern containing MIDI events
///
/// Events are kept sorted by tick so the scheduler can slice the
/// window it needs without allocating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique identifier within the owning track
    pub id: PatternId,

    /// Pattern name
    pub name: String,

    /// Loop length in ticks, always > 0
    length: Tick,

    /// Events sorted by tick, all within [0, length)
    events: Vec<PatternEvent>,

    /// Excluded from song transpose when false (drum kits)
    #[serde(default = "default_transposable")]
    pub transposable: bool,

    /// Pattern bank the pattern was created or imported into
    #[serde(default)]
    pub bank: u8,
}

fn default_transposable() -> bool {
    true
}

impl Pattern {
    /// Create a new empty pattern; a zero length becomes one bar
    pub fn new(id: PatternId, name: impl Into<String>, length: Tick) -> Self {
        Self {
            id,
            name: name.into(),
            length: if length == 0 {
                DEFAULT_PATTERN_LENGTH
            } else {
                length
            },
            events: Vec::new(),
            transposable: true,
            bank: 0,
        }
    }

    pub fn length(&self) -> Tick {
        self.length
    }

    pub fn events(&self) -> &[PatternEvent] {
        &self.events
    }

    /// Add an event, keeping the list sorted; events past the end wrap
    pub fn add_event(&mut self, mut event: PatternEvent) {
        event.tick %= self.length;
        let insert_pos = self.events.partition_point(|e| e.tick <= event.tick);
        self.events.insert(insert_pos, event);
    }

    /// Events with `from <= tick < to`, in pattern-local ticks
    pub fn events_in(&self, from: Tick, to: Tick) -> &[PatternEvent] {
        let start = self.events.partition_point(|e| e.tick < from);
        let end = self.events.partition_point(|e| e.tick < to);
        &self.events[start..end.max(start)]
    }

    /// Transpose all note events; no-op for non-transposable patterns
    pub fn transpose(&mut self, semitones: i8) {
        if !self.transposable || semitones == 0 {
            return;
        }
        for event in &mut self.events {
            event.event = event.event.transposed(semitones);
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
