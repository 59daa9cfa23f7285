// Trigger - A placed span of a pattern on a track's timeline

use crate::sequencer::pattern::PatternId;
use crate::sequencer::timeline::Tick;
use serde::{Deserialize, Serialize};

/// Creation order of a trigger; higher serials win on overlap
pub type TriggerSerial = u64;

/// A pattern instance covering `[start, end)`
///
/// `offset` is the pattern-local tick that sounds at `start`, so a trigger
/// split in two keeps playing the same material on both halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub pattern: PatternId,
    pub start: Tick,
    pub end: Tick,
    #[serde(default)]
    pub offset: Tick,
    pub serial: TriggerSerial,
}

impl Trigger {
    /// Returns None for an empty or inverted span
    pub fn new(pattern: PatternId, start: Tick, end: Tick, serial: TriggerSerial) -> Option<Self> {
        (start < end).then_some(Self {
            pattern,
            start,
            end,
            offset: 0,
            serial,
        })
    }

    pub fn len(&self) -> Tick {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, tick: Tick) -> bool {
        self.start <= tick && tick < self.end
    }

    /// True if the trigger shares at least one tick with `[from, to)`
    pub fn intersects(&self, from: Tick, to: Tick) -> bool {
        self.start < to && from < self.end
    }

    /// Pattern-local tick sounding at `tick`
    pub fn pattern_tick(&self, tick: Tick, pattern_length: Tick) -> Tick {
        let length = pattern_length.max(1);
        (tick.saturating_sub(self.start) + self.offset) % length
    }

    /// Move the start forward to `tick`, advancing the offset to match
    pub(crate) fn trim_start_to(&mut self, tick: Tick) {
        if tick > self.start {
            self.offset += tick - self.start;
            self.start = tick;
        }
    }

    pub(crate) fn shift_forward(&mut self, distance: Tick) {
        self.start += distance;
        self.end += distance;
    }

    pub(crate) fn shift_back(&mut self, distance: Tick) {
        self.start = self.start.saturating_sub(distance);
        self.end = self.end.saturating_sub(distance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_rejects_empty_span() {
        assert!(Trigger::new(1, 10, 10, 0).is_none());
        assert!(Trigger::new(1, 10, 5, 0).is_none());
        assert_eq!(Trigger::new(1, 0, 96, 0).map(|t| t.len()), Some(96));
    }

    #[test]
    fn test_contains_is_half_open() {
        let trigger = Trigger::new(1, 96, 192, 0).unwrap();
        assert!(!trigger.contains(95));
        assert!(trigger.contains(96));
        assert!(trigger.contains(191));
        assert!(!trigger.contains(192));
        assert!(trigger.intersects(0, 97));
        assert!(!trigger.intersects(0, 96));
    }

    #[test]
    fn test_pattern_tick_with_offset() {
        let mut trigger = Trigger::new(1, 100, 1000, 0).unwrap();
        assert_eq!(trigger.pattern_tick(100, 192), 0);
        assert_eq!(trigger.pattern_tick(300, 192), 8);

        trigger.trim_start_to(150);
        assert_eq!(trigger.offset, 50);
        assert_eq!(trigger.pattern_tick(150, 192), 50);
        assert_eq!(trigger.pattern_tick(300, 192), 8);
    }
}
