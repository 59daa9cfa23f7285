// Track - Patterns and the triggers that place them on the timeline

use crate::sequencer::pattern::{Pattern, PatternId};
use crate::sequencer::timeline::Tick;
use crate::sequencer::trigger::Trigger;
use serde::{Deserialize, Serialize};

/// One arrangement lane
///
/// Triggers are kept sorted by start tick (creation order on ties).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    patterns: Vec<Pattern>,
    triggers: Vec<Trigger>,
    #[serde(default)]
    pub muted: bool,
    /// Live-mode audition flag; the active pattern loops while set
    #[serde(default)]
    pub playing: bool,
    #[serde(default)]
    pub active_pattern: Option<PatternId>,
    /// MIDI channel used for output
    #[serde(default)]
    pub channel: u8,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            patterns: Vec::new(),
            triggers: Vec::new(),
            muted: false,
            playing: false,
            active_pattern: None,
            channel: 0,
        }
    }

    // --- patterns ---

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn pattern(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    pub fn pattern_mut(&mut self, id: PatternId) -> Option<&mut Pattern> {
        self.patterns.iter_mut().find(|p| p.id == id)
    }

    pub(crate) fn patterns_mut(&mut self) -> &mut [Pattern] {
        &mut self.patterns
    }

    fn next_pattern_id(&self) -> PatternId {
        self.patterns.iter().map(|p| p.id + 1).max().unwrap_or(0)
    }

    /// Create an empty pattern and return its id
    /// The first pattern of a track becomes the active one
    pub fn add_pattern(&mut self, name: impl Into<String>, length: Tick) -> PatternId {
        let id = self.next_pattern_id();
        self.insert_pattern(Pattern::new(id, name, length))
    }

    /// Insert a prepared pattern, re-numbering it if its id is taken
    pub fn insert_pattern(&mut self, mut pattern: Pattern) -> PatternId {
        if self.pattern(pattern.id).is_some() {
            pattern.id = self.next_pattern_id();
        }
        let id = pattern.id;
        self.patterns.push(pattern);
        if self.active_pattern.is_none() {
            self.active_pattern = Some(id);
        }
        id
    }

    /// Returns false when the pattern does not exist
    pub fn set_active_pattern(&mut self, id: PatternId) -> bool {
        if self.pattern(id).is_none() {
            return false;
        }
        self.active_pattern = Some(id);
        true
    }

    /// Drop patterns no trigger refers to; returns how many were removed
    pub fn delete_unused_patterns(&mut self) -> usize {
        let before = self.patterns.len();
        let triggers = &self.triggers;
        self.patterns
            .retain(|pattern| triggers.iter().any(|t| t.pattern == pattern.id));
        let active_gone = self
            .active_pattern
            .is_some_and(|active| self.pattern(active).is_none());
        if active_gone {
            self.active_pattern = self.patterns.first().map(|p| p.id);
        }
        before - self.patterns.len()
    }

    // --- triggers ---

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub(crate) fn triggers_mut(&mut self) -> &mut Vec<Trigger> {
        &mut self.triggers
    }

    /// Replace the trigger list (undo restore)
    pub(crate) fn replace_triggers(&mut self, triggers: Vec<Trigger>) -> Vec<Trigger> {
        std::mem::replace(&mut self.triggers, triggers)
    }

    /// Insert a trigger in start order
    pub fn add_trigger(&mut self, trigger: Trigger) {
        let pos = self
            .triggers
            .partition_point(|t| (t.start, t.serial) <= (trigger.start, trigger.serial));
        self.triggers.insert(pos, trigger);
    }

    /// Remove the most recent trigger covering `tick`
    pub fn remove_trigger_at(&mut self, tick: Tick) -> Option<Trigger> {
        let index = self
            .triggers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.contains(tick))
            .max_by_key(|(_, t)| t.serial)
            .map(|(i, _)| i)?;
        Some(self.triggers.remove(index))
    }

    pub(crate) fn sort_triggers(&mut self) {
        self.triggers.sort_by_key(|t| (t.start, t.serial));
    }

    /// Trigger sounding at `tick`; the most recently created one wins
    pub fn sounding_trigger(&self, tick: Tick) -> Option<&Trigger> {
        let upper = self.triggers.partition_point(|t| t.start <= tick);
        self.triggers[..upper]
            .iter()
            .filter(|t| tick < t.end)
            .max_by_key(|t| t.serial)
    }

    /// End of the last trigger, 0 for an empty lane
    pub fn last_trigger_end(&self) -> Tick {
        self.triggers.iter().map(|t| t.end).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_pattern_becomes_active() {
        let mut track = Track::new("Drums");
        let first = track.add_pattern("Kick", 0);
        let second = track.add_pattern("Fill", 0);
        assert_ne!(first, second);
        assert_eq!(track.active_pattern, Some(first));
        assert!(track.set_active_pattern(second));
        assert!(!track.set_active_pattern(99));
    }

    #[test]
    fn test_insert_pattern_renumbers_duplicates() {
        let mut track = Track::new("Keys");
        let id = track.add_pattern("A", 0);
        let renumbered = track.insert_pattern(Pattern::new(id, "B", 0));
        assert_ne!(id, renumbered);
        assert_eq!(track.patterns().len(), 2);
    }

    #[test]
    fn test_triggers_sorted_and_most_recent_wins() {
        let mut track = Track::new("Bass");
        let p = track.add_pattern("Line", 0);
        track.add_trigger(Trigger::new(p, 200, 400, 1).unwrap());
        track.add_trigger(Trigger::new(p, 0, 300, 0).unwrap());
        track.add_trigger(Trigger::new(p, 100, 250, 2).unwrap());

        let starts: Vec<Tick> = track.triggers().iter().map(|t| t.start).collect();
        assert_eq!(starts, vec![0, 100, 200]);

        assert_eq!(track.sounding_trigger(50).map(|t| t.serial), Some(0));
        assert_eq!(track.sounding_trigger(220).map(|t| t.serial), Some(2));
        assert_eq!(track.sounding_trigger(260).map(|t| t.serial), Some(1));
        assert!(track.sounding_trigger(400).is_none());
    }

    #[test]
    fn test_remove_trigger_at() {
        let mut track = Track::new("Bass");
        let p = track.add_pattern("Line", 0);
        track.add_trigger(Trigger::new(p, 0, 300, 0).unwrap());
        track.add_trigger(Trigger::new(p, 100, 200, 1).unwrap());

        assert_eq!(track.remove_trigger_at(150).map(|t| t.serial), Some(1));
        assert_eq!(track.remove_trigger_at(150).map(|t| t.serial), Some(0));
        assert!(track.remove_trigger_at(150).is_none());
    }

    #[test]
    fn test_delete_unused_patterns() {
        let mut track = Track::new("Lead");
        let used = track.add_pattern("Used", 0);
        let unused = track.add_pattern("Unused", 0);
        track.set_active_pattern(unused);
        track.add_trigger(Trigger::new(used, 0, 96, 0).unwrap());

        assert_eq!(track.delete_unused_patterns(), 1);
        assert!(track.pattern(unused).is_none());
        assert_eq!(track.active_pattern, Some(used));
    }
}
