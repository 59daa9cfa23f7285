// Arrangement - Trigger store for every track of the song
// Expand/collapse/copy over the L-R span, live-trigger capture and playback lookup

use crate::midi::event::MidiEvent;
use crate::sequencer::pattern::{Pattern, PatternId};
use crate::sequencer::timeline::Tick;
use crate::sequencer::track::Track;
use crate::sequencer::transport::PlayMode;
use crate::sequencer::trigger::{Trigger, TriggerSerial};
use serde::{Deserialize, Serialize};

/// Song-wide mute request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteOp {
    Mute,
    Unmute,
    Toggle,
}

/// What a track is playing at a given tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sounding {
    pub track: usize,
    pub pattern: PatternId,
    pub pattern_tick: Tick,
}

/// An event due at an absolute song tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub tick: Tick,
    pub track: usize,
    pub channel: u8,
    pub event: MidiEvent,
}

/// All tracks of a song plus the trigger serial counter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    tracks: Vec<Track>,
    #[serde(default)]
    next_serial: TriggerSerial,
}

impl Arrangement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn add_track(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.next_serial = 0;
    }

    fn take_serial(&mut self) -> TriggerSerial {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }

    /// Re-sort every lane and keep the serial counter ahead of every stored
    /// trigger (after load)
    pub(crate) fn reseat_serials(&mut self) {
        for track in &mut self.tracks {
            track.sort_triggers();
        }
        let highest = self
            .tracks
            .iter()
            .flat_map(|t| t.triggers().iter().map(|tr| tr.serial + 1))
            .max()
            .unwrap_or(0);
        self.next_serial = self.next_serial.max(highest);
    }

    /// Place a new trigger; returns false for a missing track or pattern
    /// or an empty span
    pub fn add_trigger(&mut self, track: usize, pattern: PatternId, start: Tick, end: Tick) -> bool {
        let serial = self.next_serial;
        let Some(lane) = self.tracks.get_mut(track) else {
            return false;
        };
        if lane.pattern(pattern).is_none() {
            return false;
        }
        let Some(trigger) = Trigger::new(pattern, start, end, serial) else {
            return false;
        };
        lane.add_trigger(trigger);
        self.next_serial += 1;
        true
    }

    // --- whole-arrangement trigger snapshots (collapse/expand undo) ---

    pub fn trigger_snapshot(&self) -> Vec<Vec<Trigger>> {
        self.tracks.iter().map(|t| t.triggers().to_vec()).collect()
    }

    /// Swap every track's trigger list with the snapshot
    /// Tracks missing from the snapshot get an empty list
    pub(crate) fn swap_triggers(&mut self, snapshot: Vec<Vec<Trigger>>) -> Vec<Vec<Trigger>> {
        let mut lists = snapshot.into_iter();
        self.tracks
            .iter_mut()
            .map(|track| track.replace_triggers(lists.next().unwrap_or_default()))
            .collect()
    }

    // --- span edits ---

    /// Insert (`expand`) or remove (collapse) a gap of `right - left` ticks
    /// at `right`
    ///
    /// Expand splits triggers crossing `right` and pushes everything after
    /// it forward. Collapse removes `[right, right + span)`: triggers inside
    /// are deleted, later ones are pulled back and triggers crossing the
    /// region are clipped, so no trigger is ever left with an empty span.
    pub fn move_triggers(&mut self, expand: bool, left: Tick, right: Tick) {
        if right <= left {
            return;
        }
        let span = right - left;
        for track in &mut self.tracks {
            if expand {
                Self::expand_track(track, right, span);
            } else {
                Self::collapse_track(track, right, span);
            }
            track.sort_triggers();
        }
    }

    fn expand_track(track: &mut Track, pivot: Tick, span: Tick) {
        let mut tails = Vec::new();
        for trigger in track.triggers_mut().iter_mut() {
            if trigger.start >= pivot {
                trigger.shift_forward(span);
            } else if trigger.end > pivot {
                let mut tail = *trigger;
                tail.trim_start_to(pivot);
                tail.shift_forward(span);
                trigger.end = pivot;
                tails.push(tail);
            }
        }
        track.triggers_mut().extend(tails);
    }

    fn collapse_track(track: &mut Track, region_start: Tick, span: Tick) {
        let region_end = region_start + span;
        let triggers = track.triggers_mut();
        triggers.retain(|t| !(t.start >= region_start && t.end <= region_end));
        for trigger in triggers.iter_mut() {
            if trigger.end <= region_start {
                continue;
            }
            if trigger.start >= region_end {
                trigger.shift_back(span);
            } else if trigger.start < region_start {
                trigger.end = if trigger.end <= region_end {
                    region_start
                } else {
                    trigger.end - span
                };
            } else {
                // starts inside the removed region, ends past it
                trigger.trim_start_to(region_end);
                trigger.shift_back(span);
            }
        }
        Self::merge_split_pairs(triggers);
    }

    /// Rejoin halves of a trigger that an expand split at the pivot
    fn merge_split_pairs(triggers: &mut Vec<Trigger>) {
        triggers.sort_by_key(|t| (t.serial, t.start));
        let mut merged: Vec<Trigger> = Vec::with_capacity(triggers.len());
        for trigger in triggers.drain(..) {
            if let Some(last) = merged.last_mut() {
                let continues = last.serial == trigger.serial
                    && last.pattern == trigger.pattern
                    && last.end == trigger.start
                    && last.offset + last.len() == trigger.offset;
                if continues {
                    last.end = trigger.end;
                    continue;
                }
            }
            merged.push(trigger);
        }
        *triggers = merged;
    }

    /// Duplicate `[left, right)` into the span right after `right`
    pub fn copy_triggers(&mut self, left: Tick, right: Tick) {
        if right <= left {
            return;
        }
        let span = right - left;
        self.move_triggers(true, left, right);
        for index in 0..self.tracks.len() {
            let mut copies: Vec<Trigger> = self.tracks[index]
                .triggers()
                .iter()
                .filter(|t| t.intersects(left, right))
                .map(|t| {
                    let mut copy = *t;
                    copy.trim_start_to(left);
                    copy.end = copy.end.min(right);
                    copy.shift_forward(span);
                    copy
                })
                .collect();
            // Serials follow the originals' creation order so overlaps
            // resolve the same way in the copied span
            copies.sort_by_key(|t| t.serial);
            for mut copy in copies {
                copy.serial = self.take_serial();
                self.tracks[index].add_trigger(copy);
            }
        }
    }

    /// Record `[left, right)` of the active pattern on every auditioning
    /// track; returns the indices of the tracks that got a trigger
    pub fn create_triggers_for_playing_tracks(&mut self, left: Tick, right: Tick) -> Vec<usize> {
        let mut touched = Vec::new();
        if right <= left {
            return touched;
        }
        for index in 0..self.tracks.len() {
            let track = &self.tracks[index];
            if !track.playing {
                continue;
            }
            let Some(pattern) = track.active_pattern else {
                continue;
            };
            if self.add_trigger(index, pattern, left, right) {
                touched.push(index);
            }
        }
        touched
    }

    /// Remove patterns no trigger refers to, on every track
    pub fn delete_unused_patterns(&mut self) -> usize {
        self.tracks
            .iter_mut()
            .map(Track::delete_unused_patterns)
            .sum()
    }

    /// Bake a transpose into every transposable pattern
    pub fn apply_transpose(&mut self, semitones: i8) {
        for track in &mut self.tracks {
            for pattern in track.patterns_mut() {
                pattern.transpose(semitones);
            }
        }
    }

    pub fn set_song_mute(&mut self, op: MuteOp) {
        for track in &mut self.tracks {
            track.muted = match op {
                MuteOp::Mute => true,
                MuteOp::Unmute => false,
                MuteOp::Toggle => !track.muted,
            };
        }
    }

    /// Highest pattern bank in use
    pub fn highest_bank(&self) -> Option<u8> {
        self.tracks
            .iter()
            .flat_map(|t| t.patterns().iter().map(|p| p.bank))
            .max()
    }

    /// End of the last trigger on any track
    pub fn song_end(&self) -> Tick {
        self.tracks
            .iter()
            .map(Track::last_trigger_end)
            .max()
            .unwrap_or(0)
    }

    // --- playback ---

    /// Fill `out` with what every unmuted track plays at `tick`
    /// `out` is cleared first and only grows up to the track count
    pub fn evaluate_into(&self, tick: Tick, mode: PlayMode, out: &mut Vec<Sounding>) {
        out.clear();
        for (index, track) in self.tracks.iter().enumerate() {
            if track.muted {
                continue;
            }
            match mode {
                PlayMode::Song => {
                    let Some(trigger) = track.sounding_trigger(tick) else {
                        continue;
                    };
                    let Some(pattern) = track.pattern(trigger.pattern) else {
                        continue;
                    };
                    out.push(Sounding {
                        track: index,
                        pattern: pattern.id,
                        pattern_tick: trigger.pattern_tick(tick, pattern.length()),
                    });
                }
                PlayMode::Live => {
                    if !track.playing {
                        continue;
                    }
                    let Some(pattern) = track.active_pattern.and_then(|id| track.pattern(id)) else {
                        continue;
                    };
                    out.push(Sounding {
                        track: index,
                        pattern: pattern.id,
                        pattern_tick: tick % pattern.length(),
                    });
                }
            }
        }
    }

    /// Append every event due in `[from, to)` to `out`
    pub fn collect_events(
        &self,
        from: Tick,
        to: Tick,
        mode: PlayMode,
        transpose: i8,
        out: &mut Vec<ScheduledEvent>,
    ) {
        if to <= from {
            return;
        }
        for (index, track) in self.tracks.iter().enumerate() {
            if track.muted {
                continue;
            }
            match mode {
                PlayMode::Song => {
                    for trigger in track.triggers().iter().filter(|t| t.intersects(from, to)) {
                        let Some(pattern) = track.pattern(trigger.pattern) else {
                            continue;
                        };
                        let window = (from.max(trigger.start), to.min(trigger.end));
                        let origin = (trigger.start, trigger.offset);
                        let wins = |tick| {
                            track.sounding_trigger(tick).map(|t| t.serial) == Some(trigger.serial)
                        };
                        let target = (index, track.channel);
                        emit_window(pattern, window, origin, transpose, wins, target, out);
                    }
                }
                PlayMode::Live => {
                    if !track.playing {
                        continue;
                    }
                    if let Some(pattern) = track.active_pattern.and_then(|id| track.pattern(id)) {
                        let target = (index, track.channel);
                        emit_window(pattern, (from, to), (0, 0), transpose, |_| true, target, out);
                    }
                }
            }
        }
    }
}

/// Walk a pattern loop across `window`, pushing events that pass `keep`
/// `origin` is the (start, offset) pair the loop is anchored to
fn emit_window(
    pattern: &Pattern,
    window: (Tick, Tick),
    origin: (Tick, Tick),
    transpose: i8,
    keep: impl Fn(Tick) -> bool,
    (track, channel): (usize, u8),
    out: &mut Vec<ScheduledEvent>,
) {
    let (mut tick, end) = window;
    let (start, offset) = origin;
    let length = pattern.length();
    while tick < end {
        let local = (tick - start + offset) % length;
        let chunk = (length - local).min(end - tick);
        for event in pattern.events_in(local, local + chunk) {
            let at = tick + (event.tick - local);
            if !keep(at) {
                continue;
            }
            let event = if pattern.transposable {
                event.event.transposed(transpose)
            } else {
                event.event
            };
            out.push(ScheduledEvent {
                tick: at,
                track,
                channel,
                event,
            });
        }
        tick += chunk;
    }
}
