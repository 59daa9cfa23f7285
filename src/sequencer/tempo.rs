// Tempo track - Ordered tempo markers with their own undo history
// Resolves the active BPM for a tick and flags stop markers for setlists

use super::timeline::{Tempo, Tick};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A tempo change point
///
/// A stop marker keeps the tempo that was active where it was placed and
/// additionally halts playback when the playhead reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoMarker {
    pub tick: Tick,
    pub bpm: f64,
    #[serde(default)]
    pub stop: bool,
}

impl TempoMarker {
    pub fn new(tick: Tick, bpm: f64) -> Self {
        Self {
            tick,
            bpm: Tempo::clamped(bpm).bpm(),
            stop: false,
        }
    }

    pub fn stop(tick: Tick, bpm: f64) -> Self {
        Self {
            stop: true,
            ..Self::new(tick, bpm)
        }
    }
}

/// Ordered, tick-unique list of tempo markers
///
/// The tick-0 marker always exists and is the song's start tempo. Edits go
/// to the marker list; the scheduler reads a separate playback copy that is
/// rebuilt when the list is dirty, so a half-applied edit is never observed
/// mid-step.
#[derive(Debug, Clone)]
pub struct TempoTrack {
    markers: Vec<TempoMarker>,
    playback: Vec<TempoMarker>,
    dirty: bool,
    default_bpm: f64,
    undo: VecDeque<Vec<TempoMarker>>,
    redo: VecDeque<Vec<TempoMarker>>,
    hold: Option<Vec<TempoMarker>>,
    max_history: usize,
}

impl TempoTrack {
    pub fn new(default_bpm: f64, max_history: usize) -> Self {
        let start = vec![TempoMarker::new(0, default_bpm)];
        Self {
            playback: start.clone(),
            markers: start,
            dirty: false,
            default_bpm: Tempo::clamped(default_bpm).bpm(),
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            hold: None,
            max_history,
        }
    }

    pub fn markers(&self) -> &[TempoMarker] {
        &self.markers
    }

    /// BPM of the latest marker at or before `tick`, else the default tempo
    pub fn active_bpm(&self, tick: Tick) -> f64 {
        Self::resolve(&self.markers, tick).unwrap_or(self.default_bpm)
    }

    /// Same lookup against the playback copy used by the scheduler
    pub fn playback_bpm(&self, tick: Tick) -> f64 {
        Self::resolve(&self.playback, tick).unwrap_or(self.default_bpm)
    }

    fn resolve(markers: &[TempoMarker], tick: Tick) -> Option<f64> {
        let index = markers.partition_point(|marker| marker.tick <= tick);
        index.checked_sub(1).map(|i| markers[i].bpm)
    }

    pub fn start_bpm(&self) -> f64 {
        self.active_bpm(0)
    }

    /// Change the tempo of the tick-0 marker
    pub fn set_start_bpm(&mut self, bpm: f64) {
        self.insert_marker(0, bpm);
    }

    /// Insert a marker, replacing any marker already at that tick
    pub fn insert_marker(&mut self, tick: Tick, bpm: f64) {
        self.put(TempoMarker::new(tick, bpm));
    }

    /// Insert a stop marker carrying the tempo active at that tick
    pub fn insert_stop_marker(&mut self, tick: Tick) {
        let bpm = self.active_bpm(tick);
        self.put(TempoMarker::stop(tick, bpm));
    }

    fn put(&mut self, marker: TempoMarker) {
        match self.markers.binary_search_by(|m| m.tick.cmp(&marker.tick)) {
            Ok(index) => self.markers[index] = marker,
            Err(index) => self.markers.insert(index, marker),
        }
        self.dirty = true;
    }

    /// Remove the marker at `tick`; the start marker cannot be removed
    pub fn remove_marker(&mut self, tick: Tick) -> bool {
        if tick == 0 {
            return false;
        }
        match self.markers.binary_search_by(|m| m.tick.cmp(&tick)) {
            Ok(index) => {
                self.markers.remove(index);
                self.dirty = true;
                true
            }
            Err(_) => false,
        }
    }

    /// Replace the whole list (file load, import undo)
    pub fn load_markers(&mut self, mut markers: Vec<TempoMarker>) {
        markers.sort_by_key(|m| m.tick);
        markers.dedup_by_key(|m| m.tick);
        if markers.first().is_none_or(|m| m.tick != 0) {
            markers.insert(0, TempoMarker::new(0, self.default_bpm));
        }
        self.markers = markers;
        self.dirty = true;
    }

    /// Back to a single start marker at the default tempo, history cleared
    pub fn reset(&mut self) {
        self.markers = vec![TempoMarker::new(0, self.default_bpm)];
        self.dirty = true;
        self.clear_history();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Copy the edited list into the playback list
    pub fn rebuild_playback_list(&mut self) {
        self.playback.clone_from(&self.markers);
        self.dirty = false;
    }

    /// First stop marker in the playback list inside (from, to]
    pub fn stop_marker_between(&self, from: Tick, to: Tick) -> Option<Tick> {
        if to <= from {
            return None;
        }
        let start = self.playback.partition_point(|m| m.tick <= from);
        self.playback[start..]
            .iter()
            .take_while(|m| m.tick <= to)
            .find(|m| m.stop)
            .map(|m| m.tick)
    }

    // --- undo history, scoped to tempo edits only ---

    /// Snapshot the current list onto the tempo undo stack
    pub fn push_undo(&mut self) {
        let snapshot = self.markers.clone();
        self.push_snapshot(snapshot);
    }

    fn push_snapshot(&mut self, snapshot: Vec<TempoMarker>) {
        self.undo.push_back(snapshot);
        if self.undo.len() > self.max_history {
            self.undo.pop_front();
        }
        self.redo.clear();
    }

    /// Open a hold window; the pre-hold list is remembered once
    /// Returns true if this call opened the window
    pub fn begin_hold(&mut self) -> bool {
        if self.hold.is_some() {
            return false;
        }
        self.hold = Some(self.markers.clone());
        true
    }

    pub fn is_holding(&self) -> bool {
        self.hold.is_some()
    }

    /// Close the hold window, pushing the pre-hold list as one entry
    /// Returns true if an entry was pushed; a window that changed nothing
    /// leaves the history alone
    pub fn end_hold(&mut self) -> bool {
        match self.hold.take() {
            Some(snapshot) if snapshot != self.markers => {
                self.push_snapshot(snapshot);
                true
            }
            _ => false,
        }
    }

    pub fn pop_undo(&mut self) -> bool {
        let Some(previous) = self.undo.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.markers, previous);
        self.redo.push_back(current);
        self.dirty = true;
        true
    }

    pub fn pop_redo(&mut self) -> bool {
        let Some(next) = self.redo.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.markers, next);
        self.undo.push_back(current);
        self.dirty = true;
        true
    }

    pub fn clear_redo(&mut self) {
        self.redo.clear();
    }

    pub fn clear_history(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.hold = None;
    }

    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }
}

impl Default for TempoTrack {
    fn default() -> Self {
        Self::new(Tempo::default().bpm(), 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_with(markers: &[(Tick, f64)]) -> TempoTrack {
        let mut track = TempoTrack::default();
        for &(tick, bpm) in markers {
            track.insert_marker(tick, bpm);
        }
        track
    }

    #[test]
    fn test_active_bpm_lookup() {
        let track = track_with(&[(0, 120.0), (480, 140.0)]);
        assert_eq!(track.active_bpm(0), 120.0);
        assert_eq!(track.active_bpm(240), 120.0);
        assert_eq!(track.active_bpm(479), 120.0);
        assert_eq!(track.active_bpm(480), 140.0);
        assert_eq!(track.active_bpm(1000), 140.0);
    }

    #[test]
    fn test_default_when_no_marker() {
        let mut track = TempoTrack::new(97.0, 10);
        track.markers.clear();
        assert_eq!(track.active_bpm(500), 97.0);
    }

    #[test]
    fn test_insert_replaces_same_tick() {
        let mut track = track_with(&[(480, 140.0)]);
        track.insert_marker(480, 150.0);
        assert_eq!(track.markers().len(), 2);
        assert_eq!(track.active_bpm(480), 150.0);
    }

    #[test]
    fn test_markers_stay_sorted() {
        let track = track_with(&[(960, 90.0), (100, 100.0), (500, 110.0)]);
        let ticks: Vec<Tick> = track.markers().iter().map(|m| m.tick).collect();
        assert_eq!(ticks, vec![0, 100, 500, 960]);
    }

    #[test]
    fn test_start_marker_is_permanent() {
        let mut track = track_with(&[(480, 140.0)]);
        assert!(!track.remove_marker(0));
        assert!(track.remove_marker(480));
        assert!(!track.remove_marker(480));
        assert_eq!(track.markers().len(), 1);
    }

    #[test]
    fn test_playback_list_needs_rebuild() {
        let mut track = TempoTrack::default();
        track.insert_marker(100, 180.0);
        assert!(track.is_dirty());
        assert_eq!(track.playback_bpm(200), 120.0);

        track.rebuild_playback_list();
        assert!(!track.is_dirty());
        assert_eq!(track.playback_bpm(200), 180.0);
    }

    #[test]
    fn test_stop_marker_between() {
        let mut track = track_with(&[(480, 140.0)]);
        track.insert_stop_marker(960);
        track.rebuild_playback_list();

        assert_eq!(track.active_bpm(960), 140.0);
        assert_eq!(track.stop_marker_between(0, 959), None);
        assert_eq!(track.stop_marker_between(0, 960), Some(960));
        assert_eq!(track.stop_marker_between(960, 2000), None);
    }

    #[test]
    fn test_undo_redo() {
        let mut track = TempoTrack::default();
        track.push_undo();
        track.insert_marker(480, 140.0);
        let edited = track.markers().to_vec();

        assert!(track.pop_undo());
        assert_eq!(track.markers().len(), 1);
        assert!(track.pop_redo());
        assert_eq!(track.markers(), edited.as_slice());
        assert!(!track.pop_redo());
    }

    #[test]
    fn test_hold_coalesces_edits() {
        let mut track = TempoTrack::default();
        assert!(track.begin_hold());
        for bpm in 121..140 {
            assert!(!track.begin_hold());
            track.set_start_bpm(bpm as f64);
        }
        assert!(track.end_hold());
        assert!(!track.end_hold());
        assert_eq!(track.undo_count(), 1);

        track.pop_undo();
        assert_eq!(track.start_bpm(), 120.0);
    }

    #[test]
    fn test_hold_without_change_pushes_nothing() {
        let mut track = TempoTrack::default();
        track.set_start_bpm(130.0);
        track.push_undo();
        assert!(track.pop_undo());
        assert_eq!(track.redo_count(), 1);

        assert!(track.begin_hold());
        track.set_start_bpm(track.start_bpm());
        assert!(!track.end_hold());
        assert_eq!(track.undo_count(), 0);
        assert_eq!(track.redo_count(), 1);
    }

    #[test]
    fn test_load_markers_inserts_start() {
        let mut track = TempoTrack::default();
        track.load_markers(vec![TempoMarker::new(300, 90.0), TempoMarker::new(100, 80.0)]);
        let ticks: Vec<Tick> = track.markers().iter().map(|m| m.tick).collect();
        assert_eq!(ticks, vec![0, 100, 300]);
        assert!(track.is_dirty());
    }
}
