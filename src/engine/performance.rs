// Performance - Everything the scheduler reads, behind one lock
//
// The control context takes the lock for the duration of a single edit; the
// scheduler takes it for one step. Neither holds it across file I/O.

use crate::command::{
    CommandError, CommandResult, HistoryDirection, PerfSnapshot, UndoRecord, UndoTarget,
};
use crate::engine::EngineError;
use crate::sequencer::arrangement::{Arrangement, ScheduledEvent};
use crate::sequencer::tempo::TempoTrack;
use crate::sequencer::timeline::Tick;
use crate::sequencer::transport::{AdvanceResult, PlayMode, Transport};
use crate::sync::SyncAdapter;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What one scheduler step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub advance: AdvanceResult,
    /// A stop marker (or the end of the song in setlist mode) halted playback
    pub halted: bool,
}

pub struct Performance {
    pub(crate) arrangement: Arrangement,
    pub(crate) tempo: TempoTrack,
    pub(crate) transport: Transport,
    pub(crate) sync: SyncAdapter,
    /// Ticks covered by one unaccelerated fast-seek step
    fast_seek_step: Tick,
    /// Mode switch waiting for the transport to stop
    pending_mode: Option<PlayMode>,
    /// Set when playback halted on a stop marker; cleared by the consumer
    stop_reached: bool,
    /// Halt at the end of the last trigger (setlist mode)
    stop_at_song_end: bool,
}

pub(crate) fn lock(performance: &Mutex<Performance>) -> MutexGuard<'_, Performance> {
    performance.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Performance {
    pub fn new(transport: Transport, tempo: TempoTrack, sync: SyncAdapter, fast_seek_step: Tick) -> Self {
        Self {
            arrangement: Arrangement::new(),
            tempo,
            transport,
            sync,
            fast_seek_step: fast_seek_step.max(1),
            pending_mode: None,
            stop_reached: false,
            stop_at_song_end: false,
        }
    }

    pub fn arrangement(&self) -> &Arrangement {
        &self.arrangement
    }

    pub fn tempo(&self) -> &TempoTrack {
        &self.tempo
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn sync(&self) -> &SyncAdapter {
        &self.sync
    }

    pub fn pending_mode(&self) -> Option<PlayMode> {
        self.pending_mode
    }

    pub(crate) fn set_stop_at_song_end(&mut self, enabled: bool) {
        self.stop_at_song_end = enabled;
    }

    /// Consume the stop-marker flag
    pub(crate) fn take_stop_reached(&mut self) -> bool {
        std::mem::take(&mut self.stop_reached)
    }

    // --- transport control ---

    pub(crate) fn start_transport(&mut self) -> bool {
        self.stop_reached = false;
        self.sync_bpm();
        self.transport.start()
    }

    /// Stop and apply any deferred mode switch
    pub(crate) fn stop_transport(&mut self) -> bool {
        let stopped = self.transport.stop();
        self.transport.release_seek();
        if let Some(mode) = self.pending_mode.take() {
            self.transport.set_play_mode(mode);
            log::info!("Deferred switch to {:?} mode applied", mode);
        }
        stopped
    }

    /// Switch mode now, or once stopped while running under sync
    /// Returns true if the switch was applied immediately
    pub(crate) fn request_play_mode(&mut self, mode: PlayMode) -> bool {
        if self.transport.is_running() && self.sync.is_connected() {
            self.pending_mode = Some(mode);
            return false;
        }
        self.pending_mode = None;
        self.transport.set_play_mode(mode);
        true
    }

    fn sync_bpm(&mut self) {
        if self.tempo.is_dirty() {
            self.tempo.rebuild_playback_list();
        }
        let bpm = self.tempo.playback_bpm(self.transport.position());
        self.transport.set_bpm(bpm);
    }

    // --- scheduler ---

    /// One scheduler step covering `elapsed` wall-clock time
    ///
    /// Events due in the covered span are appended to `out`; nothing here
    /// blocks or does file I/O.
    pub fn process(&mut self, elapsed: Duration, out: &mut Vec<ScheduledEvent>) -> StepReport {
        self.sync_bpm();

        let advance = if self.sync.is_slave() {
            self.follow_authority(elapsed)
        } else {
            if self.transport.apply_fast_seek(self.fast_seek_step) {
                log::trace!("Fast seek to {}", self.transport.position());
            }
            self.transport.advance_by_time(elapsed)
        };

        let mut halted = false;
        if self.transport.is_running() && (advance.to != advance.from || advance.wrapped) {
            halted = self.emit(advance, out);
        }

        if self.sync.is_master() {
            let position = self.transport.position() as f64;
            let running = self.transport.is_running();
            self.sync.publish(position, running);
        }

        StepReport { advance, halted }
    }

    /// Track the external position; local time takes over if the link drops
    fn follow_authority(&mut self, elapsed: Duration) -> AdvanceResult {
        let Some(external) = self.sync.poll() else {
            return self.transport.advance_by_time(elapsed);
        };
        let was_running = self.transport.is_running();
        if external.running && !was_running {
            self.stop_reached = false;
            self.transport.start();
        } else if !external.running && was_running {
            self.stop_transport();
        }
        let followed = self.transport.follow_external(external.tick);
        // A start or a backwards locate is a jump, not a span to play
        if !was_running || followed.wrapped {
            return AdvanceResult {
                from: followed.to,
                to: followed.to,
                wrapped: false,
            };
        }
        followed
    }

    /// Collect events for the advanced span, halting on a stop marker
    fn emit(&mut self, advance: AdvanceResult, out: &mut Vec<ScheduledEvent>) -> bool {
        let (left, right) = (self.transport.left_tick(), self.transport.right_tick());
        let windows = if advance.wrapped {
            // Only a playhead that was inside the region plays out its tail
            let tail = if (left..right).contains(&advance.from) {
                (advance.from, right)
            } else {
                (right, right)
            };
            [tail, (left, advance.to)]
        } else {
            [(advance.from, advance.to), (advance.to, advance.to)]
        };

        let mode = self.transport.play_mode();
        let transpose = self.transport.settings().transpose.clamp(-127, 127) as i8;
        let song_end = self.arrangement.song_end();

        for (from, to) in windows {
            let mut halt_at = self.tempo.stop_marker_between(from, to);
            if halt_at.is_none()
                && self.stop_at_song_end
                && mode == PlayMode::Song
                && !self.transport.is_looping()
                && song_end > 0
                && from < song_end
                && song_end <= to
            {
                halt_at = Some(song_end);
            }

            match halt_at {
                Some(tick) => {
                    self.arrangement
                        .collect_events(from, tick, mode, transpose, out);
                    self.stop_transport();
                    self.transport.set_position(tick);
                    self.stop_reached = true;
                    log::debug!("Playback halted at tick {}", tick);
                    return true;
                }
                None => self
                    .arrangement
                    .collect_events(from, to, mode, transpose, out),
            }
        }
        false
    }

    // --- undo capture ---

    pub(crate) fn capture_triggers(&self, track: usize) -> Result<UndoRecord, EngineError> {
        let lane = self
            .arrangement
            .track(track)
            .ok_or(EngineError::InvalidTrack(track))?;
        Ok(UndoRecord::Trigger {
            track,
            triggers: lane.triggers().to_vec(),
        })
    }

    pub(crate) fn capture_track(&self, track: usize) -> Result<UndoRecord, EngineError> {
        let lane = self
            .arrangement
            .track(track)
            .ok_or(EngineError::InvalidTrack(track))?;
        Ok(UndoRecord::Track {
            track,
            state: Box::new(lane.clone()),
        })
    }

    pub(crate) fn capture_perf(&self) -> UndoRecord {
        UndoRecord::Perf(Box::new(PerfSnapshot {
            arrangement: self.arrangement.clone(),
            transpose: self.transport.settings().transpose,
        }))
    }

    pub(crate) fn capture_collapse_expand(&self) -> UndoRecord {
        UndoRecord::CollapseExpand(self.arrangement.trigger_snapshot())
    }
}

impl UndoTarget for Performance {
    fn apply_record(
        &mut self,
        record: &mut UndoRecord,
        direction: HistoryDirection,
    ) -> CommandResult<()> {
        match record {
            UndoRecord::Trigger { track, triggers } => {
                let lane = self
                    .arrangement
                    .track_mut(*track)
                    .ok_or(CommandError::TrackOutOfRange(*track))?;
                *triggers = lane.replace_triggers(std::mem::take(triggers));
            }
            UndoRecord::Track { track, state } => {
                let lane = self
                    .arrangement
                    .track_mut(*track)
                    .ok_or(CommandError::TrackOutOfRange(*track))?;
                std::mem::swap(lane, state.as_mut());
            }
            UndoRecord::Perf(snapshot) => {
                std::mem::swap(&mut self.arrangement, &mut snapshot.arrangement);
                let current = self.transport.settings().transpose;
                let previous = std::mem::replace(&mut snapshot.transpose, current);
                self.transport.set_transpose(previous);
            }
            UndoRecord::CollapseExpand(snapshot) => {
                *snapshot = self.arrangement.swap_triggers(std::mem::take(snapshot));
            }
            UndoRecord::Bpm => {
                let applied = match direction {
                    HistoryDirection::Undo => self.tempo.pop_undo(),
                    HistoryDirection::Redo => self.tempo.pop_redo(),
                };
                if !applied {
                    return Err(CommandError::TempoHistoryEmpty);
                }
            }
            UndoRecord::Import(snapshot) => {
                std::mem::swap(&mut self.arrangement, &mut snapshot.arrangement);
                let current = self.tempo.markers().to_vec();
                let previous = std::mem::replace(&mut snapshot.tempo, current);
                self.tempo.load_markers(previous);
            }
        }
        self.arrangement.reseat_serials();
        Ok(())
    }
}

impl std::fmt::Debug for Performance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Performance")
            .field("tracks", &self.arrangement.track_count())
            .field("position", &self.transport.position())
            .field("running", &self.transport.is_running())
            .field("sync", &self.sync.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::UndoStack;
    use crate::engine::context::EngineContext;
    use crate::midi::event::{MidiEvent, PatternEvent};
    use crate::sequencer::timeline::PPQN;
    use crate::sequencer::track::Track;
    use crate::sync::LoopbackAuthority;

    fn performance() -> (Performance, crate::sync::LoopbackHandle) {
        let (authority, handle) = LoopbackAuthority::new();
        let transport = Transport::new(EngineContext::new());
        let performance = Performance::new(
            transport,
            TempoTrack::default(),
            SyncAdapter::new(Box::new(authority)),
            PPQN / 4,
        );
        (performance, handle)
    }

    fn with_beat(performance: &mut Performance) {
        let mut track = Track::new("Drums");
        let id = track.add_pattern("Beat", PPQN);
        if let Some(pattern) = track.pattern_mut(id) {
            pattern.add_event(PatternEvent::new(
                0,
                MidiEvent::NoteOn {
                    note: 36,
                    velocity: 100,
                },
            ));
        }
        performance.arrangement.add_track(track);
        performance.arrangement.add_trigger(0, id, 0, PPQN * 4);
    }

    /// 1 second at 120 bpm is exactly two quarter notes
    const TWO_BEATS: Duration = Duration::from_secs(1);

    #[test]
    fn test_process_emits_events_in_window() {
        let (mut perf, _handle) = performance();
        with_beat(&mut perf);
        perf.start_transport();

        let mut out = Vec::new();
        let report = perf.process(TWO_BEATS, &mut out);
        assert_eq!(report.advance.to, PPQN * 2);
        assert_eq!(out.iter().map(|e| e.tick).collect::<Vec<_>>(), vec![0, PPQN]);
    }

    #[test]
    fn test_process_wraps_loop_and_emits_both_sides() {
        let (mut perf, _handle) = performance();
        with_beat(&mut perf);
        perf.transport.set_right(PPQN * 3);
        perf.transport.set_loop(true);
        perf.start_transport();

        let mut out = Vec::new();
        perf.process(TWO_BEATS, &mut out);
        out.clear();
        let report = perf.process(TWO_BEATS, &mut out);

        assert!(report.advance.wrapped);
        assert_eq!(report.advance.to, PPQN);
        let ticks: Vec<Tick> = out.iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![PPQN * 2, 0]);
    }

    #[test]
    fn test_stop_marker_halts_playback() {
        let (mut perf, _handle) = performance();
        with_beat(&mut perf);
        perf.tempo.insert_stop_marker(PPQN + PPQN / 2);
        perf.start_transport();

        let mut out = Vec::new();
        let report = perf.process(TWO_BEATS, &mut out);
        assert!(report.halted);
        assert!(!perf.transport.is_running());
        assert_eq!(perf.transport.position(), PPQN + PPQN / 2);
        assert!(perf.take_stop_reached());
        assert!(!perf.take_stop_reached());
    }

    #[test]
    fn test_song_end_halts_only_when_enabled() {
        let (mut perf, _handle) = performance();
        with_beat(&mut perf);
        perf.start_transport();
        let mut out = Vec::new();
        for _ in 0..3 {
            perf.process(TWO_BEATS, &mut out);
        }
        assert!(perf.transport.is_running());

        let (mut perf, _handle) = performance();
        with_beat(&mut perf);
        perf.set_stop_at_song_end(true);
        perf.start_transport();
        for _ in 0..3 {
            perf.process(TWO_BEATS, &mut out);
        }
        assert!(!perf.transport.is_running());
        assert_eq!(perf.transport.position(), PPQN * 4);
    }

    #[test]
    fn test_tempo_marker_changes_rate() {
        let (mut perf, _handle) = performance();
        perf.tempo.insert_marker(PPQN * 2, 60.0);
        perf.start_transport();

        let mut out = Vec::new();
        perf.process(TWO_BEATS, &mut out);
        assert_eq!(perf.transport.bpm(), 120.0);
        perf.process(TWO_BEATS, &mut out);
        assert_eq!(perf.transport.bpm(), 60.0);
        assert_eq!(perf.transport.position(), PPQN * 3);
    }

    #[test]
    fn test_slave_follows_external_position() {
        let (mut perf, handle) = performance();
        perf.sync.enable(false).unwrap();
        handle.report(480.5, true);

        let mut out = Vec::new();
        perf.process(TWO_BEATS, &mut out);
        assert!(perf.transport.is_running());
        assert_eq!(perf.transport.position(), 480);

        handle.drop_connection();
        let report = perf.process(TWO_BEATS, &mut out);
        assert!(!perf.sync.is_connected());
        // Free-running from where the link dropped
        assert_eq!(report.advance.from, 480);
        assert!(report.advance.to > 480);
    }

    #[test]
    fn test_master_publishes_each_step() {
        let (mut perf, handle) = performance();
        perf.sync.enable(true).unwrap();
        perf.start_transport();
        let mut out = Vec::new();
        perf.process(TWO_BEATS, &mut out);
        let published = handle.published().unwrap();
        assert_eq!(published.tick, (PPQN * 2) as f64);
        assert!(published.running);
    }

    #[test]
    fn test_mode_switch_deferred_under_sync() {
        let (mut perf, _handle) = performance();
        assert!(perf.request_play_mode(PlayMode::Live));
        assert_eq!(perf.transport.play_mode(), PlayMode::Live);

        perf.sync.enable(true).unwrap();
        perf.start_transport();
        assert!(!perf.request_play_mode(PlayMode::Song));
        assert_eq!(perf.transport.play_mode(), PlayMode::Live);
        perf.stop_transport();
        assert_eq!(perf.transport.play_mode(), PlayMode::Song);
    }

    #[test]
    fn test_collapse_expand_record_round_trip() {
        let (mut perf, _handle) = performance();
        with_beat(&mut perf);
        let before = perf.arrangement.clone();

        let mut history = UndoStack::new();
        history.push(perf.capture_collapse_expand());
        perf.arrangement.move_triggers(true, PPQN, PPQN * 2);
        let after = perf.arrangement.clone();

        history.undo(&mut perf).unwrap();
        assert_eq!(perf.arrangement, before);
        history.redo(&mut perf).unwrap();
        assert_eq!(perf.arrangement, after);
    }

    #[test]
    fn test_track_record_out_of_range_leaves_stack() {
        let (mut perf, _handle) = performance();
        let mut history = UndoStack::new();
        history.push(UndoRecord::Trigger {
            track: 4,
            triggers: Vec::new(),
        });
        assert_eq!(
            history.undo(&mut perf),
            Err(CommandError::TrackOutOfRange(4))
        );
        assert!(history.has_undo());
    }
}
