// Engine - Control-context API over the performance
//
// Every edit captures its undo record and mutates under a single lock of the
// performance, so the scheduler never observes half an edit. File and codec
// I/O happens outside the lock on cloned or freshly parsed state, which is
// swapped in only on success.

pub mod context;
pub mod driver;
pub mod performance;
pub mod tap;

use crate::command::{CommandError, ImportSnapshot, UndoKind, UndoRecord, UndoStack};
use crate::config::EngineConfig;
use crate::messaging::channels::{
    EventConsumer, EventProducer, RequestReceiver, RequestSender, create_event_channel,
    create_request_channel, publish,
};
use crate::messaging::{
    ControlRequest, EngineEvent, Notification, NotificationCategory, NotificationLevel,
};
use crate::midi::codec::{BankOffset, CodecError, ExportSelector, MidiCodec};
use crate::project::{
    Project, ProjectError, ProjectLoadOptions, ProjectManager, ProjectMetadata, RecentFiles,
    SetlistInfo, TransportFile,
};
use crate::sequencer::arrangement::MuteOp;
use crate::sequencer::pattern::PatternId;
use crate::sequencer::tempo::TempoTrack;
use crate::sequencer::timeline::{MusicalTime, Tick, TimeSignature};
use crate::sequencer::track::Track;
use crate::sequencer::transport::{
    FastSeek, PlayMode, SeekDirection, SharedTransportState, Transport, TransportState,
};
use crate::setlist::{JumpOutcome, SetlistError, SetlistSequencer};
use crate::sync::{SyncAdapter, SyncError, SyncStatus, TransportAuthority};
use context::EngineContext;
use driver::Scheduler;
use performance::{Performance, lock};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tap::{Tap, TapTempo};

/// Errors surfaced to the control context
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Setlist(#[from] SetlistError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Not allowed while the transport is running")]
    TransportRunning,

    #[error("Track {0} does not exist")]
    InvalidTrack(usize),

    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    #[error("The song has not been saved to a file yet")]
    NoFilePath,
}

impl EngineError {
    pub fn category(&self) -> NotificationCategory {
        match self {
            EngineError::Project(e) if e.is_parse_failure() => NotificationCategory::Parse,
            EngineError::Project(_) => NotificationCategory::Io,
            EngineError::Codec(CodecError::Io(_)) => NotificationCategory::Io,
            EngineError::Codec(_) => NotificationCategory::Parse,
            EngineError::Setlist(_) => NotificationCategory::Setlist,
            EngineError::Sync(_) => NotificationCategory::Sync,
            EngineError::NoFilePath => NotificationCategory::Io,
            EngineError::Command(_)
            | EngineError::TransportRunning
            | EngineError::InvalidTrack(_)
            | EngineError::InvalidEdit(_) => NotificationCategory::Edit,
        }
    }
}

/// What the caller should do after [`Engine::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Continue,
    Terminate,
}

/// Last state published to the presentation layer
#[derive(Debug, Clone, PartialEq)]
struct Observed {
    running: bool,
    mode: PlayMode,
    bpm: f64,
    time_signature: TimeSignature,
    can_undo: bool,
    can_redo: bool,
    setlist: Option<usize>,
    sync: SyncStatus,
    title: String,
}

pub struct Engine {
    config: EngineConfig,
    context: Arc<EngineContext>,
    performance: Arc<Mutex<Performance>>,
    shared: Arc<SharedTransportState>,
    history: UndoStack,
    setlist: SetlistSequencer,
    projects: ProjectManager,
    recent: RecentFiles,
    codec: Box<dyn MidiCodec>,
    metadata: ProjectMetadata,
    current_path: Option<PathBuf>,
    tap: TapTempo,
    events: EventProducer,
    requests: RequestReceiver,
    request_sender: RequestSender,
    observed: Option<Observed>,
}

impl Engine {
    /// Build an engine with an empty song; the consumer receives its events
    pub fn new(
        config: EngineConfig,
        authority: Box<dyn TransportAuthority>,
        codec: Box<dyn MidiCodec>,
    ) -> (Self, EventConsumer) {
        let context = EngineContext::new();
        let transport = Transport::new(Arc::clone(&context))
            .with_fast_seek(FastSeek::new(config.fast_seek_growth, config.fast_seek_cap));
        let shared = transport.shared_state();
        let performance = Performance::new(
            transport,
            TempoTrack::new(config.default_bpm, config.max_history),
            SyncAdapter::new(authority),
            config.fast_seek_step,
        );
        let (events, consumer) = create_event_channel(config.event_capacity);
        let (request_sender, requests) = create_request_channel();

        let engine = Self {
            context,
            performance: Arc::new(Mutex::new(performance)),
            shared,
            history: UndoStack::with_capacity(config.max_history),
            setlist: SetlistSequencer::new(),
            projects: ProjectManager::new(),
            recent: RecentFiles::in_memory(config.recent_capacity),
            codec,
            metadata: ProjectMetadata::new("Untitled"),
            current_path: None,
            tap: TapTempo::new(config.tap_reset()),
            events,
            requests,
            request_sender,
            observed: None,
            config,
        };
        (engine, consumer)
    }

    /// Use a persisted recent-files list instead of the in-memory one
    pub fn with_recent_files(mut self, recent: RecentFiles) -> Self {
        self.recent = recent;
        self
    }

    // --- accessors ---

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> Arc<EngineContext> {
        Arc::clone(&self.context)
    }

    /// Lock-free transport position for presentation readers
    pub fn transport_state(&self) -> Arc<SharedTransportState> {
        Arc::clone(&self.shared)
    }

    /// Handle for whatever drives the scheduling context
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(Arc::clone(&self.performance))
    }

    /// Sender for out-of-band save/terminate requests
    pub fn request_sender(&self) -> RequestSender {
        self.request_sender.clone()
    }

    /// Read access to the performance for display and tests
    pub fn with_performance<R>(&self, f: impl FnOnce(&Performance) -> R) -> R {
        f(&lock(&self.performance))
    }

    pub fn snapshot(&self) -> TransportState {
        lock(&self.performance).transport.snapshot()
    }

    pub fn musical_position(&self) -> MusicalTime {
        lock(&self.performance).transport.musical_position()
    }

    pub fn sync_status(&self) -> SyncStatus {
        lock(&self.performance).sync.status()
    }

    pub fn is_running(&self) -> bool {
        self.context.is_running()
    }

    pub fn is_modified(&self) -> bool {
        self.context.is_modified()
    }

    pub fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub fn setlist(&self) -> &SetlistSequencer {
        &self.setlist
    }

    pub fn recent_files(&self) -> &RecentFiles {
        &self.recent
    }

    pub fn can_undo(&self) -> bool {
        self.history.has_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.has_redo()
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    // --- notifications ---

    fn notify(&mut self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => log::error!("{}", notification),
            NotificationLevel::Warning => log::warn!("{}", notification),
            NotificationLevel::Info => log::info!("{}", notification),
        }
        publish(&mut self.events, EngineEvent::Notification(notification));
    }

    /// Surface a failure on the event channel, passing the result through
    fn report<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(e) = &result {
            self.notify(Notification::error(e.category(), e.to_string()));
        }
        result
    }

    fn ensure_stopped(&self) -> Result<(), EngineError> {
        if self.context.is_running() {
            Err(EngineError::TransportRunning)
        } else {
            Ok(())
        }
    }

    // --- transport ---

    /// Apply a transport change locally, or forward it to the authority when
    /// slaved; the authority's next report then carries the change
    fn advisory(
        &mut self,
        forward: impl FnOnce(&mut SyncAdapter) -> Result<(), SyncError>,
        apply: impl FnOnce(&mut Performance) -> bool,
    ) -> bool {
        let mut perf = lock(&self.performance);
        let mut lost = None;
        if perf.sync.is_slave() {
            match forward(&mut perf.sync) {
                Ok(()) => return false,
                Err(e) => lost = Some(e),
            }
        }
        let applied = apply(&mut perf);
        drop(perf);

        if let Some(e) = lost {
            self.notify(Notification::warning(
                NotificationCategory::Sync,
                format!("{}; running on local time", e),
            ));
        }
        applied
    }

    /// Returns true if the transport started now (false when already running
    /// or when the start was forwarded to the sync master)
    pub fn start(&mut self) -> bool {
        self.advisory(|sync| sync.request_start(), |perf| perf.start_transport())
    }

    pub fn stop(&mut self) -> bool {
        self.advisory(|sync| sync.request_stop(), |perf| perf.stop_transport())
    }

    pub fn set_position(&mut self, tick: Tick) -> bool {
        self.advisory(
            |sync| sync.request_locate(tick),
            |perf| {
                perf.transport.set_position(tick);
                true
            },
        )
    }

    pub fn set_loop(&mut self, looping: bool) {
        lock(&self.performance).transport.set_loop(looping);
        self.context.set_modified(true);
    }

    pub fn toggle_loop(&mut self) -> bool {
        let looping = !lock(&self.performance).transport.is_looping();
        self.set_loop(looping);
        looping
    }

    pub fn set_left(&mut self, tick: Tick) {
        lock(&self.performance).transport.set_left(tick);
        self.context.set_modified(true);
    }

    pub fn set_right(&mut self, tick: Tick) {
        lock(&self.performance).transport.set_right(tick);
        self.context.set_modified(true);
    }

    /// Begin fast-forward or rewind; false when debounced
    pub fn press_seek(&mut self, direction: SeekDirection) -> bool {
        lock(&self.performance).transport.press_seek(direction)
    }

    pub fn release_seek(&mut self) {
        lock(&self.performance).transport.release_seek();
    }

    /// Returns true if applied now, false if deferred until stop
    pub fn set_play_mode(&mut self, mode: PlayMode) -> bool {
        let applied = lock(&self.performance).request_play_mode(mode);
        if !applied {
            log::info!("Switch to {:?} mode deferred until the transport stops", mode);
        }
        applied
    }

    pub fn set_follow_transport(&mut self, follow: bool) {
        self.context.set_follow_transport(follow);
    }

    // --- sync ---

    /// Connect to the external transport; song mode then starts from the
    /// left marker, live mode from the current position
    pub fn enable_sync(&mut self, prefer_master: bool) -> Result<SyncStatus, EngineError> {
        let result = self.enable_sync_inner(prefer_master);
        self.report(result)
    }

    fn enable_sync_inner(&mut self, prefer_master: bool) -> Result<SyncStatus, EngineError> {
        self.ensure_stopped()?;
        let mut perf = lock(&self.performance);
        let status = perf.sync.enable(prefer_master)?;
        let start = match perf.transport.play_mode() {
            PlayMode::Song => perf.transport.left_tick(),
            PlayMode::Live => perf.transport.position(),
        };
        perf.transport.set_position(start);
        if status == SyncStatus::ConnectedSlave {
            perf.sync.request_locate(start)?;
        }
        Ok(status)
    }

    pub fn disable_sync(&mut self) -> Result<(), EngineError> {
        let result = self.ensure_stopped().map(|()| {
            lock(&self.performance).sync.disable();
        });
        self.report(result)
    }

    // --- edits ---

    /// Capture an undo record and apply an edit under one lock
    ///
    /// Nothing is pushed when either step fails; `apply` must leave the
    /// performance untouched when it returns an error.
    fn edit<T>(
        &mut self,
        capture: impl FnOnce(&mut Performance) -> Result<UndoRecord, EngineError>,
        apply: impl FnOnce(&mut Performance) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut perf = lock(&self.performance);
        let record = capture(&mut perf)?;
        let value = apply(&mut perf)?;
        if record.kind() != UndoKind::Bpm {
            perf.tempo.clear_redo();
        }
        drop(perf);

        self.history.push(record);
        self.context.set_modified(true);
        Ok(value)
    }

    fn loop_span(perf: &Performance) -> (Tick, Tick) {
        (perf.transport.left_tick(), perf.transport.right_tick())
    }

    /// Open a gap of the L-R span at the right marker on every track
    pub fn expand(&mut self) -> Result<(), EngineError> {
        self.edit(
            |perf| Ok(perf.capture_collapse_expand()),
            |perf| {
                let (left, right) = Self::loop_span(perf);
                perf.arrangement.move_triggers(true, left, right);
                Ok(())
            },
        )
    }

    /// Remove the L-R span after the right marker on every track
    pub fn collapse(&mut self) -> Result<(), EngineError> {
        self.edit(
            |perf| Ok(perf.capture_collapse_expand()),
            |perf| {
                let (left, right) = Self::loop_span(perf);
                perf.arrangement.move_triggers(false, left, right);
                Ok(())
            },
        )
    }

    /// Duplicate the L-R span into a gap opened right after it
    pub fn copy(&mut self) -> Result<(), EngineError> {
        self.edit(
            |perf| Ok(perf.capture_collapse_expand()),
            |perf| {
                let (left, right) = Self::loop_span(perf);
                perf.arrangement.copy_triggers(left, right);
                Ok(())
            },
        )
    }

    /// Turn live auditions into triggers over the L-R span
    /// Returns the tracks that received a trigger
    pub fn create_triggers_for_playing_tracks(&mut self) -> Result<Vec<usize>, EngineError> {
        self.ensure_stopped()?;
        let any_playing = self.with_performance(|perf| {
            perf.arrangement
                .tracks()
                .iter()
                .any(|t| t.playing && t.active_pattern.is_some())
        });
        if !any_playing {
            return Ok(Vec::new());
        }
        self.edit(
            |perf| Ok(perf.capture_collapse_expand()),
            |perf| {
                let (left, right) = Self::loop_span(perf);
                Ok(perf
                    .arrangement
                    .create_triggers_for_playing_tracks(left, right))
            },
        )
    }

    pub fn delete_unused_patterns(&mut self) -> Result<usize, EngineError> {
        self.edit(
            |perf| Ok(perf.capture_perf()),
            |perf| Ok(perf.arrangement.delete_unused_patterns()),
        )
    }

    /// Bake the song transpose into the patterns and reset it to zero
    /// Returns the semitones applied
    pub fn apply_transpose(&mut self) -> Result<i32, EngineError> {
        let transpose = self.with_performance(|perf| perf.transport.settings().transpose);
        if transpose == 0 {
            return Ok(0);
        }
        self.edit(
            |perf| Ok(perf.capture_perf()),
            |perf| {
                perf.arrangement
                    .apply_transpose(transpose.clamp(-127, 127) as i8);
                perf.transport.set_transpose(0);
                Ok(transpose)
            },
        )
    }

    pub fn set_song_mute(&mut self, op: MuteOp) -> Result<(), EngineError> {
        self.edit(
            |perf| Ok(perf.capture_perf()),
            |perf| {
                perf.arrangement.set_song_mute(op);
                Ok(())
            },
        )
    }

    pub fn add_track(&mut self, name: impl Into<String>) -> Result<usize, EngineError> {
        let track = Track::new(name);
        self.edit(
            |perf| Ok(perf.capture_perf()),
            |perf| Ok(perf.arrangement.add_track(track)),
        )
    }

    /// Run a single-track edit under a `track` record
    fn edit_track<T>(
        &mut self,
        index: usize,
        apply: impl FnOnce(&mut Track) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.edit(
            |perf| perf.capture_track(index),
            |perf| {
                let track = perf
                    .arrangement
                    .track_mut(index)
                    .ok_or(EngineError::InvalidTrack(index))?;
                apply(track)
            },
        )
    }

    pub fn rename_track(&mut self, index: usize, name: impl Into<String>) -> Result<(), EngineError> {
        let name = name.into();
        self.edit_track(index, |track| {
            track.name = name;
            Ok(())
        })
    }

    /// Returns the new mute state
    pub fn toggle_track_mute(&mut self, index: usize) -> Result<bool, EngineError> {
        self.edit_track(index, |track| {
            track.muted = !track.muted;
            Ok(track.muted)
        })
    }

    /// Flag a track for live-mode audition
    pub fn set_track_playing(&mut self, index: usize, playing: bool) -> Result<(), EngineError> {
        self.edit_track(index, |track| {
            track.playing = playing;
            Ok(())
        })
    }

    pub fn add_pattern(
        &mut self,
        index: usize,
        name: impl Into<String>,
        length: Tick,
    ) -> Result<PatternId, EngineError> {
        let name = name.into();
        self.edit_track(index, |track| Ok(track.add_pattern(name, length)))
    }

    pub fn set_active_pattern(&mut self, index: usize, pattern: PatternId) -> Result<(), EngineError> {
        self.edit_track(index, |track| {
            if track.set_active_pattern(pattern) {
                Ok(())
            } else {
                Err(EngineError::InvalidEdit(format!(
                    "pattern {} does not exist",
                    pattern
                )))
            }
        })
    }

    pub fn add_trigger(
        &mut self,
        index: usize,
        pattern: PatternId,
        start: Tick,
        end: Tick,
    ) -> Result<(), EngineError> {
        self.edit(
            |perf| perf.capture_triggers(index),
            |perf| {
                if perf.arrangement.add_trigger(index, pattern, start, end) {
                    Ok(())
                } else {
                    Err(EngineError::InvalidEdit(format!(
                        "cannot place pattern {} over [{}, {})",
                        pattern, start, end
                    )))
                }
            },
        )
    }

    /// Remove the trigger sounding at `tick`
    pub fn remove_trigger_at(&mut self, index: usize, tick: Tick) -> Result<(), EngineError> {
        self.edit(
            |perf| perf.capture_triggers(index),
            |perf| {
                perf.arrangement
                    .track_mut(index)
                    .and_then(|track| track.remove_trigger_at(tick))
                    .map(|_| ())
                    .ok_or_else(|| EngineError::InvalidEdit(format!("no trigger at {}", tick)))
            },
        )
    }

    // --- tempo ---

    /// Run a tempo edit under its own `bpm` record
    fn edit_tempo(
        &mut self,
        check: impl FnOnce(&TempoTrack) -> Result<(), EngineError>,
        apply: impl FnOnce(&mut TempoTrack),
    ) -> Result<(), EngineError> {
        self.close_tempo_hold();
        self.edit(
            |perf| {
                check(&perf.tempo)?;
                perf.tempo.push_undo();
                Ok(UndoRecord::Bpm)
            },
            |perf| {
                apply(&mut perf.tempo);
                Ok(())
            },
        )
    }

    /// Typed tempo entry: sets the start tempo
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), EngineError> {
        self.edit_tempo(|_| Ok(()), |tempo| tempo.set_start_bpm(bpm))
    }

    pub fn insert_tempo_marker(&mut self, tick: Tick, bpm: f64) -> Result<(), EngineError> {
        self.edit_tempo(|_| Ok(()), |tempo| tempo.insert_marker(tick, bpm))
    }

    pub fn insert_stop_marker(&mut self, tick: Tick) -> Result<(), EngineError> {
        self.edit_tempo(|_| Ok(()), |tempo| tempo.insert_stop_marker(tick))
    }

    pub fn remove_tempo_marker(&mut self, tick: Tick) -> Result<(), EngineError> {
        self.edit_tempo(
            |tempo| {
                if tick != 0 && tempo.markers().iter().any(|m| m.tick == tick) {
                    Ok(())
                } else {
                    Err(EngineError::InvalidEdit(format!(
                        "no removable tempo marker at {}",
                        tick
                    )))
                }
            },
            |tempo| {
                tempo.remove_marker(tick);
            },
        )
    }

    /// Nudge the start tempo; repeated nudges coalesce until released
    pub fn nudge_bpm(&mut self, delta: f64) -> f64 {
        let bpm = {
            let mut perf = lock(&self.performance);
            perf.tempo.begin_hold();
            let bpm = perf.tempo.start_bpm() + delta;
            perf.tempo.set_start_bpm(bpm);
            perf.tempo.start_bpm()
        };
        self.context.set_modified(true);
        bpm
    }

    pub fn release_bpm_nudge(&mut self) {
        self.close_tempo_hold();
    }

    /// Register a tap; from the second tap on the start tempo follows the
    /// tapped rate. Returns the tempo applied, if any.
    pub fn tap_tempo(&mut self, now: Instant) -> Option<f64> {
        if self.tap.is_expired(now) {
            self.close_tempo_hold();
        }
        let tap = self.tap.tap(now);
        let mut perf = lock(&self.performance);
        perf.tempo.begin_hold();
        match tap {
            Tap::Started => None,
            Tap::Bpm(bpm) => {
                perf.tempo.set_start_bpm(bpm);
                let applied = perf.tempo.start_bpm();
                drop(perf);
                self.context.set_modified(true);
                Some(applied)
            }
        }
    }

    /// Close an open nudge or tap window, pushing one `bpm` record
    pub fn release_tap(&mut self) {
        self.close_tempo_hold();
    }

    fn close_tempo_hold(&mut self) {
        self.tap.reset();
        let closed = lock(&self.performance).tempo.end_hold();
        if closed {
            self.history.push(UndoRecord::Bpm);
        }
    }

    // --- transport settings ---

    pub fn set_time_signature(&mut self, beats_per_measure: u8, beat_width: u8) -> Result<(), EngineError> {
        let signature = TimeSignature::checked(beats_per_measure, beat_width).ok_or_else(|| {
            EngineError::InvalidEdit(format!(
                "{}/{} is not a valid time signature",
                beats_per_measure, beat_width
            ))
        })?;
        lock(&self.performance).transport.set_time_signature(signature);
        self.context.set_modified(true);
        Ok(())
    }

    pub fn set_swing(&mut self, swing_amount_8: i32, swing_amount_16: i32) {
        lock(&self.performance)
            .transport
            .set_swing(swing_amount_8, swing_amount_16);
        self.context.set_modified(true);
    }

    pub fn set_transpose(&mut self, transpose: i32) {
        lock(&self.performance)
            .transport
            .set_transpose(transpose.clamp(-127, 127));
        self.context.set_modified(true);
    }

    // --- history ---

    /// Open an edit hold for a continuous gesture such as a drag
    ///
    /// Until [`Engine::end_edit_hold`], repeated edits of one kind on one
    /// track leave a single undo entry. Undo and redo are refused meanwhile.
    pub fn begin_edit_hold(&mut self) {
        self.history.begin_hold();
    }

    pub fn is_edit_hold_open(&self) -> bool {
        self.history.is_holding()
    }

    /// Close the edit hold; returns the kind of the entry it left, if any
    pub fn end_edit_hold(&mut self) -> Option<UndoKind> {
        self.history.end_hold()
    }

    /// Undo the last edit; refused while a tempo hold window is open
    pub fn undo(&mut self) -> Result<UndoKind, EngineError> {
        let result = {
            let mut perf = lock(&self.performance);
            if perf.tempo.is_holding() {
                Err(CommandError::HoldOpen)
            } else {
                self.history.undo(&mut *perf)
            }
        };
        let kind = result?;
        self.context.set_modified(true);
        log::debug!("Undid {}", kind);
        Ok(kind)
    }

    pub fn redo(&mut self) -> Result<UndoKind, EngineError> {
        let result = {
            let mut perf = lock(&self.performance);
            if perf.tempo.is_holding() {
                Err(CommandError::HoldOpen)
            } else {
                self.history.redo(&mut *perf)
            }
        };
        let kind = result?;
        self.context.set_modified(true);
        log::debug!("Redid {}", kind);
        Ok(kind)
    }

    // --- files ---

    /// Swap a fully parsed project in, stopping the transport first
    fn install(&mut self, project: Project, path: Option<PathBuf>) {
        let Project {
            metadata,
            transport,
            arrangement,
            tempo_markers,
            ..
        } = project;
        {
            let mut perf = lock(&self.performance);
            perf.stop_transport();
            perf.arrangement = arrangement;
            perf.arrangement.reseat_serials();

            perf.tempo.reset();
            if !tempo_markers.iter().any(|m| m.tick == 0) {
                perf.tempo.set_start_bpm(transport.bpm);
            }
            perf.tempo.load_markers(tempo_markers);

            perf.transport.set_settings(transport.settings);
            perf.transport.set_right(transport.right_tick);
            perf.transport.set_left(transport.left_tick);
            perf.transport.set_loop(transport.looping);
            perf.request_play_mode(transport.play_mode);
            let left = perf.transport.left_tick();
            perf.transport.set_position(left);
            perf.take_stop_reached();
        }
        self.history.clear();
        self.tap.reset();
        self.metadata = metadata;
        self.current_path = path;
        self.context.set_modified(false);
    }

    fn refresh_setlist_mode(&mut self) {
        let enabled = self.setlist.is_enabled();
        lock(&self.performance).set_stop_at_song_end(enabled);
    }

    /// Start over with an empty song; leaves setlist mode
    pub fn new_file(&mut self) {
        self.setlist.disable();
        self.install(Project::new("Untitled"), None);
        self.refresh_setlist_mode();
        log::info!("New song");
    }

    fn load_song(&mut self, path: &Path) -> Result<(), EngineError> {
        let project = self
            .projects
            .load_project(path, &ProjectLoadOptions::default())?;
        self.install(project, Some(path.to_path_buf()));
        Ok(())
    }

    /// Load a native project file; on failure the current song is kept
    pub fn open_file(&mut self, path: &Path) -> Result<(), EngineError> {
        let result = self.load_song(path);
        if result.is_ok() && !self.setlist.is_enabled() {
            self.recent.add(path);
        }
        self.report(result)
    }

    fn build_project(&self, perf: &Performance) -> Project {
        let transport = &perf.transport;
        let setlist = self.setlist.is_enabled().then(|| {
            self.setlist.source().map(|source| SetlistInfo {
                setlist: source.to_path_buf(),
                song_index: self.setlist.current_index(),
            })
        });
        let mut metadata = self.metadata.clone();
        metadata.touch();
        Project {
            metadata,
            transport: TransportFile {
                bpm: perf.tempo.start_bpm(),
                settings: *transport.settings(),
                left_tick: transport.left_tick(),
                right_tick: transport.right_tick(),
                looping: transport.is_looping(),
                play_mode: transport.play_mode(),
            },
            arrangement: perf.arrangement.clone(),
            tempo_markers: perf.tempo.markers().to_vec(),
            setlist: setlist.flatten(),
        }
    }

    fn save_to(&mut self, path: &Path) -> Result<(), EngineError> {
        let project = {
            let mut perf = lock(&self.performance);
            perf.stop_transport();
            self.build_project(&perf)
        };
        self.projects.save_project(&project, path)?;
        self.metadata = project.metadata;
        self.context.set_modified(false);
        Ok(())
    }

    /// Save to the current file
    pub fn save(&mut self) -> Result<(), EngineError> {
        let result = match self.current_path.clone() {
            Some(path) => self.save_to(&path),
            None => Err(EngineError::NoFilePath),
        };
        self.report(result)
    }

    pub fn save_as(&mut self, path: &Path) -> Result<(), EngineError> {
        let result = self.save_to(path);
        if result.is_ok() {
            self.current_path = Some(path.to_path_buf());
            if !self.setlist.is_enabled() {
                self.recent.add(path);
            }
        }
        self.report(result)
    }

    /// Export patterns (`song == false`) or the rendered arrangement
    pub fn export_midi(
        &mut self,
        path: &Path,
        song: bool,
        selector: ExportSelector,
    ) -> Result<(), EngineError> {
        let (arrangement, tempo) = self.with_performance(|perf| {
            (perf.arrangement.clone(), perf.tempo.clone())
        });
        let result = if song {
            self.codec.write_song(path, &arrangement, &tempo, selector)
        } else {
            self.codec.write_patterns(path, &arrangement, selector)
        };
        self.report(result.map_err(EngineError::from))
    }

    /// Merge a MIDI file into the song at a pattern bank (-1 appends a bank)
    /// Returns the number of tracks added
    pub fn import_midi(&mut self, path: &Path, bank: i32) -> Result<usize, EngineError> {
        let result = self.import_midi_inner(path, bank);
        self.report(result)
    }

    fn import_midi_inner(&mut self, path: &Path, bank: i32) -> Result<usize, EngineError> {
        let bank = BankOffset::new(bank)?;
        let (mut arrangement, mut tempo) = self.with_performance(|perf| {
            (perf.arrangement.clone(), perf.tempo.clone())
        });
        let record = UndoRecord::Import(Box::new(ImportSnapshot {
            arrangement: arrangement.clone(),
            tempo: tempo.markers().to_vec(),
        }));

        // Parsing works on copies; a failure leaves the song and both
        // history stacks as they were
        let count = self.codec.parse(path, &mut arrangement, &mut tempo, bank)?;

        self.history.push(record);
        let mut perf = lock(&self.performance);
        perf.tempo.clear_redo();
        perf.arrangement = arrangement;
        perf.arrangement.reseat_serials();
        perf.tempo.load_markers(tempo.markers().to_vec());
        drop(perf);
        self.context.set_modified(true);
        log::info!("Imported {} tracks from {}", count, path.display());
        Ok(count)
    }

    // --- setlist ---

    /// Read a setlist file, enter setlist mode and load the first song
    /// With `verify`, every song is loaded once first.
    pub fn open_setlist(&mut self, path: &Path, verify: bool) -> Result<JumpOutcome, EngineError> {
        let result = self.open_setlist_inner(path, verify);
        self.report(result)
    }

    fn open_setlist_inner(&mut self, path: &Path, verify: bool) -> Result<JumpOutcome, EngineError> {
        self.ensure_stopped()?;
        self.setlist.load_file(path)?;
        self.run_setlist(0, verify)
    }

    /// Step to the previous (-1) or next (+1) song, or reload (0)
    pub fn jump_setlist(&mut self, delta: i32) -> Result<JumpOutcome, EngineError> {
        let result = self
            .ensure_stopped()
            .and_then(|()| self.run_setlist(delta, false));
        self.report(result)
    }

    /// Load every song of the setlist, ending on the first
    pub fn verify_setlist(&mut self) -> Result<JumpOutcome, EngineError> {
        let result = self
            .ensure_stopped()
            .and_then(|()| self.run_setlist(0, true));
        self.report(result)
    }

    fn run_setlist(&mut self, delta: i32, verify: bool) -> Result<JumpOutcome, EngineError> {
        let mut setlist = std::mem::take(&mut self.setlist);
        let result = setlist.jump(delta, verify, |path| self.load_song(path));
        self.setlist = setlist;
        self.finish_setlist_step(result)
    }

    fn advance_setlist(&mut self) -> Result<JumpOutcome, EngineError> {
        let mut setlist = std::mem::take(&mut self.setlist);
        let result = setlist.advance_on_stop_marker(|path| self.load_song(path));
        self.setlist = setlist;
        self.finish_setlist_step(result)
    }

    /// An entry failure has already left setlist mode; fall back to an
    /// empty song
    fn finish_setlist_step(
        &mut self,
        result: Result<JumpOutcome, SetlistError>,
    ) -> Result<JumpOutcome, EngineError> {
        if let Err(e) = &result
            && e.failed_index().is_some()
        {
            self.install(Project::new("Untitled"), None);
        }
        self.refresh_setlist_mode();
        Ok(result?)
    }

    // --- control loop ---

    /// Drain out-of-band requests, advance the setlist after a stop marker
    /// and publish state changes
    pub fn poll(&mut self) -> PollOutcome {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&mut self, now: Instant) -> PollOutcome {
        if self.tap.is_expired(now) {
            self.close_tempo_hold();
        }

        let halted = {
            let mut perf = lock(&self.performance);
            !perf.transport.is_running() && perf.take_stop_reached()
        };
        if halted && self.setlist.is_enabled() {
            let result = self.advance_setlist();
            if let Ok(JumpOutcome::Boundary) = result {
                self.notify(Notification::info(
                    NotificationCategory::Setlist,
                    "End of setlist reached",
                ));
            }
            let _ = self.report(result);
        }

        let mut outcome = PollOutcome::Continue;
        let requests: Vec<ControlRequest> = self.requests.try_iter().collect();
        for request in requests {
            match request {
                ControlRequest::Save => {
                    let _ = self.save();
                }
                ControlRequest::Terminate => {
                    self.shutdown();
                    outcome = PollOutcome::Terminate;
                }
            }
        }

        self.publish_changes();
        outcome
    }

    /// Stop, save unattended if there are unsaved changes, and disconnect
    pub fn shutdown(&mut self) {
        self.close_tempo_hold();
        self.stop();
        if self.context.is_modified() && self.current_path.is_some() {
            let _ = self.save();
        }
        lock(&self.performance).sync.disable();
        log::info!("Engine shut down");
    }

    /// `perfseq - ...` title for the presentation layer
    pub fn display_title(&self) -> String {
        let body = match self.setlist.title() {
            Some(title) => title,
            None => match &self.current_path {
                Some(path) => format!("song - {}", path.display()),
                None => "song - unsaved".to_string(),
            },
        };
        format!("perfseq - {}", body)
    }

    fn observe(&self) -> Observed {
        let perf = lock(&self.performance);
        Observed {
            running: perf.transport.is_running(),
            mode: perf.transport.play_mode(),
            bpm: perf.tempo.active_bpm(perf.transport.position()),
            time_signature: perf.transport.time_signature(),
            can_undo: self.history.has_undo(),
            can_redo: self.history.has_redo(),
            setlist: self
                .setlist
                .is_enabled()
                .then(|| self.setlist.current_index()),
            sync: perf.sync.status(),
            title: self.display_title(),
        }
    }

    fn publish_changes(&mut self) {
        let now = self.observe();
        let before = self.observed.take();
        let changed = |field: fn(&Observed) -> EngineEvent| {
            let event = field(&now);
            match &before {
                Some(before) if field(before) == event => None,
                _ => Some(event),
            }
        };

        let events: Vec<EngineEvent> = [
            changed(|o| EngineEvent::RunningChanged(o.running)),
            changed(|o| EngineEvent::PlayModeChanged(o.mode)),
            changed(|o| EngineEvent::BpmChanged(o.bpm)),
            changed(|o| EngineEvent::TimeSignatureChanged(o.time_signature)),
            changed(|o| EngineEvent::HistoryChanged {
                can_undo: o.can_undo,
                can_redo: o.can_redo,
            }),
            changed(|o| EngineEvent::SetlistPositionChanged(o.setlist)),
            changed(|o| EngineEvent::SyncStatusChanged(o.sync)),
            changed(|o| EngineEvent::TitleChanged(o.title.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();

        for event in events {
            publish(&mut self.events, event);
        }
        self.observed = Some(now);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.current_path)
            .field("modified", &self.context.is_modified())
            .field("undo", &self.history.undo_count())
            .field("redo", &self.history.redo_count())
            .field("setlist", &self.setlist.is_enabled())
            .finish()
    }
}
