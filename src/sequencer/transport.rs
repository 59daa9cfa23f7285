// Transport - Authoritative tick clock
// Play/stop state, loop region, playhead position and fast-forward/rewind

use super::timeline::{MusicalTime, PPQN, Tempo, Tick, TimeSignature};
use crate::engine::context::EngineContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Where `start()` begins and what the scheduler evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayMode {
    /// Trigger-driven arrangement playback, starting at the left marker
    Song,
    /// Tracks flagged playing loop their active pattern, resuming in place
    Live,
}

impl Default for PlayMode {
    fn default() -> Self {
        PlayMode::Song
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Rewind,
}

/// Per-song transport settings persisted in the native project file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportSettings {
    pub time_signature: TimeSignature,
    pub swing_amount_8: i32,
    pub swing_amount_16: i32,
    pub transpose: i32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            time_signature: TimeSignature::four_four(),
            swing_amount_8: 0,
            swing_amount_16: 0,
            transpose: 0,
        }
    }
}

/// Point-in-time copy of everything the presentation layer shows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportState {
    pub current_tick: Tick,
    pub is_running: bool,
    pub is_looping: bool,
    pub left_tick: Tick,
    pub right_tick: Tick,
    pub beats_per_measure: u8,
    pub beat_width: u8,
    pub bpm: f64,
    pub swing_amount_8: i32,
    pub swing_amount_16: i32,
    pub transpose: i32,
}

/// Result of one clock step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceResult {
    pub from: Tick,
    pub to: Tick,
    /// The step crossed the right marker and restarted at the left marker
    pub wrapped: bool,
}

impl AdvanceResult {
    fn still(tick: Tick) -> Self {
        Self {
            from: tick,
            to: tick,
            wrapped: false,
        }
    }
}

/// Shared transport position
/// Lock-free reads for the presentation layer, writes come from the scheduler
#[derive(Debug)]
pub struct SharedTransportState {
    current_tick: AtomicU64,
    looping: AtomicBool,
    left_tick: AtomicU64,
    right_tick: AtomicU64,
}

impl SharedTransportState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick.load(Ordering::Acquire)
    }

    fn set_current_tick(&self, tick: Tick) {
        self.current_tick.store(tick, Ordering::Release);
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    /// Loop region (left, right) in ticks
    pub fn loop_region(&self) -> (Tick, Tick) {
        (
            self.left_tick.load(Ordering::Relaxed),
            self.right_tick.load(Ordering::Relaxed),
        )
    }

    fn set_loop_region(&self, left: Tick, right: Tick) {
        debug_assert!(left < right, "Left marker must be before right marker");
        self.left_tick.store(left, Ordering::Relaxed);
        self.right_tick.store(right, Ordering::Relaxed);
    }
}

impl Default for SharedTransportState {
    fn default() -> Self {
        Self {
            current_tick: AtomicU64::new(0),
            looping: AtomicBool::new(false),
            left_tick: AtomicU64::new(0),
            right_tick: AtomicU64::new(PPQN * 16),
        }
    }
}

/// Fast-forward / rewind acceleration state
///
/// Only one direction can be held at a time. Auto-repeated presses of the
/// held direction and presses of the other direction are ignored until the
/// release.
#[derive(Debug, Clone)]
pub struct FastSeek {
    direction: Option<SeekDirection>,
    multiplier: f64,
    growth: f64,
    cap: f64,
}

impl FastSeek {
    pub fn new(growth: f64, cap: f64) -> Self {
        Self {
            direction: None,
            multiplier: 1.0,
            growth,
            cap,
        }
    }

    /// Returns false when the press was debounced
    pub fn press(&mut self, direction: SeekDirection) -> bool {
        if self.direction.is_some() {
            return false;
        }
        self.direction = Some(direction);
        self.multiplier = 1.0;
        true
    }

    pub fn release(&mut self) {
        self.direction = None;
        self.multiplier = 1.0;
    }

    pub fn direction(&self) -> Option<SeekDirection> {
        self.direction
    }

    /// Multiplier the next step will use
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// One scheduler step: yields the multiplier to apply, then accelerates
    pub fn step(&mut self) -> Option<(SeekDirection, f64)> {
        let direction = self.direction?;
        let current = self.multiplier;
        self.multiplier = (current * self.growth).min(self.cap);
        Some((direction, current))
    }
}

impl Default for FastSeek {
    fn default() -> Self {
        Self::new(1.1, 60.0)
    }
}

/// Transport clock
///
/// Owns the sub-tick remainder so tempo changes and loop wraps never drift.
/// Mutated only by the scheduler and by control commands under the
/// performance lock; position and flags are mirrored into atomics.
pub struct Transport {
    shared_state: Arc<SharedTransportState>,
    context: Arc<EngineContext>,
    settings: TransportSettings,
    bpm: f64,
    fraction: f64,
    fast_seek: FastSeek,
}

impl Transport {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self {
            shared_state: SharedTransportState::new(),
            context,
            settings: TransportSettings::default(),
            bpm: Tempo::default().bpm(),
            fraction: 0.0,
            fast_seek: FastSeek::default(),
        }
    }

    pub fn with_fast_seek(mut self, fast_seek: FastSeek) -> Self {
        self.fast_seek = fast_seek;
        self
    }

    /// Shared state handle for lock-free readers
    pub fn shared_state(&self) -> Arc<SharedTransportState> {
        Arc::clone(&self.shared_state)
    }

    pub fn is_running(&self) -> bool {
        self.context.is_running()
    }

    pub fn play_mode(&self) -> PlayMode {
        self.context.play_mode()
    }

    pub fn set_play_mode(&mut self, mode: PlayMode) {
        self.context.set_play_mode(mode);
    }

    /// Start playback. Song mode begins at the left marker, live mode resumes.
    /// Returns false if the transport was already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        if self.play_mode() == PlayMode::Song {
            let (left, _) = self.shared_state.loop_region();
            self.set_position(left);
        }
        self.context.set_running(true);
        true
    }

    /// Stop playback, keeping the playhead where it is
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.context.set_running(false);
        self.fraction = 0.0;
        true
    }

    pub fn position(&self) -> Tick {
        self.shared_state.current_tick()
    }

    pub fn set_position(&mut self, tick: Tick) {
        self.fraction = 0.0;
        self.shared_state.set_current_tick(tick);
    }

    /// Move the playhead to an externally reported fractional tick
    pub fn follow_external(&mut self, tick: f64) -> AdvanceResult {
        let from = self.position();
        let tick = tick.max(0.0);
        let whole = tick.floor();
        self.fraction = tick - whole;
        let to = whole as Tick;
        self.shared_state.set_current_tick(to);
        AdvanceResult {
            from,
            to,
            wrapped: to < from,
        }
    }

    /// Advance by a fractional number of ticks
    ///
    /// While looping, reaching the right marker wraps to the left marker with
    /// the overshoot and the sub-tick remainder preserved. A playhead outside
    /// the loop region enters it at the left marker, so a looping transport
    /// always ends the step inside `[left, right)`.
    pub fn advance(&mut self, delta_ticks: f64) -> AdvanceResult {
        let from = self.position();
        if !self.is_running() || !(delta_ticks > 0.0) {
            return AdvanceResult::still(from);
        }

        self.fraction += delta_ticks;
        let whole = self.fraction.floor();
        self.fraction -= whole;

        let mut to = from + whole as Tick;
        let mut wrapped = false;

        if self.shared_state.is_looping() {
            let (left, right) = self.shared_state.loop_region();
            if right > left && (from < left || to >= right) {
                let span = right - left;
                let travelled = if (left..right).contains(&from) {
                    to - right
                } else {
                    to - from
                };
                to = left + travelled % span;
                wrapped = true;
            }
        }

        self.shared_state.set_current_tick(to);
        AdvanceResult { from, to, wrapped }
    }

    /// Advance by the ticks elapsed over a wall-clock duration at the current bpm
    pub fn advance_by_time(&mut self, elapsed: Duration) -> AdvanceResult {
        let delta = Tempo::clamped(self.bpm).ticks_in(elapsed);
        self.advance(delta)
    }

    pub fn is_looping(&self) -> bool {
        self.shared_state.is_looping()
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.shared_state.looping.store(looping, Ordering::Relaxed);
    }

    pub fn left_tick(&self) -> Tick {
        self.shared_state.loop_region().0
    }

    pub fn right_tick(&self) -> Tick {
        self.shared_state.loop_region().1
    }

    /// Move the left marker, pushing the right marker a measure of 4/4 ahead
    /// when it would no longer be after the left one
    pub fn set_left(&mut self, tick: Tick) {
        let (_, mut right) = self.shared_state.loop_region();
        if tick >= right {
            right = tick + PPQN * 4;
        }
        self.shared_state.set_loop_region(tick, right);
    }

    /// Move the right marker, pulling the left marker back a measure of 4/4
    /// when it would no longer be before the right one. Zero is ignored.
    pub fn set_right(&mut self, tick: Tick) {
        if tick == 0 {
            return;
        }
        let (mut left, _) = self.shared_state.loop_region();
        if tick <= left {
            left = tick.saturating_sub(PPQN * 4);
        }
        self.shared_state.set_loop_region(left, tick);
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = Tempo::clamped(bpm).bpm();
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: TransportSettings) {
        self.settings = settings;
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.settings.time_signature
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.settings.time_signature = time_signature;
    }

    pub fn set_swing(&mut self, swing_amount_8: i32, swing_amount_16: i32) {
        self.settings.swing_amount_8 = swing_amount_8;
        self.settings.swing_amount_16 = swing_amount_16;
    }

    pub fn set_transpose(&mut self, transpose: i32) {
        self.settings.transpose = transpose;
    }

    pub fn fast_seek(&self) -> &FastSeek {
        &self.fast_seek
    }

    /// Press a seek direction; false when debounced
    pub fn press_seek(&mut self, direction: SeekDirection) -> bool {
        self.fast_seek.press(direction)
    }

    pub fn release_seek(&mut self) {
        self.fast_seek.release();
    }

    /// Apply one accelerated seek step of `base_ticks`; rewind stops at zero
    pub fn apply_fast_seek(&mut self, base_ticks: Tick) -> bool {
        let Some((direction, multiplier)) = self.fast_seek.step() else {
            return false;
        };
        let amount = (base_ticks as f64 * multiplier).round() as Tick;
        let position = self.position();
        let target = match direction {
            SeekDirection::Forward => position.saturating_add(amount),
            SeekDirection::Rewind => position.saturating_sub(amount),
        };
        self.set_position(target);
        true
    }

    /// Current position as bar:beat:tick
    pub fn musical_position(&self) -> MusicalTime {
        MusicalTime::from_total_ticks(self.position(), &self.settings.time_signature)
    }

    pub fn snapshot(&self) -> TransportState {
        let (left_tick, right_tick) = self.shared_state.loop_region();
        TransportState {
            current_tick: self.position(),
            is_running: self.is_running(),
            is_looping: self.is_looping(),
            left_tick,
            right_tick,
            beats_per_measure: self.settings.time_signature.beats_per_measure,
            beat_width: self.settings.time_signature.beat_width,
            bpm: self.bpm,
            swing_amount_8: self.settings.swing_amount_8,
            swing_amount_16: self.settings.swing_amount_16,
            transpose: self.settings.transpose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> Transport {
        Transport::new(EngineContext::new())
    }

    #[test]
    fn test_start_stop() {
        let mut transport = transport();
        assert!(!transport.is_running());

        assert!(transport.start());
        assert!(transport.is_running());
        assert!(!transport.start(), "second start is a no-op");

        assert!(transport.stop());
        assert!(!transport.is_running());
        assert!(!transport.stop());
    }

    #[test]
    fn test_song_mode_starts_at_left() {
        let mut transport = transport();
        transport.set_left(PPQN * 4);
        transport.set_position(PPQN * 10);

        transport.start();
        assert_eq!(transport.position(), PPQN * 4);
    }

    #[test]
    fn test_live_mode_resumes() {
        let mut transport = transport();
        transport.set_play_mode(PlayMode::Live);
        transport.set_left(PPQN * 4);
        transport.set_position(PPQN * 10);

        transport.start();
        assert_eq!(transport.position(), PPQN * 10);
    }

    #[test]
    fn test_advance_accumulates_fraction() {
        let mut transport = transport();
        transport.start();

        for _ in 0..4 {
            transport.advance(0.25);
        }
        assert_eq!(transport.position(), 1);

        transport.advance(2.5);
        transport.advance(0.5);
        assert_eq!(transport.position(), 4);
    }

    #[test]
    fn test_advance_ignored_when_stopped() {
        let mut transport = transport();
        let result = transport.advance(100.0);
        assert_eq!(result.to, 0);
        assert_eq!(transport.position(), 0);
    }

    #[test]
    fn test_loop_wrap_keeps_overshoot() {
        let mut transport = transport();
        transport.set_right(96);
        transport.set_left(0);
        transport.set_loop(true);
        transport.start();
        transport.set_position(90);

        let result = transport.advance(10.5);
        assert!(result.wrapped);
        // 90 + 10 = 100, 4 past the right marker
        assert_eq!(result.to, 4);

        // The half tick left over is not lost
        transport.advance(0.5);
        assert_eq!(transport.position(), 5);
    }

    #[test]
    fn test_loop_wrap_from_past_right_marker() {
        let mut transport = transport();
        transport.set_right(192);
        transport.set_left(96);
        transport.set_play_mode(PlayMode::Live);
        transport.set_loop(true);
        transport.set_position(400);
        transport.start();

        let result = transport.advance(10.0);
        assert!(result.wrapped);
        assert_eq!(result.to, 106);
    }

    #[test]
    fn test_loop_entered_from_before_left_marker() {
        let mut transport = transport();
        transport.set_right(384);
        transport.set_left(192);
        transport.set_play_mode(PlayMode::Live);
        transport.set_loop(true);
        transport.start();
        assert_eq!(transport.position(), 0);

        let result = transport.advance(10.0);
        assert!(result.wrapped);
        assert_eq!(result.to, 202);
    }

    #[test]
    fn test_markers_stay_ordered() {
        let mut transport = transport();
        transport.set_right(PPQN * 8);

        transport.set_left(PPQN * 10);
        assert_eq!(transport.left_tick(), PPQN * 10);
        assert_eq!(transport.right_tick(), PPQN * 14);

        transport.set_right(PPQN * 2);
        assert_eq!(transport.right_tick(), PPQN * 2);
        assert_eq!(transport.left_tick(), 0);

        transport.set_right(0);
        assert_eq!(transport.right_tick(), PPQN * 2);
    }

    #[test]
    fn test_fast_seek_acceleration() {
        let mut seek = FastSeek::new(1.1, 60.0);
        assert!(seek.press(SeekDirection::Forward));

        for n in 0..80 {
            let expected = 1.1f64.powi(n).min(60.0);
            assert!((seek.multiplier() - expected).abs() < 1e-6 * expected);
            seek.step();
        }
        assert_eq!(seek.multiplier(), 60.0);

        seek.release();
        assert_eq!(seek.multiplier(), 1.0);
        assert!(seek.step().is_none());
    }

    #[test]
    fn test_fast_seek_debounce() {
        let mut seek = FastSeek::default();
        assert!(seek.press(SeekDirection::Rewind));
        seek.step();
        assert!(!seek.press(SeekDirection::Rewind), "auto-repeat ignored");
        assert!(!seek.press(SeekDirection::Forward), "other direction ignored");
        assert_eq!(seek.direction(), Some(SeekDirection::Rewind));
        assert!(seek.multiplier() > 1.0);
    }

    #[test]
    fn test_apply_fast_seek() {
        let mut transport = transport();
        transport.set_position(1000);

        assert!(transport.press_seek(SeekDirection::Rewind));
        assert!(transport.apply_fast_seek(100));
        assert_eq!(transport.position(), 900);
        assert!(transport.apply_fast_seek(100));
        assert_eq!(transport.position(), 790);

        for _ in 0..50 {
            transport.apply_fast_seek(100);
        }
        assert_eq!(transport.position(), 0, "rewind stops at zero");

        transport.release_seek();
        assert!(!transport.apply_fast_seek(100));
    }

    #[test]
    fn test_snapshot() {
        let mut transport = transport();
        transport.set_bpm(133.0);
        transport.set_swing(10, 20);
        transport.set_transpose(-2);
        transport.set_time_signature(TimeSignature::three_four());

        let state = transport.snapshot();
        assert_eq!(state.bpm, 133.0);
        assert_eq!(state.beats_per_measure, 3);
        assert_eq!(state.swing_amount_16, 20);
        assert_eq!(state.transpose, -2);
        assert!(state.left_tick < state.right_tick);
    }
}
