// Timeline - Musical time representation
// Tick resolution, time signatures, tempo values and bar:beat:tick display

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Absolute position on the song timeline, in ticks
pub type Tick = u64;

/// Ticks per quarter note (PPQN)
pub const PPQN: Tick = 192;

/// Lowest tempo accepted anywhere in the engine
pub const MIN_BPM: f64 = 20.0;

/// Highest tempo accepted anywhere in the engine
pub const MAX_BPM: f64 = 600.0;

/// Time signature (beats per measure / beat width)
/// Example: 6/8 time = TimeSignature { beats_per_measure: 6, beat_width: 8 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats_per_measure: u8,
    pub beat_width: u8,
}

impl TimeSignature {
    /// Creates a new time signature
    pub fn new(beats_per_measure: u8, beat_width: u8) -> Self {
        assert!(beats_per_measure > 0, "Beats per measure must be > 0");
        assert!(
            beat_width.is_power_of_two(),
            "Beat width must be a power of 2"
        );
        Self {
            beats_per_measure,
            beat_width,
        }
    }

    /// Validating constructor for values coming from the operator or a file
    pub fn checked(beats_per_measure: u8, beat_width: u8) -> Option<Self> {
        let signature = Self {
            beats_per_measure,
            beat_width,
        };
        signature.is_valid().then_some(signature)
    }

    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    pub fn six_eight() -> Self {
        Self::new(6, 8)
    }

    /// Numerator 1..=32, power-of-two denominator up to 32
    pub fn is_valid(&self) -> bool {
        (1..=32).contains(&self.beats_per_measure)
            && self.beat_width.is_power_of_two()
            && self.beat_width <= 32
    }

    /// Length of one beat in ticks (a quarter note is PPQN ticks)
    pub fn ticks_per_beat(&self) -> Tick {
        PPQN * 4 / self.beat_width as Tick
    }

    /// Length of one measure in ticks
    pub fn ticks_per_measure(&self) -> Tick {
        self.ticks_per_beat() * self.beats_per_measure as Tick
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_measure, self.beat_width)
    }
}

/// Tempo in BPM (quarter notes per minute)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo
    /// BPM must be in range [MIN_BPM, MAX_BPM]
    pub fn new(bpm: f64) -> Self {
        assert!(
            (MIN_BPM..=MAX_BPM).contains(&bpm),
            "BPM must be between 20 and 600"
        );
        Self { bpm }
    }

    /// Creates a tempo, clamping out-of-range or non-finite input
    pub fn clamped(bpm: f64) -> Self {
        if bpm.is_finite() {
            Self {
                bpm: bpm.clamp(MIN_BPM, MAX_BPM),
            }
        } else {
            Self::default()
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one quarter note in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Tick rate at this tempo
    pub fn ticks_per_second(&self) -> f64 {
        self.bpm / 60.0 * PPQN as f64
    }

    /// Fractional number of ticks elapsed over a wall-clock duration
    pub fn ticks_in(&self, elapsed: Duration) -> f64 {
        elapsed.as_secs_f64() * self.ticks_per_second()
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Musical time representation
/// A position expressed as measure, beat and tick within the beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MusicalTime {
    pub bar: u32,  // 1-based
    pub beat: u8,  // 1-based
    pub tick: u16, // 0-based, within the beat
}

impl MusicalTime {
    pub fn new(bar: u32, beat: u8, tick: u16) -> Self {
        Self { bar, beat, tick }
    }

    /// Bar 1, beat 1, tick 0
    pub fn zero() -> Self {
        Self::new(1, 1, 0)
    }

    /// Convert to total ticks from the song start
    pub fn to_total_ticks(&self, time_signature: &TimeSignature) -> Tick {
        let bar_0 = self.bar.saturating_sub(1) as Tick;
        let beat_0 = self.beat.saturating_sub(1) as Tick;

        bar_0 * time_signature.ticks_per_measure()
            + beat_0 * time_signature.ticks_per_beat()
            + self.tick as Tick
    }

    /// Create from total ticks
    pub fn from_total_ticks(total_ticks: Tick, time_signature: &TimeSignature) -> Self {
        let ticks_per_beat = time_signature.ticks_per_beat();
        let ticks_per_bar = time_signature.ticks_per_measure();

        let bar = total_ticks / ticks_per_bar + 1;
        let remaining = total_ticks % ticks_per_bar;
        let beat = remaining / ticks_per_beat + 1;
        let tick = remaining % ticks_per_beat;

        Self::new(bar as u32, beat as u8, tick as u16)
    }
}

impl Default for MusicalTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{}:{:03}", self.bar, self.beat, self.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_signature() {
        let ts = TimeSignature::four_four();
        assert_eq!(ts.ticks_per_beat(), PPQN);
        assert_eq!(ts.ticks_per_measure(), PPQN * 4);
        assert_eq!(ts.to_string(), "4/4");

        // Eighth-note beats are half a quarter note long
        let ts = TimeSignature::six_eight();
        assert_eq!(ts.ticks_per_beat(), PPQN / 2);
        assert_eq!(ts.ticks_per_measure(), PPQN * 3);
    }

    #[test]
    fn test_time_signature_checked() {
        assert!(TimeSignature::checked(7, 8).is_some());
        assert!(TimeSignature::checked(0, 4).is_none());
        assert!(TimeSignature::checked(4, 3).is_none());
        assert!(TimeSignature::checked(4, 64).is_none());
    }

    #[test]
    fn test_tempo() {
        let tempo = Tempo::new(120.0);
        assert_eq!(tempo.bpm(), 120.0);
        assert_eq!(tempo.beat_duration_seconds(), 0.5);

        // Two quarter notes per second at 120 BPM
        assert_eq!(tempo.ticks_per_second(), 2.0 * PPQN as f64);
        assert_eq!(tempo.ticks_in(Duration::from_millis(500)), PPQN as f64);
    }

    #[test]
    fn test_tempo_clamped() {
        assert_eq!(Tempo::clamped(5.0).bpm(), MIN_BPM);
        assert_eq!(Tempo::clamped(9000.0).bpm(), MAX_BPM);
        assert_eq!(Tempo::clamped(f64::NAN).bpm(), 120.0);
        assert_eq!(Tempo::clamped(133.0).bpm(), 133.0);
    }

    #[test]
    fn test_musical_time_conversion() {
        let ts = TimeSignature::four_four();

        assert_eq!(MusicalTime::new(1, 1, 0).to_total_ticks(&ts), 0);
        assert_eq!(MusicalTime::new(1, 2, 0).to_total_ticks(&ts), PPQN);
        assert_eq!(MusicalTime::new(2, 1, 0).to_total_ticks(&ts), PPQN * 4);

        let total = 1000;
        let converted = MusicalTime::from_total_ticks(total, &ts);
        assert_eq!(converted.to_total_ticks(&ts), total);
    }

    #[test]
    fn test_musical_time_display() {
        let ts = TimeSignature::three_four();
        let time = MusicalTime::from_total_ticks(PPQN * 3 + PPQN + 5, &ts);
        assert_eq!(time.to_string(), "002:2:005");
    }
}
