// Tap tempo - BPM from the spacing of operator taps

use std::time::{Duration, Instant};

/// Result of one tap
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tap {
    /// First tap of a new sequence
    Started,
    /// Tempo measured from every tap since the first
    Bpm(f64),
}

#[derive(Debug, Clone)]
pub struct TapTempo {
    first: Option<Instant>,
    last: Option<Instant>,
    count: u32,
    reset_after: Duration,
}

impl TapTempo {
    pub fn new(reset_after: Duration) -> Self {
        Self {
            first: None,
            last: None,
            count: 0,
            reset_after,
        }
    }

    /// Register a tap at `now`
    ///
    /// A tap arriving later than the reset timeout starts a new sequence.
    pub fn tap(&mut self, now: Instant) -> Tap {
        if self.is_expired(now) {
            self.reset();
        }
        let Some(first) = self.first else {
            self.first = Some(now);
            self.last = Some(now);
            self.count = 1;
            return Tap::Started;
        };

        self.count += 1;
        self.last = Some(now);
        let ms = now.duration_since(first).as_secs_f64() * 1000.0;
        if ms <= 0.0 {
            return Tap::Started;
        }
        Tap::Bpm((self.count - 1) as f64 * 60_000.0 / ms)
    }

    /// True once a sequence is in progress and idle past the timeout
    pub fn is_expired(&self, now: Instant) -> bool {
        self.last
            .is_some_and(|last| now.duration_since(last) > self.reset_after)
    }

    pub fn is_active(&self) -> bool {
        self.first.is_some()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.first = None;
        self.last = None;
        self.count = 0;
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_taps() {
        let mut tap = TapTempo::default();
        let start = Instant::now();
        assert_eq!(tap.tap(start), Tap::Started);
        assert_eq!(tap.tap(start + Duration::from_millis(500)), Tap::Bpm(120.0));
        assert_eq!(tap.tap(start + Duration::from_millis(1000)), Tap::Bpm(120.0));
        assert_eq!(tap.count(), 3);
    }

    #[test]
    fn test_average_over_all_taps() {
        let mut tap = TapTempo::default();
        let start = Instant::now();
        tap.tap(start);
        tap.tap(start + Duration::from_millis(400));
        // Two intervals across 1.5 seconds, whatever their spacing
        assert_eq!(tap.tap(start + Duration::from_millis(1500)), Tap::Bpm(80.0));
    }

    #[test]
    fn test_timeout_starts_over() {
        let mut tap = TapTempo::new(Duration::from_secs(5));
        let start = Instant::now();
        tap.tap(start);
        assert!(!tap.is_expired(start + Duration::from_secs(5)));
        assert!(tap.is_expired(start + Duration::from_secs(6)));
        assert_eq!(tap.tap(start + Duration::from_secs(6)), Tap::Started);
        assert_eq!(tap.count(), 1);
    }
}
