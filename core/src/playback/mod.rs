//! Live playback position for preview rendering.
//!
//! [`PlaybackClock`] converts elapsed time from a [`TimeSource`] into a
//! track-relative position. It is advisory only: exports never consult it
//! and derive time from the output frame index instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time since an arbitrary, fixed origin.
pub trait TimeSource {
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced time, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    nanos: Arc<AtomicU64>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Stopped / playing / paused state machine with a non-decreasing position.
///
/// Single-threaded: owned by the thread that drives the preview.
#[derive(Debug)]
pub struct PlaybackClock<T: TimeSource = MonotonicTime> {
    source: T,
    state: PlaybackState,
    /// Position banked by earlier play spans.
    accumulated: Duration,
    /// Source time when the current play span started.
    resumed_at: Duration,
}

impl PlaybackClock<MonotonicTime> {
    pub fn new() -> Self {
        Self::with_source(MonotonicTime::new())
    }
}

impl Default for PlaybackClock<MonotonicTime> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeSource> PlaybackClock<T> {
    pub fn with_source(source: T) -> Self {
        Self {
            source,
            state: PlaybackState::Stopped,
            accumulated: Duration::ZERO,
            resumed_at: Duration::ZERO,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Start from zero when stopped, resume when paused.
    pub fn play(&mut self) {
        match self.state {
            PlaybackState::Playing => {}
            PlaybackState::Stopped => {
                self.accumulated = Duration::ZERO;
                self.resumed_at = self.source.now();
                self.state = PlaybackState::Playing;
            }
            PlaybackState::Paused => {
                self.resumed_at = self.source.now();
                self.state = PlaybackState::Playing;
            }
        }
    }

    /// Freeze the position. Only meaningful while playing.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.accumulated = self.elapsed();
            self.state = PlaybackState::Paused;
        }
    }

    /// Return to `Stopped` and reset the position to zero.
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.accumulated = Duration::ZERO;
    }

    /// Playback position in seconds; zero while stopped.
    pub fn current_time(&self) -> f64 {
        match self.state {
            PlaybackState::Stopped => 0.0,
            PlaybackState::Paused => self.accumulated.as_secs_f64(),
            PlaybackState::Playing => self.elapsed().as_secs_f64(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.accumulated + self.source.now().saturating_sub(self.resumed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_clock() -> (PlaybackClock<ManualTime>, ManualTime) {
        let time = ManualTime::new();
        (PlaybackClock::with_source(time.clone()), time)
    }

    #[test]
    fn test_stopped_reports_zero() {
        let (clock, time) = manual_clock();
        time.advance(Duration::from_secs(3));
        assert_eq!(clock.state(), PlaybackState::Stopped);
        assert_eq!(clock.current_time(), 0.0);
    }

    #[test]
    fn test_play_tracks_elapsed_time() {
        let (mut clock, time) = manual_clock();
        time.advance(Duration::from_secs(5));
        clock.play();
        time.advance(Duration::from_millis(1500));
        assert!((clock.current_time() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_pause_freezes_and_resume_continues() {
        let (mut clock, time) = manual_clock();
        clock.play();
        time.advance(Duration::from_secs(2));
        clock.pause();
        time.advance(Duration::from_secs(10));
        assert!((clock.current_time() - 2.0).abs() < 1e-9);

        clock.play();
        time.advance(Duration::from_secs(1));
        assert!((clock.current_time() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_resets_position() {
        let (mut clock, time) = manual_clock();
        clock.play();
        time.advance(Duration::from_secs(4));
        clock.stop();
        assert_eq!(clock.current_time(), 0.0);

        clock.play();
        time.advance(Duration::from_secs(1));
        assert!((clock.current_time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pause_while_stopped_is_ignored() {
        let (mut clock, _time) = manual_clock();
        clock.pause();
        assert_eq!(clock.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_position_is_non_decreasing() {
        let (mut clock, time) = manual_clock();
        clock.play();
        let mut last = 0.0;
        for _ in 0..20 {
            time.advance(Duration::from_millis(33));
            let now = clock.current_time();
            assert!(now >= last);
            last = now;
        }
    }
}
