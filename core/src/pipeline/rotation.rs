//! Random mode rotation on a jittered schedule.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::RotationConfig;
use crate::modes::VisualizerMode;

/// Picks a new mode from a pool every `[min_interval, max_interval)` seconds.
///
/// Time only moves forward: [`mode_at`](ModeRotation::mode_at) is called with
/// non-decreasing timestamps, either export frame times or wall time.
#[derive(Debug, Clone)]
pub struct ModeRotation {
    pool: Vec<VisualizerMode>,
    config: RotationConfig,
    rng: StdRng,
    current: VisualizerMode,
    next_switch: f64,
}

impl ModeRotation {
    /// An empty pool degrades to a single fixed `fallback` mode.
    pub fn new(
        pool: &[VisualizerMode],
        fallback: VisualizerMode,
        config: RotationConfig,
        seed: u64,
    ) -> Self {
        let pool = if pool.is_empty() {
            vec![fallback]
        } else {
            pool.to_vec()
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let current = pool.choose(&mut rng).copied().unwrap_or(fallback);
        let mut rotation = Self {
            pool,
            config,
            rng,
            current,
            next_switch: 0.0,
        };
        rotation.next_switch = rotation.interval();
        rotation
    }

    pub fn current(&self) -> VisualizerMode {
        self.current
    }

    /// Time at which the next switch happens.
    pub fn next_switch(&self) -> f64 {
        self.next_switch
    }

    pub fn pool(&self) -> &[VisualizerMode] {
        &self.pool
    }

    /// Active mode at `time`.
    ///
    /// Switches at most once per call; the following interval is counted
    /// from `time`, not from the scheduled switch.
    pub fn mode_at(&mut self, time: f64) -> VisualizerMode {
        if time >= self.next_switch {
            self.current = self.pick_next();
            self.next_switch = time + self.interval();
            log::info!("Switching mode at {:.2}s: {}", time, self.current);
        }
        self.current
    }

    fn pick_next(&mut self) -> VisualizerMode {
        if self.pool.len() < 2 {
            return self.current;
        }
        let current = self.current;
        let candidates: Vec<VisualizerMode> =
            self.pool.iter().copied().filter(|m| *m != current).collect();
        candidates.choose(&mut self.rng).copied().unwrap_or(current)
    }

    fn interval(&mut self) -> f64 {
        let RotationConfig {
            min_interval,
            max_interval,
        } = self.config;
        if min_interval < max_interval {
            self.rng.gen_range(min_interval..max_interval)
        } else {
            min_interval.max(f64::EPSILON)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<VisualizerMode> {
        vec![
            VisualizerMode::Bars,
            VisualizerMode::Kaleidoscope,
            VisualizerMode::GpuFractal,
        ]
    }

    #[test]
    fn test_first_mode_from_pool() {
        let rotation = ModeRotation::new(&pool(), VisualizerMode::Waveform, Default::default(), 1);
        assert!(pool().contains(&rotation.current()));
        assert!((5.0..10.0).contains(&rotation.next_switch()));
    }

    #[test]
    fn test_empty_pool_uses_fallback() {
        let mut rotation =
            ModeRotation::new(&[], VisualizerMode::Waveform, Default::default(), 1);
        for i in 0..100 {
            assert_eq!(rotation.mode_at(i as f64), VisualizerMode::Waveform);
        }
    }

    #[test]
    fn test_no_immediate_repeat() {
        let mut rotation = ModeRotation::new(&pool(), VisualizerMode::Bars, Default::default(), 7);
        let mut previous = rotation.current();
        let mut switches = 0;
        for frame in 0..(600 * 30) {
            let t = frame as f64 / 30.0;
            let mode = rotation.mode_at(t);
            if mode != previous {
                switches += 1;
            }
            previous = mode;
        }
        // Each scheduled switch changes mode, roughly every 5-10s over 600s
        assert!((55..=120).contains(&switches), "switches = {}", switches);
    }

    #[test]
    fn test_switch_intervals_in_range() {
        let mut rotation = ModeRotation::new(&pool(), VisualizerMode::Bars, Default::default(), 3);
        let mut last = 0.0;
        for _ in 0..200 {
            let next = rotation.next_switch();
            let gap = next - last;
            assert!((5.0..10.0).contains(&gap), "gap {}", gap);
            let before = rotation.current();
            assert_ne!(rotation.mode_at(next), before);
            last = next;
        }
    }

    #[test]
    fn test_late_observation_switches_once_from_observed_time() {
        let mut rotation = ModeRotation::new(&pool(), VisualizerMode::Bars, Default::default(), 5);
        let before = rotation.current();

        // A stall well past several scheduled switches
        let mode = rotation.mode_at(60.0);
        assert_ne!(mode, before);
        let gap = rotation.next_switch() - 60.0;
        assert!((5.0..10.0).contains(&gap), "gap {}", gap);

        // Nothing more happens until the new schedule is reached
        assert_eq!(rotation.mode_at(60.0 + gap - 0.01), mode);
    }

    #[test]
    fn test_seeded_schedule_is_reproducible() {
        let run = |seed| {
            let mut rotation =
                ModeRotation::new(&pool(), VisualizerMode::Bars, Default::default(), seed);
            (0..3000).map(|i| rotation.mode_at(i as f64 * 0.1)).collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }
}
