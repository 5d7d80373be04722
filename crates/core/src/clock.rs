//! Frame clock used by the outer loop to measure frame pacing.

use std::time::{Duration, Instant};

/// Frame-rate sample produced once per reporting interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRate {
    /// Frames counted during the interval
    pub frames: u32,
    /// Length of the interval
    pub interval: Duration,
}

impl FrameRate {
    /// Average frames per second over the interval.
    pub fn fps(&self) -> f64 {
        let secs = self.interval.as_secs_f64();
        if secs > 0.0 {
            f64::from(self.frames) / secs
        } else {
            0.0
        }
    }
}

/// Measures per-frame delta time and accumulates a frame-rate sample.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    window_start: Instant,
    frames_in_window: u32,
    report_interval: Duration,
}

impl FrameClock {
    /// Create a clock that reports its frame rate every `report_interval`.
    pub fn new(report_interval: Duration) -> Self {
        Self::starting_at(Instant::now(), report_interval)
    }

    fn starting_at(now: Instant, report_interval: Duration) -> Self {
        Self {
            start: now,
            last_tick: now,
            window_start: now,
            frames_in_window: 0,
            report_interval,
        }
    }

    /// Total time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record one frame. Returns the delta since the previous frame and,
    /// once per interval, the frame rate over that interval.
    pub fn tick(&mut self) -> (Duration, Option<FrameRate>) {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> (Duration, Option<FrameRate>) {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.frames_in_window += 1;

        let interval = now.saturating_duration_since(self.window_start);
        if interval < self.report_interval {
            return (delta, None);
        }

        let sample = FrameRate {
            frames: self.frames_in_window,
            interval,
        };
        self.window_start = now;
        self.frames_in_window = 0;
        (delta, Some(sample))
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_between_ticks() {
        let t0 = Instant::now();
        let mut clock = FrameClock::starting_at(t0, Duration::from_secs(1));

        let (delta, sample) = clock.tick_at(t0 + Duration::from_millis(16));
        assert_eq!(delta, Duration::from_millis(16));
        assert!(sample.is_none());

        let (delta, _) = clock.tick_at(t0 + Duration::from_millis(40));
        assert_eq!(delta, Duration::from_millis(24));
    }

    #[test]
    fn test_reports_once_per_interval() {
        let t0 = Instant::now();
        let mut clock = FrameClock::starting_at(t0, Duration::from_secs(1));

        for i in 1..10 {
            let (_, sample) = clock.tick_at(t0 + Duration::from_millis(100 * i));
            assert!(sample.is_none());
        }

        let (_, sample) = clock.tick_at(t0 + Duration::from_secs(1));
        let sample = sample.expect("interval elapsed");
        assert_eq!(sample.frames, 10);
        assert!((sample.fps() - 10.0).abs() < 1e-9);

        // Window restarts after a report
        let (_, sample) = clock.tick_at(t0 + Duration::from_millis(1100));
        assert!(sample.is_none());
    }

    #[test]
    fn test_zero_interval_fps() {
        let rate = FrameRate {
            frames: 3,
            interval: Duration::ZERO,
        };
        assert_eq!(rate.fps(), 0.0);
    }
}
