use std::time::Instant;

use crate::shared::constants::FPS_UPDATE_INTERVAL;

/// Average frame rate since start, refreshed once every
/// [`FPS_UPDATE_INTERVAL`] frames.
///
/// Between refreshes the last computed value is held, so the displayed
/// number changes at most once per interval.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    start: Instant,
    count: u64,
    fps: f64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            start,
            count: 0,
            fps: 0.0,
        }
    }

    /// Counts one frame. Returns the new rate when it was recomputed.
    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        self.count += 1;
        if self.count % FPS_UPDATE_INTERVAL != 0 {
            return None;
        }
        let elapsed = now.duration_since(self.start).as_secs_f64();
        if elapsed > 0.0 {
            self.fps = self.count as f64 / elapsed;
        }
        Some(self.fps)
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    #[test]
    fn test_updates_exactly_every_thirty_frames() {
        let start = Instant::now();
        let mut counter = FpsCounter::starting_at(start);
        let mut updates = Vec::new();
        for i in 1..=95u64 {
            let now = start + Duration::from_millis(i * 10);
            if counter.tick_at(now).is_some() {
                updates.push(i);
            }
        }
        assert_eq!(updates, vec![30, 60, 90]);
    }

    #[test]
    fn test_value_held_between_updates() {
        let start = Instant::now();
        let mut counter = FpsCounter::starting_at(start);
        for i in 1..=30u64 {
            counter.tick_at(start + Duration::from_millis(i * 20));
        }
        // 30 frames in 600 ms
        assert_relative_eq!(counter.fps(), 50.0, epsilon = 1e-9);

        for i in 31..=59u64 {
            assert!(counter.tick_at(start + Duration::from_millis(i * 5)).is_none());
            assert_relative_eq!(counter.fps(), 50.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_starts_at_zero() {
        let counter = FpsCounter::new();
        assert_relative_eq!(counter.fps(), 0.0);
        assert_eq!(counter.count(), 0);
    }
}
