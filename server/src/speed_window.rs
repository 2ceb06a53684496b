//! Sliding window of recent speed samples

use std::collections::VecDeque;

/// Maximum number of samples kept in the window
pub const SPEED_WINDOW_CAPACITY: usize = 16;

/// Fixed-capacity FIFO of speed samples (km/h) plus the running top speed
///
/// The average only reflects the most recent [`SPEED_WINDOW_CAPACITY`]
/// samples, while the top speed covers everything ever recorded.
#[derive(Debug, Clone, Default)]
pub struct SpeedSampler {
    samples: VecDeque<i32>,
    top_speed: i32,
}

impl SpeedSampler {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(SPEED_WINDOW_CAPACITY),
            top_speed: 0,
        }
    }

    /// Appends a sample, evicting the oldest one once the window is full
    pub fn add_sample(&mut self, speed: i32) {
        if self.samples.len() > SPEED_WINDOW_CAPACITY - 1 {
            self.samples.pop_front();
        }

        self.samples.push_back(speed);
    }

    /// Integer mean of the resident samples, 0 for an empty window
    pub fn average(&self) -> i32 {
        if self.samples.is_empty() {
            return 0;
        }

        let sum: i64 = self.samples.iter().map(|&s| i64::from(s)).sum();
        (sum / self.samples.len() as i64) as i32
    }

    /// Raises the tracked top speed if `speed` is strictly higher
    pub fn update_top_speed(&mut self, speed: i32) {
        if speed > self.top_speed {
            self.top_speed = speed;
        }
    }

    pub fn top_speed(&self) -> i32 {
        self.top_speed
    }

    pub fn samples(&self) -> impl Iterator<Item = &i32> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_average_is_zero() {
        let sampler = SpeedSampler::new();
        assert_eq!(sampler.average(), 0);
        assert!(sampler.is_empty());
    }

    #[test]
    fn test_integer_average() {
        let mut sampler = SpeedSampler::new();
        for speed in [10, 20, 30] {
            sampler.add_sample(speed);
        }
        assert_eq!(sampler.average(), 20);

        sampler.add_sample(1);
        // 61 / 4 truncates
        assert_eq!(sampler.average(), 15);
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut sampler = SpeedSampler::new();

        for i in 0..100 {
            sampler.add_sample(i);
            assert!(sampler.len() <= SPEED_WINDOW_CAPACITY);
        }

        assert_eq!(sampler.len(), SPEED_WINDOW_CAPACITY);
    }

    #[test]
    fn test_eviction_boundary() {
        let mut sampler = SpeedSampler::new();

        for i in 0..15 {
            sampler.add_sample(i);
        }
        assert_eq!(sampler.len(), 15);

        // 16th sample fills the window without evicting
        sampler.add_sample(15);
        assert_eq!(sampler.len(), 16);
        assert_eq!(sampler.samples().next(), Some(&0));

        // 17th sample pushes out the oldest
        sampler.add_sample(16);
        assert_eq!(sampler.len(), 16);
        assert_eq!(sampler.samples().next(), Some(&1));
        assert_eq!(sampler.samples().last(), Some(&16));
    }

    #[test]
    fn test_average_only_covers_window() {
        let mut sampler = SpeedSampler::new();

        for _ in 0..SPEED_WINDOW_CAPACITY {
            sampler.add_sample(300);
        }
        for _ in 0..SPEED_WINDOW_CAPACITY {
            sampler.add_sample(60);
        }

        assert_eq!(sampler.average(), 60);
    }

    #[test]
    fn test_top_speed_is_running_max() {
        let mut sampler = SpeedSampler::new();
        let speeds = [50, 120, 80, 120, 119, 200, 3];
        let mut expected = 0;

        for speed in speeds {
            sampler.update_top_speed(speed);
            expected = expected.max(speed);
            assert_eq!(sampler.top_speed(), expected);
        }

        assert_eq!(sampler.top_speed(), 200);
    }

    #[test]
    fn test_top_speed_ignores_lower_values() {
        let mut sampler = SpeedSampler::new();
        sampler.update_top_speed(-5);
        assert_eq!(sampler.top_speed(), 0);
    }
}
