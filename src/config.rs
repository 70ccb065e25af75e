use std::time::Duration;

use rand::Rng;

use crate::{buffer::Mode, error::ConfigError, event::Role};

/// Inclusive range a worker sleeps for between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    pub producer: DelayRange,
    pub consumer: DelayRange,
}

impl TimingConfig {
    /// No pacing at all; workers hammer the buffer back to back.
    pub fn immediate() -> Self {
        Self {
            producer: DelayRange::fixed(Duration::ZERO),
            consumer: DelayRange::fixed(Duration::ZERO),
        }
    }

    pub fn for_role(&self, role: Role) -> DelayRange {
        match role {
            Role::Producer => self.producer,
            Role::Consumer => self.consumer,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            producer: DelayRange::new(Duration::from_millis(300), Duration::from_millis(550)),
            consumer: DelayRange::new(Duration::from_millis(450), Duration::from_millis(900)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub mode: Mode,
    pub capacity: usize,
    pub producers: usize,
    pub consumers: usize,
    pub timing: TimingConfig,
    /// Granularity at which blocked operations re-check the stop signal.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Monitor,
            capacity: 5,
            producers: 2,
            consumers: 2,
            timing: TimingConfig::default(),
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl SessionConfig {
    pub fn new(mode: Mode, capacity: usize) -> Self {
        Self {
            mode,
            capacity,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_workers(mut self, producers: usize, consumers: usize) -> Self {
        self.producers = producers;
        self.consumers = consumers;
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.producers == 0 {
            return Err(ConfigError::NoProducers);
        }
        if self.consumers == 0 {
            return Err(ConfigError::NoConsumers);
        }
        for role in [Role::Producer, Role::Consumer] {
            let range = self.timing.for_role(role);
            if range.min > range.max {
                return Err(ConfigError::InvertedDelay {
                    role,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.capacity, 5);
        assert_eq!(config.poll_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let config = SessionConfig::new(Mode::Semaphore, 0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));

        let config = SessionConfig::default().with_workers(0, 1);
        assert_eq!(config.validate(), Err(ConfigError::NoProducers));

        let config = SessionConfig::default().with_workers(1, 0);
        assert_eq!(config.validate(), Err(ConfigError::NoConsumers));

        let config = SessionConfig::default().with_poll_interval(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroPollInterval));
    }

    #[test]
    fn test_rejects_inverted_delay() {
        let timing = TimingConfig {
            producer: DelayRange::fixed(Duration::ZERO),
            consumer: DelayRange::new(Duration::from_millis(10), Duration::from_millis(5)),
        };
        let config = SessionConfig::default().with_timing(timing);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedDelay {
                role: Role::Consumer,
                ..
            })
        ));
    }

    #[test]
    fn test_sample_stays_in_range() {
        let range = DelayRange::new(Duration::from_millis(5), Duration::from_millis(10));
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let delay = range.sample(&mut rng);
            assert!(delay >= range.min && delay <= range.max);
        }
        assert_eq!(
            DelayRange::fixed(Duration::from_millis(7)).sample(&mut rng),
            Duration::from_millis(7)
        );
    }
}
