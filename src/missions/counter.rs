use tracing::warn;

use crate::error::MissionError;

/// Remaining-attempt count at or below which increments emit a warning.
pub const DEFAULT_WARN_THRESHOLD: u32 = 3;

/// Bounded retry counter for a single mission.
///
/// Counters are short-lived: orchestration restores one from the persisted
/// attempt count with [`AttemptCounter::restore_at`] for every submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptCounter {
    current: u32,
    max: u32,
    warn_threshold: u32,
    warnings_emitted: u32,
}

/// Result of a successful [`AttemptCounter::increment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub attempt: u32,
    pub remaining: u32,
    /// Set when this increment left the counter near its limit.
    pub warning: Option<String>,
}

impl AttemptCounter {
    pub fn new(max: u32) -> Self {
        Self {
            current: 0,
            max,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            warnings_emitted: 0,
        }
    }

    /// A counter that has already used `current` attempts.
    ///
    /// Those attempts were warned about when they happened, so restoring is
    /// silent and does not replay increments.
    pub fn restore_at(current: u32, max: u32) -> Result<Self, MissionError> {
        if current > max {
            return Err(MissionError::InvalidAttemptCount { current, max });
        }

        Ok(Self {
            current,
            ..Self::new(max)
        })
    }

    pub fn with_warn_threshold(mut self, warn_threshold: u32) -> Self {
        self.warn_threshold = warn_threshold;
        self
    }

    /// Count one more attempt.
    ///
    /// Going past `max` is an error and the counter keeps the overshoot; the
    /// caller must treat that as terminal.
    pub fn increment(&mut self) -> Result<Tick, MissionError> {
        self.current += 1;

        if self.current > self.max {
            return Err(MissionError::MaxAttemptsExceeded {
                mission_id: String::new(),
                max_attempts: self.max,
            });
        }

        let remaining = self.remaining();
        let warning = if remaining > 0 && remaining <= self.warn_threshold {
            let message = format!(
                "Attempt {}/{}: only {} attempt{} left",
                self.current,
                self.max,
                remaining,
                if remaining == 1 { "" } else { "s" }
            );
            warn!(attempt = self.current, max = self.max, remaining, "Nearing attempt limit");
            self.warnings_emitted += 1;
            Some(message)
        } else {
            None
        };

        Ok(Tick {
            attempt: self.current,
            remaining,
            warning,
        })
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.current)
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.max == 0 {
            return 100.0;
        }
        (f64::from(self.current) / f64::from(self.max) * 100.0).min(100.0)
    }

    pub fn is_nearing_limit(&self) -> bool {
        self.remaining() <= self.warn_threshold
    }

    /// Near-limit warnings emitted by this instance.
    pub fn warnings_emitted(&self) -> u32 {
        self.warnings_emitted
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restoring_does_not_replay_warnings() {
        let mut counter = AttemptCounter::restore_at(8, 10).unwrap();
        assert_eq!(counter.current(), 8);
        assert_eq!(counter.max(), 10);
        assert_eq!(counter.warnings_emitted(), 0);

        let tick = counter.increment().unwrap();
        assert_eq!(tick.attempt, 9);
        assert_eq!(tick.remaining, 1);
        assert!(tick.warning.is_some());
        assert_eq!(counter.warnings_emitted(), 1);
    }

    #[test]
    fn warns_only_near_the_limit() {
        let mut counter = AttemptCounter::new(5);
        let first = counter.increment().unwrap();
        assert!(first.warning.is_none());

        let second = counter.increment().unwrap();
        assert_eq!(second.remaining, 3);
        assert!(second.warning.is_some());
    }

    #[test]
    fn last_allowed_attempt_does_not_warn() {
        let mut counter = AttemptCounter::restore_at(2, 3).unwrap();
        let tick = counter.increment().unwrap();
        assert_eq!(tick.remaining, 0);
        assert!(tick.warning.is_none());
    }

    #[test]
    fn rejects_increment_past_max() {
        let mut counter = AttemptCounter::new(1);
        counter.increment().unwrap();
        let err = counter.increment().unwrap_err();
        assert!(matches!(err, MissionError::MaxAttemptsExceeded { max_attempts: 1, .. }));
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn rejects_restoring_past_max() {
        let err = AttemptCounter::restore_at(4, 3).unwrap_err();
        assert!(matches!(err, MissionError::InvalidAttemptCount { current: 4, max: 3 }));
    }

    #[test]
    fn progress_is_capped_at_one_hundred() {
        let mut counter = AttemptCounter::restore_at(1, 1).unwrap();
        let _ = counter.increment();
        assert_eq!(counter.progress_percentage(), 100.0);
        assert!(counter.is_nearing_limit());

        counter.reset();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.progress_percentage(), 0.0);
    }

    #[test]
    fn custom_threshold_silences_warnings() {
        let mut counter = AttemptCounter::restore_at(8, 10)
            .unwrap()
            .with_warn_threshold(0);
        let tick = counter.increment().unwrap();
        assert!(tick.warning.is_none());
        assert_eq!(counter.warnings_emitted(), 0);
    }
}
