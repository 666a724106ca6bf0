use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("violation threshold must be > 0")]
    InvalidViolationThreshold,

    #[error("tick interval must be > 0")]
    InvalidTickInterval,
}

/// Policy knobs for an exam attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSettings {
    violation_threshold: u32,
    low_time_warning_secs: u32,
    tick_interval: Duration,
}

impl ExamSettings {
    /// Number of integrity violations that ends the attempt. Violations never reset.
    pub const DEFAULT_VIOLATION_THRESHOLD: u32 = 2;
    /// Remaining time below which the countdown is shown as urgent.
    pub const DEFAULT_LOW_TIME_WARNING_SECS: u32 = 300;

    /// Creates validated settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the threshold or tick interval is zero.
    pub fn new(
        violation_threshold: u32,
        low_time_warning_secs: u32,
        tick_interval: Duration,
    ) -> Result<Self, SettingsError> {
        if violation_threshold == 0 {
            return Err(SettingsError::InvalidViolationThreshold);
        }
        if tick_interval.is_zero() {
            return Err(SettingsError::InvalidTickInterval);
        }
        Ok(Self {
            violation_threshold,
            low_time_warning_secs,
            tick_interval,
        })
    }

    #[must_use]
    pub fn violation_threshold(&self) -> u32 {
        self.violation_threshold
    }

    #[must_use]
    pub fn low_time_warning_secs(&self) -> u32 {
        self.low_time_warning_secs
    }

    /// Wall-clock length of one countdown second.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self {
            violation_threshold: Self::DEFAULT_VIOLATION_THRESHOLD,
            low_time_warning_secs: Self::DEFAULT_LOW_TIME_WARNING_SECS,
            tick_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_two_strikes_and_one_second_ticks() {
        let settings = ExamSettings::default();
        assert_eq!(settings.violation_threshold(), 2);
        assert_eq!(settings.low_time_warning_secs(), 300);
        assert_eq!(settings.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let err = ExamSettings::new(0, 300, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, SettingsError::InvalidViolationThreshold);
    }

    #[test]
    fn zero_tick_is_rejected() {
        let err = ExamSettings::new(2, 300, Duration::ZERO).unwrap_err();
        assert_eq!(err, SettingsError::InvalidTickInterval);
    }
}
