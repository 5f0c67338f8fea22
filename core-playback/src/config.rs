//! # Session Configuration

use std::time::Duration;

/// Playback session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Interval for the skip forward / backward commands
    pub skip_interval: Duration,

    /// Seeks on finite sources stop this far before the end, so a seek never
    /// lands exactly on the end-of-item boundary
    pub seek_end_epsilon: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            skip_interval: Duration::from_secs(15),
            seek_end_epsilon: Duration::from_millis(500),
        }
    }
}

impl SessionConfig {
    pub fn with_skip_interval(mut self, interval: Duration) -> Self {
        self.skip_interval = interval;
        self
    }

    pub fn with_seek_end_epsilon(mut self, epsilon: Duration) -> Self {
        self.seek_end_epsilon = epsilon;
        self
    }

    /// Clamp a seek target into the playable range.
    ///
    /// Finite sources clamp into `[0, duration - epsilon]`; indefinite
    /// sources (`duration == None`) only have the lower bound, which
    /// `Duration` already guarantees.
    pub fn clamp_seek(&self, target: Duration, duration: Option<Duration>) -> Duration {
        match duration {
            Some(duration) => target.min(duration.saturating_sub(self.seek_end_epsilon)),
            None => target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.skip_interval, Duration::from_secs(15));
        assert_eq!(config.seek_end_epsilon, Duration::from_millis(500));
    }

    #[test]
    fn test_clamp_seek() {
        let config = SessionConfig::default();
        let hundred = Some(Duration::from_secs(100));

        assert_eq!(
            config.clamp_seek(Duration::from_secs(200), hundred),
            Duration::from_millis(99_500)
        );
        assert_eq!(config.clamp_seek(Duration::from_secs(10), hundred), Duration::from_secs(10));
        assert_eq!(
            config.clamp_seek(Duration::from_secs(500), None),
            Duration::from_secs(500)
        );
        // Shorter than epsilon: pinned to the start.
        assert_eq!(
            config.clamp_seek(Duration::from_secs(1), Some(Duration::from_millis(200))),
            Duration::ZERO
        );
    }
}
