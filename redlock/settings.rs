use std::time::Duration;

/// Tunables for lock operations.
///
/// A [`LockManager`](crate::LockManager) carries one of these as its
/// defaults and every operation can be handed an override. The defaults
/// match the reference redlock implementation.
#[derive(Debug, Clone)]
pub struct LockSettings {
    /// Multiplier applied to the requested ttl when budgeting for clock rate
    /// mismatch between this process and the servers.
    pub drift_factor: f32,
    /// Maximum additional attempts after the first, so total attempts is
    /// `retry_count + 1`.
    pub retry_count: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Upper bound of the uniform random jitter added to each delay.
    pub retry_jitter: Duration,
    /// Minimum margin before expiration at which
    /// [`LockManager::using`](crate::LockManager::using) schedules the next
    /// automatic extension.
    pub automatic_extension_threshold: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            drift_factor: 0.01,
            retry_count: 10,
            retry_delay: Duration::from_millis(200),
            retry_jitter: Duration::from_millis(200),
            automatic_extension_threshold: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_defaults() {
        let settings = LockSettings::default();
        assert_eq!(settings.drift_factor, 0.01);
        assert_eq!(settings.retry_count, 10);
        assert_eq!(settings.retry_delay, Duration::from_millis(200));
        assert_eq!(settings.retry_jitter, Duration::from_millis(200));
        assert_eq!(
            settings.automatic_extension_threshold,
            Duration::from_millis(500)
        );
    }
}
