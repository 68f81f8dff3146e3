//! Bounded reconnection policy.
//!
//! There is no backoff: a retry is issued as soon as a drop is observed.
//! The only guarantee is a hard upper bound on the number of attempts, after
//! which the client gives up and reports the failure to the host.

/// Attempts allowed before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Attempt counter for one logical connection target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempts: 0,
        }
    }

    /// `true` while `attempt_count < max_attempts`.
    pub fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// Whether another attempt is allowed given the attempts made so far.
    pub fn can_retry(&self) -> bool {
        self.should_retry(self.attempts)
    }

    /// Records one attempt and returns its ordinal (1-based).
    pub fn on_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Clears the counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_boundary() {
        let policy = ReconnectPolicy::new(20);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(19));
        assert!(!policy.should_retry(20));
        assert!(!policy.should_retry(21));
    }

    #[test]
    fn test_exactly_max_attempts_are_allowed() {
        // Arrange
        let mut policy = ReconnectPolicy::default();
        let mut made = 0;

        // Act
        while policy.can_retry() {
            made = policy.on_attempt();
        }

        // Assert
        assert_eq!(made, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(policy.attempts(), DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_reset_restores_full_budget() {
        let mut policy = ReconnectPolicy::new(2);
        policy.on_attempt();
        policy.on_attempt();
        assert!(!policy.can_retry());

        policy.reset();

        assert!(policy.can_retry());
        assert_eq!(policy.attempts(), 0);
    }

    #[test]
    fn test_zero_max_never_retries() {
        assert!(!ReconnectPolicy::new(0).can_retry());
    }
}
