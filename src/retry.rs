use serde::Serialize;
use std::time::Duration;

/// Where a collector currently is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorPhase {
    /// Opening the device, socket or bus
    Connecting,
    /// Producing data
    Reading,
    /// Waiting out a cooldown before the next attempt
    BackingOff,
    /// Retry budget exhausted, the collector has stopped
    Failed,
}

impl CollectorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorPhase::Connecting => "connecting",
            CollectorPhase::Reading => "reading",
            CollectorPhase::BackingOff => "backing_off",
            CollectorPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CollectorPhase::Failed)
    }
}

/// Outcome of reporting a failure to a [`RetryBudget`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RetryDecision {
    /// Try again after this cooldown
    RetryAfter(Duration),
    /// Give up
    Exhausted,
}

/// Consecutive-failure budget with exponential backoff.
///
/// Each failure multiplies the cooldown by 1.5, capped at 30 s. A success
/// resets both the counter and the cooldown. `max_attempts = None` retries
/// forever.
#[derive(Clone, Debug)]
pub struct RetryBudget {
    pub name: String,
    pub attempts: u32,
    pub max_attempts: Option<u32>,
    pub base_cooldown: Duration,
    pub current_cooldown: Duration,
}

const BACKOFF_FACTOR: f64 = 1.5;
const MAX_COOLDOWN_SECS: f64 = 30.0;

impl RetryBudget {
    pub fn new(name: &str, max_attempts: Option<u32>, base_cooldown: Duration) -> Self {
        RetryBudget {
            name: name.to_string(),
            attempts: 0,
            max_attempts,
            base_cooldown,
            current_cooldown: base_cooldown,
        }
    }

    /// Record a failed attempt and decide what happens next.
    pub fn record_failure(&mut self) -> RetryDecision {
        self.attempts += 1;

        if !self.can_retry() {
            return RetryDecision::Exhausted;
        }

        let cooldown = self.current_cooldown;
        self.current_cooldown = Duration::from_secs_f64(
            (self.current_cooldown.as_secs_f64() * BACKOFF_FACTOR).min(MAX_COOLDOWN_SECS),
        );

        log::warn!(
            "[{}] attempt {} failed, next retry in {:.1}s",
            self.name,
            self.attempts,
            cooldown.as_secs_f64()
        );
        RetryDecision::RetryAfter(cooldown)
    }

    pub fn record_success(&mut self) {
        if self.attempts > 0 {
            log::info!(
                "[{}] recovered after {} failed attempt(s)",
                self.name,
                self.attempts
            );
        }
        self.attempts = 0;
        self.current_cooldown = self.base_cooldown;
    }

    /// Whether another attempt is allowed.
    pub fn can_retry(&self) -> bool {
        match self.max_attempts {
            Some(max) => self.attempts <= max,
            None => true,
        }
    }

    pub fn status(&self) -> String {
        match self.max_attempts {
            Some(max) => format!("{} {}/{}", self.name, self.attempts, max),
            None => format!("{} {}", self.name, self.attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let mut budget = RetryBudget::new("test", None, Duration::from_secs(1));

        assert_eq!(
            budget.record_failure(),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        match budget.record_failure() {
            RetryDecision::RetryAfter(d) => assert!((d.as_secs_f64() - 1.5).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(budget.attempts, 2);
    }

    #[test]
    fn test_backoff_capped() {
        let mut budget = RetryBudget::new("test", None, Duration::from_secs(20));
        budget.record_failure();
        budget.record_failure();
        budget.record_failure();
        assert!(budget.current_cooldown.as_secs_f64() <= 30.0);
    }

    #[test]
    fn test_budget_exhausted_after_max_consecutive_failures() {
        let mut budget = RetryBudget::new("test", Some(3), Duration::from_millis(10));
        for _ in 0..3 {
            assert!(matches!(budget.record_failure(), RetryDecision::RetryAfter(_)));
        }
        assert_eq!(budget.record_failure(), RetryDecision::Exhausted);
        assert!(!budget.can_retry());
    }

    #[test]
    fn test_success_resets() {
        let mut budget = RetryBudget::new("test", Some(3), Duration::from_secs(2));
        budget.record_failure();
        budget.record_failure();
        budget.record_success();
        assert_eq!(budget.attempts, 0);
        assert_eq!(budget.current_cooldown, Duration::from_secs(2));
        assert!(budget.status().contains("0/3"));
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(CollectorPhase::BackingOff.as_str(), "backing_off");
        assert!(CollectorPhase::Failed.is_terminal());
        assert!(!CollectorPhase::Reading.is_terminal());
    }
}
