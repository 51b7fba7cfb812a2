use std::time::Duration;

use serde::{Deserialize, Serialize};

/// When to relaunch a recorder that exited on its own.
///
/// A recorder that ran for at least `stable_after_ms` is relaunched at once.
/// Shorter runs, and failed launches, count as consecutive failures and wait
/// `initial_backoff_ms * 2^(failures - 1)`, capped at `max_backoff_ms`.
/// Retries are never capped in number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub stable_after_ms: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
            stable_after_ms: 5_000,
        }
    }
}

/// Consecutive-failure counter driven by a [`RestartPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RestartPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Delay before relaunching a recorder that exited after `uptime`.
    pub fn after_exit(&mut self, uptime: Duration) -> Duration {
        if uptime >= Duration::from_millis(self.policy.stable_after_ms) {
            self.failures = 0;
            return Duration::ZERO;
        }
        self.after_failure()
    }

    /// Delay before retrying after a failed launch or an early exit.
    pub fn after_failure(&mut self) -> Duration {
        let shift = self.failures.min(20);
        self.failures = self.failures.saturating_add(1);
        let delay = self
            .policy
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.policy.max_backoff_ms);
        Duration::from_millis(delay)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_stable_run_restarts_immediately() {
        let mut backoff = Backoff::new(RestartPolicy::default());
        assert_eq!(backoff.after_exit(Duration::from_secs(60)), Duration::ZERO);
        assert_eq!(backoff.consecutive_failures(), 0);
    }

    #[test]
    fn test_failures_double_up_to_cap() {
        let mut backoff = Backoff::new(RestartPolicy::default());
        let delays: Vec<_> = (0..7).map(|_| backoff.after_exit(ms(10))).collect();
        assert_eq!(
            delays,
            vec![ms(250), ms(500), ms(1000), ms(2000), ms(4000), ms(5000), ms(5000)]
        );
    }

    #[test]
    fn test_stable_run_resets_failures() {
        let mut backoff = Backoff::new(RestartPolicy::default());
        backoff.after_failure();
        backoff.after_failure();
        assert_eq!(backoff.consecutive_failures(), 2);

        assert_eq!(backoff.after_exit(ms(5_000)), Duration::ZERO);
        assert_eq!(backoff.after_failure(), ms(250));
    }

    #[test]
    fn test_many_failures_do_not_overflow() {
        let mut backoff = Backoff::new(RestartPolicy::default());
        for _ in 0..200 {
            assert!(backoff.after_failure() <= ms(5_000));
        }
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let policy: RestartPolicy = serde_json::from_str(r#"{"max_backoff_ms": 1000}"#).unwrap();
        assert_eq!(policy.max_backoff_ms, 1000);
        assert_eq!(policy.initial_backoff_ms, 250);
    }
}
