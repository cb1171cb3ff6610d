//! Retry supervisor: a bounded attempt loop with linearly growing delays.
//!
//! The loop is an explicit state machine: `Attempting(n)` moves to
//! `Succeeded`, to `Failed`, or (after a delay) to `Attempting(n + 1)`.
//! Each attempt owns and releases its own browsing context, so at most one
//! is ever alive.

use std::time::Duration;

use feargreed::Reading;

use crate::error::FetchError;
use crate::fetcher::AttemptSource;

/// Attempt bound and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, initial one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after failed attempt `attempt` (1-based): `base * attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Where the supervisor is in the attempt loop.
#[derive(Debug)]
pub enum AttemptState {
    /// About to run attempt `n` (1-based).
    Attempting(u32),
    Succeeded { reading: Reading, attempts: u32 },
    Failed { error: FetchError, attempts: u32 },
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptState::Attempting(_))
    }
}

/// A reading plus how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supervised {
    pub reading: Reading,
    pub attempts: u32,
}

/// Runs an [`AttemptSource`] under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetrySupervisor {
    policy: RetryPolicy,
}

impl RetrySupervisor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drive the loop to a terminal state.
    ///
    /// On exhaustion the error is `RetriesExhausted` wrapping only the last
    /// attempt's error; earlier ones are logged and dropped. Non-retryable
    /// errors end the loop immediately and are returned as-is.
    pub async fn run<S>(&self, source: &S) -> Result<Supervised, FetchError>
    where
        S: AttemptSource + ?Sized,
    {
        let mut state = AttemptState::Attempting(1);
        loop {
            state = match state {
                AttemptState::Succeeded { reading, attempts } => {
                    return Ok(Supervised { reading, attempts })
                }
                AttemptState::Failed { error, .. } => return Err(error),
                attempting => self.step(attempting, source).await,
            };
        }
    }

    /// One transition of the state machine.
    pub async fn step<S>(&self, state: AttemptState, source: &S) -> AttemptState
    where
        S: AttemptSource + ?Sized,
    {
        let n = match state {
            AttemptState::Attempting(n) => n,
            terminal => return terminal,
        };
        let max = self.policy.max_attempts;

        tracing::info!(attempt = n, max_attempts = max, "starting attempt");
        let error = match source.attempt().await {
            Ok(reading) => {
                tracing::info!(attempt = n, "attempt succeeded");
                return AttemptState::Succeeded {
                    reading,
                    attempts: n,
                };
            }
            Err(e) => e,
        };

        tracing::warn!(attempt = n, kind = error.kind(), "attempt {n} failed: {error}");

        if !error.is_retryable() {
            return AttemptState::Failed {
                error,
                attempts: n,
            };
        }
        if n >= max {
            return AttemptState::Failed {
                error: FetchError::RetriesExhausted {
                    attempts: n,
                    last: Box::new(error),
                },
                attempts: n,
            };
        }

        let delay = self.policy.delay_after(n);
        tracing::info!(delay_ms = delay.as_millis() as u64, "retrying ({n}/{})", max - 1);
        tokio::time::sleep(delay).await;
        AttemptState::Attempting(n + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Fails with the scripted errors in order, then succeeds.
    struct Scripted {
        failures: Mutex<Vec<FetchError>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(mut failures: Vec<FetchError>) -> Self {
            failures.reverse();
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    #[async_trait]
    impl AttemptSource for Scripted {
        async fn attempt(&self) -> Result<Reading, FetchError> {
            self.calls.lock().unwrap().push(Instant::now());
            match self.failures.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok(Reading::new(
                    62,
                    Some("greed".into()),
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                )),
            }
        }
    }

    fn no_score() -> FetchError {
        FetchError::NoScoreFound { strategies_tried: 3 }
    }

    #[test]
    fn test_linear_delays() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_after(1), Duration::from_secs(5));
        assert_eq!(p.delay_after(2), Duration::from_secs(10));
        assert_eq!(p.delay_after(3), Duration::from_secs(15));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetrySupervisor::default().policy(), &p);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_makes_exactly_four_attempts() {
        let source = Scripted::new((0..10).map(|_| no_score()).collect());
        let err = RetrySupervisor::default().run(&source).await.unwrap_err();

        assert_eq!(source.call_count(), 4);
        assert_eq!(
            source.gaps(),
            vec![
                Duration::from_millis(5000),
                Duration::from_millis(10000),
                Duration::from_millis(15000),
            ]
        );
        match err {
            FetchError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, FetchError::NoScoreFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_surfaces_only_last_error() {
        let source = Scripted::new(vec![
            FetchError::Navigation("reset".into()),
            FetchError::Render("blank".into()),
            no_score(),
            FetchError::NavigationTimeout {
                url: "https://example.test".into(),
                timeout_ms: 60000,
            },
        ]);
        let err = RetrySupervisor::default().run(&source).await.unwrap_err();
        let FetchError::RetriesExhausted { last, .. } = err else {
            panic!("expected exhaustion");
        };
        assert!(matches!(*last, FetchError::NavigationTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let source = Scripted::new(vec![no_score(), no_score()]);
        let out = RetrySupervisor::default().run(&source).await.unwrap();
        assert_eq!(out.attempts, 3);
        assert_eq!(out.reading.score, "62");
        assert_eq!(source.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_has_no_delay() {
        let source = Scripted::new(Vec::new());
        let start = Instant::now();
        let out = RetrySupervisor::default().run(&source).await.unwrap();
        assert_eq!(out.attempts, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_is_not_retried() {
        let source = Scripted::new(vec![FetchError::Launch("no chromium".into())]);
        let err = RetrySupervisor::default().run(&source).await.unwrap_err();
        assert!(matches!(err, FetchError::Launch(_)));
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_step_passes_terminal_states_through() {
        let source = Scripted::new(Vec::new());
        let sup = RetrySupervisor::new(RetryPolicy::new(2, Duration::ZERO));
        let state = sup
            .step(
                AttemptState::Failed {
                    error: no_score(),
                    attempts: 2,
                },
                &source,
            )
            .await;
        assert!(state.is_terminal());
        assert_eq!(source.call_count(), 0);
    }
}
