//! Bounded retry with exponential backoff for one page's provider calls.
//!
//! ## Backoff schedule
//!
//! After the *k*-th failed attempt the policy sleeps
//! `base_delay * 2^(k-1)`, capped at `max_delay`. With the defaults
//! (10 s base, 180 s cap, 5 attempts) the waits are 10 s → 20 s → 40 s → 80 s.
//! Rate-limited providers often say how long to wait; when a
//! [`ProviderError::Retryable`] carries a `retry_after` hint the sleep is
//! stretched to at least that long (still capped).
//!
//! Attempts for one page are strictly sequential. Every attempt, successful
//! or not, yields exactly one [`TranslationAttempt`] record and one tracing
//! event, so callers never have to log attempts themselves.

use crate::error::ProviderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Retryable(String),
    Fatal(String),
}

/// Immutable record of one provider call for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationAttempt {
    /// 1-based page index.
    pub page_index: usize,
    /// 1-based attempt ordinal.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub at: DateTime<Utc>,
}

/// Result of [`RetryPolicy::execute`]: the final outcome plus every attempt made.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// `Ok(text)` on success, otherwise always [`ProviderError::Fatal`].
    pub result: Result<String, ProviderError>,
    pub attempts: Vec<TranslationAttempt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Always ≥ 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(180),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay to wait after the `failed_attempt`-th failure (1-based).
    pub fn delay_for(&self, failed_attempt: u32, retry_after: Option<Duration>) -> Duration {
        let factor = 1u32
            .checked_shl(failed_attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        let computed = self.base_delay.saturating_mul(factor);
        let wanted = match retry_after {
            Some(hint) => computed.max(hint),
            None => computed,
        };
        wanted.min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `operation` receives the 1-based attempt ordinal.
    pub async fn execute<F, Fut>(&self, page_index: usize, mut operation: F) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<String, ProviderError>>,
    {
        let mut attempts = Vec::new();
        let mut attempt = 1u32;

        loop {
            let result = operation(attempt).await;
            let at = Utc::now();

            match result {
                Ok(text) => {
                    debug!(page = page_index, attempt, "attempt succeeded");
                    attempts.push(TranslationAttempt {
                        page_index,
                        attempt,
                        outcome: AttemptOutcome::Success,
                        at,
                    });
                    return RetryOutcome {
                        result: Ok(text),
                        attempts,
                    };
                }
                Err(ProviderError::Fatal { reason }) => {
                    warn!(page = page_index, attempt, %reason, "attempt failed (fatal)");
                    attempts.push(TranslationAttempt {
                        page_index,
                        attempt,
                        outcome: AttemptOutcome::Fatal(reason.clone()),
                        at,
                    });
                    return RetryOutcome {
                        result: Err(ProviderError::Fatal { reason }),
                        attempts,
                    };
                }
                Err(ProviderError::Retryable {
                    reason,
                    retry_after,
                }) => {
                    attempts.push(TranslationAttempt {
                        page_index,
                        attempt,
                        outcome: AttemptOutcome::Retryable(reason.clone()),
                        at,
                    });

                    if attempt >= self.max_attempts {
                        warn!(
                            page = page_index,
                            attempt,
                            %reason,
                            "attempt failed (retryable), giving up"
                        );
                        return RetryOutcome {
                            result: Err(ProviderError::Fatal {
                                reason: format!(
                                    "gave up after {} attempts: {}",
                                    attempt, reason
                                ),
                            }),
                            attempts,
                        };
                    }

                    let delay = self.delay_for(attempt, retry_after);
                    warn!(
                        page = page_index,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "attempt failed (retryable), backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn delay_doubles_and_caps() {
        let p = RetryPolicy::new(5, Duration::from_secs(10), Duration::from_secs(180));
        assert_eq!(p.delay_for(1, None), Duration::from_secs(10));
        assert_eq!(p.delay_for(2, None), Duration::from_secs(20));
        assert_eq!(p.delay_for(3, None), Duration::from_secs(40));
        assert_eq!(p.delay_for(5, None), Duration::from_secs(160));
        assert_eq!(p.delay_for(6, None), Duration::from_secs(180));
        assert_eq!(p.delay_for(64, None), Duration::from_secs(180));
    }

    #[test]
    fn retry_after_hint_stretches_delay() {
        let p = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(
            p.delay_for(1, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
        // A hint shorter than the computed delay does not shorten it.
        assert_eq!(
            p.delay_for(3, Some(Duration::from_millis(10))),
            Duration::from_secs(4)
        );
        assert_eq!(
            p.delay_for(1, Some(Duration::from_secs(600))),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(instant_policy(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn succeeds_after_two_retryable_failures() {
        let calls = AtomicU32::new(0);
        let out = instant_policy(5)
            .execute(2, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(ProviderError::retryable("503 Service Unavailable"))
                    } else {
                        Ok("translated".to_string())
                    }
                }
            })
            .await;

        assert_eq!(out.result.unwrap(), "translated");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(out.attempts.len(), 3);
        assert_eq!(
            out.attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(out.attempts.iter().all(|a| a.page_index == 2));
        assert_eq!(out.attempts[2].outcome, AttemptOutcome::Success);
    }

    #[tokio::test]
    async fn fatal_stops_immediately() {
        let calls = AtomicU32::new(0);
        let out = instant_policy(5)
            .execute(1, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::fatal("401 invalid api key")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.attempts.len(), 1);
        assert!(matches!(out.result, Err(ProviderError::Fatal { .. })));
    }

    #[tokio::test]
    async fn exhaustion_becomes_fatal_with_last_reason() {
        let out = instant_policy(3)
            .execute(4, |attempt| async move {
                Err(ProviderError::retryable(format!("timeout #{attempt}")))
            })
            .await;

        assert_eq!(out.attempts.len(), 3);
        match out.result {
            Err(ProviderError::Fatal { reason }) => {
                assert!(reason.contains("3 attempts"), "got: {reason}");
                assert!(reason.contains("timeout #3"), "got: {reason}");
            }
            other => panic!("expected fatal, got {other:?}"),
        }
    }
}
