//! Bounded polling with configurable backoff
//!
//! One poller for every convergence check in the harness, parameterized by a
//! delay policy. Exponential doubling suits fast transient conditions
//! (resource lists converging right after an API call); a fixed delay suits
//! slow eventual-consistency conditions (DNS propagation, certificate
//! issuance) that legitimately take minutes.
//!
//! The action may have side effects ("delete everything listed, then report
//! how many remain") and is re-invoked on every attempt, so actions must be
//! idempotent.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::Result;

/// Delay schedule between poll attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPolicy {
    /// Constant delay between attempts.
    Fixed(Duration),
    /// Delay doubles from the initial seed: `initial`, `2*initial`, ...
    Exponential { initial: Duration },
}

impl DelayPolicy {
    /// Delay slept after the given 1-based attempt, before the next one.
    ///
    /// For `Exponential` with seed `d` this is `d * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            DelayPolicy::Fixed(delay) => *delay,
            DelayPolicy::Exponential { initial } => {
                initial.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            }
        }
    }
}

/// Attempt budget plus delay schedule for one convergence check.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Maximum number of observations before giving up.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub policy: DelayPolicy,
}

impl PollConfig {
    /// Exponentially growing delays starting from `initial`.
    pub fn exponential(initial: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            policy: DelayPolicy::Exponential { initial },
        }
    }

    /// Constant delay between attempts.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            policy: DelayPolicy::Fixed(delay),
        }
    }
}

/// Outcome of a bounded poll.
///
/// Exhaustion is a normal outcome the caller must check and act on, not an
/// error; it carries the last observation so callers can log diagnostic
/// state before deciding whether to abort the run.
#[derive(Debug)]
pub enum PollOutcome<T> {
    /// The predicate held for this observation.
    Satisfied(T),
    /// The attempt budget ran out; carries the last observation, if any.
    Exhausted(Option<T>),
}

impl<T> PollOutcome<T> {
    /// Whether the condition was met within the budget.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied(_))
    }

    /// The most recent observation, whether or not it satisfied.
    pub fn last_observed(&self) -> Option<&T> {
        match self {
            PollOutcome::Satisfied(value) => Some(value),
            PollOutcome::Exhausted(value) => value.as_ref(),
        }
    }
}

/// Repeatedly invoke `action` until `satisfied` holds or the budget runs out.
///
/// Returns immediately on satisfaction with no trailing delay. An `Err` from
/// `action` (a failed external command, not an unmet condition) aborts the
/// poll at once and propagates.
pub async fn poll<A, Fut, T, P>(
    config: PollConfig,
    check: &str,
    mut action: A,
    mut satisfied: P,
) -> Result<PollOutcome<T>>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    T: std::fmt::Debug,
    P: FnMut(&T) -> bool,
{
    let mut last = None;

    for attempt in 1..=config.max_attempts {
        let observed = action().await?;
        if satisfied(&observed) {
            return Ok(PollOutcome::Satisfied(observed));
        }
        last = Some(observed);

        if attempt < config.max_attempts {
            let delay = config.policy.delay_after(attempt);
            info!(
                check,
                attempt,
                delay_s = delay.as_secs_f64(),
                "condition not met, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    warn!(
        check,
        attempts = config.max_attempts,
        last = ?last,
        "retry budget exhausted"
    );
    Ok(PollOutcome::Exhausted(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fast delay for tests
    const TEST_DELAY: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn test_stops_at_exactly_the_satisfying_attempt() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let outcome = poll(
            PollConfig::fixed(TEST_DELAY, 10),
            "count",
            || {
                let c = c.clone();
                async move { Ok(c.fetch_add(1, Ordering::SeqCst) + 1) }
            },
            |observed| *observed == 3,
        )
        .await
        .expect("poll should not error");

        assert!(outcome.is_satisfied());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_delay_after_satisfaction() {
        // A day-long delay would blow the timeout if the poller slept after
        // the predicate held.
        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            poll(
                PollConfig::fixed(Duration::from_secs(86_400), 5),
                "instant",
                || async { Ok(42) },
                |observed| *observed == 42,
            ),
        )
        .await
        .expect("satisfied poll must not sleep")
        .expect("poll should not error");

        assert!(outcome.is_satisfied());
    }

    #[tokio::test]
    async fn test_exhaustion_performs_exactly_max_attempts() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let outcome = poll(
            PollConfig::exponential(TEST_DELAY, 4),
            "never",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(0)
                }
            },
            |_| false,
        )
        .await
        .expect("poll should not error");

        assert!(!outcome.is_satisfied());
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_exhaustion_carries_last_observation() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let outcome = poll(
            PollConfig::fixed(TEST_DELAY, 3),
            "sequence",
            || {
                let c = c.clone();
                async move { Ok(c.fetch_add(1, Ordering::SeqCst)) }
            },
            |_| false,
        )
        .await
        .expect("poll should not error");

        match outcome {
            PollOutcome::Exhausted(last) => assert_eq!(last, Some(2)),
            PollOutcome::Satisfied(_) => panic!("predicate is never true"),
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_exhausts_without_observing() {
        let outcome: PollOutcome<u32> = poll(
            PollConfig::fixed(TEST_DELAY, 0),
            "empty",
            || async { panic!("action must not run with an empty budget") },
            |_| true,
        )
        .await
        .expect("poll should not error");

        match outcome {
            PollOutcome::Exhausted(last) => assert!(last.is_none()),
            PollOutcome::Satisfied(_) => panic!("nothing was observed"),
        }
    }

    #[tokio::test]
    async fn test_action_error_aborts_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<PollOutcome<u32>> = poll(
            PollConfig::fixed(TEST_DELAY, 10),
            "failing",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(crate::Error::command_failed("gcloud", "boom"))
                }
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exponential_schedule_doubles_from_seed() {
        let policy = DelayPolicy::Exponential {
            initial: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(4), Duration::from_secs(8));
    }

    #[test]
    fn test_fixed_schedule_is_constant() {
        let policy = DelayPolicy::Fixed(Duration::from_secs(30));
        assert_eq!(policy.delay_after(1), Duration::from_secs(30));
        assert_eq!(policy.delay_after(7), Duration::from_secs(30));
    }
}
