use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::types::RetryPolicy;

/// Last error of an operation that did not succeed within its attempt budget.
#[derive(Debug)]
pub struct RetryTerminal<E> {
    pub error: E,
    pub attempts: u32,
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or exhausts
/// `policy.max_attempts`. `key` seeds the jitter so neighbouring ids don't back off
/// in lockstep.
pub async fn run_with_retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    key: i64,
    mut op: F,
    mut is_retryable: R,
) -> Result<(T, u32), RetryTerminal<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) if attempt < max_attempts && is_retryable(&error) => {
                let delay = backoff_delay(policy, attempt, key);
                debug!(
                    event = "retry_scheduled",
                    key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after transient failure"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(error) => {
                return Err(RetryTerminal {
                    error,
                    attempts: attempt,
                })
            }
        }
    }
}

/// Exponential backoff capped at `max_backoff`, plus up to `jitter` derived from
/// `(key, attempt)`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32, key: i64) -> Duration {
    if policy.initial_backoff.is_zero() && policy.jitter.is_zero() {
        return Duration::ZERO;
    }

    let shift = attempt.saturating_sub(1).min(20);
    let exponential_ms = policy
        .initial_backoff
        .as_millis()
        .saturating_mul(1u128 << shift)
        .min(policy.max_backoff.as_millis());
    let jitter_ms = mix(key, attempt) % (policy.jitter.as_millis() + 1);

    let total_ms = exponential_ms.saturating_add(jitter_ms);
    Duration::from_millis(total_ms.min(u64::MAX as u128) as u64)
}

// splitmix64 finalizer
fn mix(key: i64, attempt: u32) -> u128 {
    let mut x = (key as u64) ^ (attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    x as u128
}
