//! Fixed-budget retry around a single fallible inference call.
//!
//! Attempts are immediate and sequential: no backoff. The whole job already
//! runs under a deadline (see [`crate::process`]), which bounds the total
//! time spent here. A call that succeeded remotely but failed locally is
//! retried again (at-least-once).

use crate::error::InferenceError;
use std::future::Future;
use tracing::{debug, warn};

/// Invoke `operation` up to `max_attempts` times, returning the first success.
///
/// On exhaustion the last failure is wrapped in
/// [`InferenceError::RetriesExhausted`] with the attempt count. A budget of
/// zero is treated as one attempt.
pub async fn call_with_retry<T, F, Fut>(
    max_attempts: u32,
    mut operation: F,
) -> Result<T, InferenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InferenceError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Succeeded on attempt {}/{}", attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(e) => {
                warn!("Attempt {}/{} failed: {}", attempt, max_attempts, e);
                last_err = Some(e);
            }
        }
    }

    Err(InferenceError::RetriesExhausted {
        attempts: max_attempts,
        source: Box::new(last_err.unwrap_or(InferenceError::EmptyResponse)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let calls = AtomicU32::new(0);
        let out = call_with_retry(3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, InferenceError>("ok")
        })
        .await
        .unwrap();
        assert_eq!(out, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out = call_with_retry(3, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(InferenceError::Transport(format!("blip {n}")))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 3);
    }

    #[tokio::test]
    async fn exhaustion_makes_exactly_max_attempts_calls() {
        let calls = AtomicU32::new(0);
        let err = call_with_retry(3, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err::<(), _>(InferenceError::Transport(format!("failure {n}")))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            InferenceError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                // The last failure is the one kept.
                assert_eq!(source.to_string(), "Inference request failed: failure 3");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn zero_budget_still_tries_once() {
        let calls = AtomicU32::new(0);
        let _ = call_with_retry(0, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(InferenceError::EmptyResponse)
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
