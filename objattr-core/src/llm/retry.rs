//! Bounded retry with jittered backoff behind a shared dispatch gate.
//!
//! Every attempt, retries included, first takes a permit from the gate. The permit is
//! held for the request only and dropped before the backoff sleep, so sleeping batches
//! never block the others.

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::transport::{CompletionRequest, CompletionTransport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// Uniformly random backoff within `[min, max]` milliseconds.
#[derive(Debug)]
pub struct Backoff {
    min_ms: u64,
    max_ms: u64,
    rng: Mutex<StdRng>,
}

impl Backoff {
    /// Seeded backoff is reproducible; `None` seeds from OS entropy.
    pub fn new(min_ms: u64, max_ms: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms,
            rng: Mutex::new(rng),
        }
    }

    pub fn next_delay(&self) -> Duration {
        let ms = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(self.min_ms..=self.max_ms),
            // A panic elsewhere poisoned the lock; fall back to the upper bound.
            Err(_) => self.max_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Attempts used so far against the allowed maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempts_used: u32,
    pub max_attempts: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts_used: 0,
            max_attempts,
        }
    }

    pub fn record_failure(&mut self) {
        self.attempts_used += 1;
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts_used >= self.max_attempts
    }
}

/// Retry limits and the backoff used between attempts.
#[derive(Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            backoff: Backoff::new(config.backoff_min_ms, config.backoff_max_ms, config.seed),
        }
    }
}

/// Terminal state of one batch request.
#[derive(Debug)]
pub enum RequestOutcome {
    /// HTTP 200 received; `retries` failed attempts preceded it.
    Success { body: String, retries: u32 },
    /// Gave up after `attempts` failed attempts.
    Exhausted {
        attempts: u32,
        last_error: Option<LlmError>,
    },
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Send `request` until it gets HTTP 200 or the policy's attempts run out.
///
/// Never returns an error: exhaustion is an outcome, not a failure of the caller.
pub async fn send_with_retry(
    transport: &dyn CompletionTransport,
    gate: &Semaphore,
    request: &CompletionRequest,
    policy: &RetryPolicy,
) -> RequestOutcome {
    let mut state = RetryState::new(policy.max_attempts);
    let mut last_error = None;

    while !state.is_exhausted() {
        let result = {
            let _permit = match gate.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Dispatch gate closed; abandoning request");
                    break;
                }
            };
            transport.send(request).await
        };

        let err = match result {
            Ok(response) if response.is_ok() => {
                return RequestOutcome::Success {
                    body: response.body,
                    retries: state.attempts_used,
                };
            }
            Ok(response) => LlmError::Status {
                status: response.status,
                body: truncate(&response.body, 300),
            },
            Err(e) => e,
        };

        state.record_failure();
        if !err.is_retryable() {
            warn!(error = %err, "Completion request failed permanently");
            last_error = Some(err);
            break;
        }
        if state.is_exhausted() {
            last_error = Some(err);
            break;
        }

        let delay = policy.backoff.next_delay();
        warn!(
            attempt = state.attempts_used,
            max = state.max_attempts,
            backoff_ms = delay.as_millis() as u64,
            error = %err,
            "Completion request failed; retrying"
        );
        last_error = Some(err);
        tokio::time::sleep(delay).await;
    }

    warn!(
        attempts = state.attempts_used,
        error = ?last_error.as_ref().map(ToString::to_string),
        "Max retries exceeded"
    );
    RequestOutcome::Exhausted {
        attempts: state.attempts_used,
        last_error,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::transport::RawResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a fixed sequence of responses, then repeats the last one.
    struct Scripted {
        script: Mutex<VecDeque<Result<RawResponse, LlmError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn statuses(statuses: &[u16]) -> Self {
            let script = statuses
                .iter()
                .map(|&status| {
                    Ok(RawResponse {
                        status,
                        body: format!("status {}", status),
                    })
                })
                .collect();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionTransport for Scripted {
        async fn send(&self, _request: &CompletionRequest) -> Result<RawResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                match script.front().unwrap() {
                    Ok(r) => Ok(r.clone()),
                    Err(_) => Err(LlmError::Transport {
                        message: "down".into(),
                    }),
                }
            }
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::new(0, 0, Some(7)),
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::user("test-model", "prompt")
    }

    #[tokio::test]
    async fn test_succeeds_on_last_attempt() {
        let max = 5;
        let mut statuses = vec![500; (max - 1) as usize];
        statuses.push(200);
        let transport = Scripted::statuses(&statuses);
        let gate = Semaphore::new(1);

        let outcome = send_with_retry(&transport, &gate, &request(), &policy(max)).await;
        match outcome {
            RequestOutcome::Success { body, retries } => {
                assert_eq!(body, "status 200");
                assert_eq!(retries, max - 1);
            }
            other => panic!("Expected success, got {:?}", other),
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), max);
        assert_eq!(gate.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_exhausts_without_error() {
        let transport = Scripted::statuses(&[429]);
        let gate = Semaphore::new(1);

        let outcome = send_with_retry(&transport, &gate, &request(), &policy(3)).await;
        match outcome {
            RequestOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(
                    last_error,
                    Some(LlmError::Status { status: 429, .. })
                ));
            }
            other => panic!("Expected exhaustion, got {:?}", other),
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(gate.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let transport = Scripted {
            script: Mutex::new(VecDeque::from(vec![
                Err(LlmError::Transport {
                    message: "reset".into(),
                }),
                Ok(RawResponse {
                    status: 200,
                    body: "ok".into(),
                }),
            ])),
            calls: AtomicU32::new(0),
        };
        let gate = Semaphore::new(1);
        let outcome = send_with_retry(&transport, &gate, &request(), &policy(3)).await;
        assert!(outcome.is_success());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_closed_gate_exhausts() {
        let transport = Scripted::statuses(&[200]);
        let gate = Semaphore::new(1);
        gate.close();
        let outcome = send_with_retry(&transport, &gate, &request(), &policy(3)).await;
        assert!(!outcome.is_success());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_backoff_within_bounds_and_seeded() {
        let a = Backoff::new(30, 120, Some(42));
        let b = Backoff::new(30, 120, Some(42));
        for _ in 0..50 {
            let da = a.next_delay();
            assert!(da >= Duration::from_millis(30) && da <= Duration::from_millis(120));
            assert_eq!(da, b.next_delay());
        }
    }

    #[test]
    fn test_retry_state() {
        let mut state = RetryState::new(2);
        assert!(!state.is_exhausted());
        state.record_failure();
        state.record_failure();
        assert!(state.is_exhausted());
        assert_eq!(state.attempts_used, 2);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ab", 3), "ab");
    }
}
