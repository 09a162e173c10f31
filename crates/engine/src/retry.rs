//! Bounded retry loop around a generation backend
//!
//! Every attempt runs under a hard timeout. Retryable backend failures and
//! payloads that fail strict decoding are retried with exponential backoff;
//! anything else ends the loop immediately.

use std::time::{Duration, Instant};

use lead_engine_core::{
    BackendError, EngineError, GenerationBackend, GenerationRequest, GenerationResponse,
};

use crate::telemetry;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub timeout: Duration,
}

/// Why the loop gave up
#[derive(Debug)]
pub(crate) struct Exhausted {
    pub attempts: u32,
    pub reason: String,
}

impl Exhausted {
    fn new(attempts: u32, reason: impl ToString) -> Self {
        Self {
            attempts,
            reason: reason.to_string(),
        }
    }
}

/// Call `backend` until `decode` accepts a payload or the policy runs out
///
/// `decode` returns a retryable `EngineError` (malformed payload) to request
/// another attempt; non-retryable errors stop the loop.
pub(crate) async fn call_with_retries<T, F>(
    backend: &dyn GenerationBackend,
    request: &GenerationRequest,
    policy: RetryPolicy,
    stage: &'static str,
    mut decode: F,
) -> Result<T, Exhausted>
where
    F: FnMut(&GenerationResponse) -> Result<T, EngineError>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let started = Instant::now();
        let outcome = match tokio::time::timeout(policy.timeout, backend.generate(request)).await {
            Ok(Ok(response)) => decode(&response),
            Ok(Err(e)) => Err(EngineError::Backend(e)),
            Err(_) => Err(EngineError::Backend(BackendError::Timeout)),
        };

        let err = match outcome {
            Ok(value) => {
                tracing::debug!(
                    stage,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Backend call succeeded"
                );
                return Ok(value);
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            tracing::warn!(stage, attempt, error = %err, "Backend call failed, not retrying");
            return Err(Exhausted::new(attempt, err));
        }
        if attempt > policy.max_retries {
            tracing::warn!(stage, attempts = attempt, error = %err, "Backend retries exhausted");
            return Err(Exhausted::new(attempt, err));
        }

        tracing::warn!(
            stage,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Backend call failed, retrying"
        );
        telemetry::record_backend_retry(stage);
        tokio::time::sleep(backoff).await;
        backoff = backoff.saturating_mul(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lead_engine_core::ResponseSchema;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
        error: BackendError,
    }

    #[async_trait]
    impl GenerationBackend for Flaky {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GenerationResponse, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(self.error.clone());
            }
            Ok(GenerationResponse {
                payload: format!("{}", n),
                model: "flaky".into(),
                latency_ms: 1,
            })
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(ResponseSchema::ContextAnalysis, "analyze", serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let backend = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 2,
            error: BackendError::Timeout,
        };
        let out = call_with_retries(&backend, &request(), policy(2), "test", |r| {
            Ok(r.payload.clone())
        })
        .await
        .unwrap();
        assert_eq!(out, "2");
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let backend = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error: BackendError::Unavailable("down".into()),
        };
        let err = call_with_retries(&backend, &request(), policy(2), "test", |r| {
            Ok(r.payload.clone())
        })
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 3);
        assert!(err.reason.contains("down"));
    }

    #[tokio::test]
    async fn test_rejection_not_retried() {
        let backend = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error: BackendError::Rejected("bad key".into()),
        };
        let err = call_with_retries(&backend, &request(), policy(5), "test", |r| {
            Ok(r.payload.clone())
        })
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_retried() {
        let backend = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 0,
            error: BackendError::Timeout,
        };
        let out = call_with_retries(&backend, &request(), policy(3), "test", |r| {
            if r.payload == "0" {
                Err(EngineError::MalformedAnalysis("first payload".into()))
            } else {
                Ok(r.payload.clone())
            }
        })
        .await
        .unwrap();
        assert_eq!(out, "1");
    }
}
