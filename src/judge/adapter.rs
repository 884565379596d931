//! Judge adapter trait and retry policy.
//!
//! The adapter is the uniform call surface over the external reviewer.
//! Failures are typed: only `Transient` is retried (with exponential
//! backoff); `Unavailable` and `Timeout` surface immediately so the engine
//! can fabricate the matching synthetic review.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{AuditRequest, Review};
use crate::error::Error;

/// Typed failure from a judge invocation.
#[derive(Debug, Clone)]
pub enum JudgeFailure {
    /// Process not found / spawn failed / endpoint unreachable.
    Unavailable(String),
    /// Exceeded the request timeout.
    Timeout { duration_ms: u64 },
    /// Malformed structured response.
    Protocol {
        message: String,
        raw: Option<String>,
    },
    /// Retryable failure (transport hiccup, 5xx, broken pipe mid-stream).
    Transient(String),
}

impl JudgeFailure {
    /// Only transient failures are retried.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl std::fmt::Display for JudgeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "judge unavailable: {msg}"),
            Self::Timeout { duration_ms } => write!(f, "judge timed out after {duration_ms}ms"),
            Self::Protocol { message, .. } => write!(f, "judge protocol error: {message}"),
            Self::Transient(msg) => write!(f, "transient judge failure: {msg}"),
        }
    }
}

impl From<JudgeFailure> for Error {
    fn from(failure: JudgeFailure) -> Self {
        match failure {
            JudgeFailure::Unavailable(msg) => Error::JudgeUnavailable(msg),
            JudgeFailure::Timeout { duration_ms } => Error::JudgeTimeout { duration_ms },
            JudgeFailure::Protocol { message, raw } => Error::JudgeProtocol { message, raw },
            JudgeFailure::Transient(msg) => Error::JudgeUnavailable(msg),
        }
    }
}

/// Uniform call surface over an external reviewer.
#[async_trait]
pub trait JudgeAdapter: Send + Sync {
    /// Invoke the judge once for the given request.
    async fn invoke(&self, request: &AuditRequest) -> Result<Review, JudgeFailure>;

    /// Human-readable backend name for judge cards and logs.
    fn name(&self) -> &str;
}

/// Retry wrapper applying the transient-only policy.
pub struct RetryingJudge<J> {
    inner: J,
    max_retries: u32,
    backoff_base: Duration,
}

impl<J: JudgeAdapter> RetryingJudge<J> {
    pub fn new(inner: J, max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            inner,
            max_retries,
            backoff_base,
        }
    }
}

#[async_trait]
impl<J: JudgeAdapter> JudgeAdapter for RetryingJudge<J> {
    async fn invoke(&self, request: &AuditRequest) -> Result<Review, JudgeFailure> {
        let mut attempt = 0u32;
        loop {
            match self.inner.invoke(request).await {
                Ok(review) => return Ok(review),
                Err(failure) if failure.retryable() && attempt < self.max_retries => {
                    let delay = self.backoff_base * 2u32.saturating_pow(attempt);
                    warn!(
                        "Transient judge failure (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.max_retries,
                        delay,
                        failure
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => {
                    debug!("Judge failure surfaced without retry: {}", failure);
                    return Err(failure);
                }
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// A scripted judge for testing the engine without a live reviewer.
#[cfg(test)]
pub struct MockJudge {
    results: std::sync::Mutex<std::collections::VecDeque<Result<Review, JudgeFailure>>>,
    invocations: std::sync::atomic::AtomicUsize,
    delay: Option<Duration>,
}

#[cfg(test)]
impl MockJudge {
    pub fn new() -> Self {
        Self {
            results: std::sync::Mutex::new(std::collections::VecDeque::new()),
            invocations: std::sync::atomic::AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Queue a result; results are consumed in FIFO order. When the queue
    /// is empty, a passing review is returned.
    pub fn push(self, result: Result<Review, JudgeFailure>) -> Self {
        self.results.lock().unwrap().push_back(result);
        self
    }

    /// Delay every invocation, for timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl JudgeAdapter for MockJudge {
    async fn invoke(&self, _request: &AuditRequest) -> Result<Review, JudgeFailure> {
        self.invocations
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(Review::new(
                90,
                super::types::ReviewVerdict::Pass,
                "mock review",
            )),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
