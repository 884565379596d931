//! HTTP judge invocation.
//!
//! Posts the audit request to a configured RPC endpoint and parses the
//! review from the response body. Connection failures map to
//! `Unavailable`, 5xx responses to `Transient`, 4xx to `Protocol`.

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

use super::adapter::{JudgeAdapter, JudgeFailure};
use super::protocol::parse_review;
use super::types::{AuditRequest, Review};
use crate::config::JudgeConfig;

/// Judge adapter invoking an external reviewer over HTTP.
pub struct HttpJudge {
    endpoint: String,
    http: Client,
}

impl HttpJudge {
    pub fn new(config: &JudgeConfig) -> Result<Self, JudgeFailure> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| JudgeFailure::Unavailable("judge.endpoint is not configured".into()))?;

        let http = Client::builder()
            .build()
            .map_err(|e| JudgeFailure::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { endpoint, http })
    }
}

#[async_trait::async_trait]
impl JudgeAdapter for HttpJudge {
    #[instrument(skip(self, request), fields(thought = request.thought_number))]
    async fn invoke(&self, request: &AuditRequest) -> Result<Review, JudgeFailure> {
        debug!("Posting audit request to {}", self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .timeout(Duration::from_millis(request.timeout_ms))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JudgeFailure::Timeout {
                        duration_ms: request.timeout_ms,
                    }
                } else if e.is_connect() {
                    JudgeFailure::Unavailable(format!("cannot reach judge endpoint: {e}"))
                } else {
                    JudgeFailure::Transient(format!("judge request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| JudgeFailure::Transient(format!("failed to read judge response: {e}")))?;

        if status.is_server_error() {
            return Err(JudgeFailure::Transient(format!(
                "judge endpoint returned {status}: {body}"
            )));
        }
        if !status.is_success() {
            return Err(JudgeFailure::Protocol {
                message: format!("judge endpoint returned {status}"),
                raw: Some(body),
            });
        }

        parse_review(&body)
    }

    fn name(&self) -> &str {
        "http"
    }
}
