//! Stdio judge subprocess invocation.
//!
//! Spawns the external reviewer per request, writes the audit request as a
//! single JSON line on stdin, and reads a single JSON review line from
//! stdout. The child is killed on timeout so a wedged reviewer cannot hold
//! a queue slot past the audit budget.

use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::adapter::{JudgeAdapter, JudgeFailure};
use super::protocol::parse_review;
use super::types::{AuditRequest, Review};
use crate::config::JudgeConfig;

/// Judge adapter invoking an external reviewer over stdio.
pub struct ProcessJudge {
    config: JudgeConfig,
}

impl ProcessJudge {
    pub fn new(config: JudgeConfig) -> Self {
        Self { config }
    }

    /// Resolve the configured command to an executable path.
    ///
    /// Tilde and environment variables expand first; bare names are looked
    /// up on PATH.
    fn resolve_command(&self) -> Result<PathBuf, JudgeFailure> {
        let expanded = shellexpand::full(&self.config.command)
            .map_err(|e| JudgeFailure::Unavailable(format!("cannot expand judge command: {e}")))?
            .into_owned();

        if expanded.contains(std::path::MAIN_SEPARATOR) {
            let path = PathBuf::from(&expanded);
            if path.is_file() {
                return Ok(path);
            }
            return Err(JudgeFailure::Unavailable(format!(
                "judge command not found at '{expanded}'"
            )));
        }

        which::which(&expanded).map_err(|e| {
            JudgeFailure::Unavailable(format!("judge command '{expanded}' not on PATH: {e}"))
        })
    }
}

#[async_trait::async_trait]
impl JudgeAdapter for ProcessJudge {
    #[instrument(skip(self, request), fields(thought = request.thought_number))]
    async fn invoke(&self, request: &AuditRequest) -> Result<Review, JudgeFailure> {
        let command = self.resolve_command()?;
        debug!("Spawning judge process: {}", command.display());

        let mut child = Command::new(&command)
            .args(&self.config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                JudgeFailure::Unavailable(format!(
                    "failed to spawn judge '{}': {e}",
                    command.display()
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| JudgeFailure::Unavailable("failed to get stdin handle".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| JudgeFailure::Unavailable("failed to get stdout handle".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| JudgeFailure::Unavailable("failed to get stderr handle".into()))?;

        let payload = serde_json::to_string(request).map_err(|e| {
            JudgeFailure::Protocol {
                message: format!("failed to serialize audit request: {e}"),
                raw: None,
            }
        })?;

        let timeout = Duration::from_millis(request.timeout_ms);
        let exchange = async {
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| JudgeFailure::Transient(format!("judge stdin write failed: {e}")))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| JudgeFailure::Transient(format!("judge stdin write failed: {e}")))?;
            stdin
                .flush()
                .await
                .map_err(|e| JudgeFailure::Transient(format!("judge stdin flush failed: {e}")))?;
            // Signal end of input to line-buffered reviewers.
            drop(stdin);

            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| JudgeFailure::Transient(format!("judge stdout read failed: {e}")))?;

            if read == 0 {
                let mut diagnostics = String::new();
                let _ = stderr.read_to_string(&mut diagnostics).await;
                let diagnostics = diagnostics.trim();
                return Err(JudgeFailure::Transient(format!(
                    "judge exited without a review{}",
                    if diagnostics.is_empty() {
                        String::new()
                    } else {
                        format!(": {diagnostics}")
                    }
                )));
            }

            Ok(line)
        };

        let line = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(line)) => line,
            Ok(Err(failure)) => {
                let _ = child.kill().await;
                return Err(failure);
            }
            Err(_) => {
                warn!("Judge exceeded {}ms; killing process", request.timeout_ms);
                let _ = child.kill().await;
                return Err(JudgeFailure::Timeout {
                    duration_ms: request.timeout_ms,
                });
            }
        };

        // Reap the child; a slow exit after a complete review is not an error.
        let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;

        parse_review(line.trim())
    }

    fn name(&self) -> &str {
        "process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::types::ReviewVerdict;

    fn judge_with_command(command: &str, args: &[&str]) -> ProcessJudge {
        ProcessJudge::new(JudgeConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_missing_command_is_unavailable() {
        let judge = judge_with_command("definitely-not-a-real-judge-binary", &[]);
        let err = judge
            .invoke(&AuditRequest::new(1, "fn main() {}", 5_000))
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeFailure::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_echo_style_judge_roundtrip() {
        // `head -n1` reflects the request line back; not a valid review,
        // so the adapter must report a protocol error rather than panic.
        let judge = judge_with_command("head", &["-n1"]);
        let err = judge
            .invoke(&AuditRequest::new(1, "fn main() {}", 5_000))
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeFailure::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_valid_review_from_subprocess() {
        let judge = judge_with_command(
            "sh",
            &[
                "-c",
                r#"cat > /dev/null; echo '{"overall": 91, "verdict": "pass", "summary": "ok"}'"#,
            ],
        );
        let review = judge
            .invoke(&AuditRequest::new(1, "fn main() {}", 5_000))
            .await
            .unwrap();
        assert_eq!(review.overall, 91);
        assert_eq!(review.verdict, ReviewVerdict::Pass);
    }

    #[tokio::test]
    async fn test_stalled_judge_times_out() {
        let judge = judge_with_command("sleep", &["30"]);
        let request = AuditRequest::new(1, "fn main() {}", 200);
        let err = judge.invoke(&request).await.unwrap_err();
        assert!(matches!(err, JudgeFailure::Timeout { duration_ms: 200 }));
    }

    #[tokio::test]
    async fn test_silent_exit_is_transient() {
        let judge = judge_with_command("true", &[]);
        let err = judge
            .invoke(&AuditRequest::new(1, "fn main() {}", 5_000))
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeFailure::Transient(_)));
    }
}
