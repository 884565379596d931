//! The synchronous audit engine.
//!
//! Turns one thought into one review through a fixed pipeline: disabled
//! gate, code triage, cache lookup, queue admission under the session
//! lock, judge invocation under the audit timeout, then cache store and
//! session append. Every failure folds into a structured `AuditOutcome`;
//! the engine never surfaces an error to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use super::triage::{CodeTriage, ExtractedCode, TriageOutcome};
use crate::cache::{AuditCache, CodeFingerprint};
use crate::config::GavelConfig;
use crate::error::Error;
use crate::judge::{
    AuditRequest, EvidenceItem, EvidenceKind, JudgeAdapter, JudgeFailure, Review, ReviewVerdict,
    Severity,
};
use crate::progress::{AuditStage, ProgressTracker};
use crate::queue::AuditQueue;
use crate::resources::ResourceManager;
use crate::session::{SessionStore, Thought};
use crate::workflow::{default_steps, WorkflowStep};

/// Result of one audit, failures included.
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub review: Review,
    pub success: bool,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub session_id: Option<String>,
    pub error: Option<String>,
}

/// Top-level bounded, cache-fronted, queue-limited audit executor.
pub struct SynchronousAuditEngine {
    config: GavelConfig,
    judge: Arc<dyn JudgeAdapter>,
    cache: Arc<AuditCache>,
    queue: Arc<AuditQueue>,
    sessions: Arc<SessionStore>,
    resources: Arc<ResourceManager>,
    steps: Vec<Arc<dyn WorkflowStep>>,
    triage: CodeTriage,
}

impl SynchronousAuditEngine {
    pub fn new(
        config: GavelConfig,
        judge: Arc<dyn JudgeAdapter>,
        cache: Arc<AuditCache>,
        queue: Arc<AuditQueue>,
        sessions: Arc<SessionStore>,
        resources: Arc<ResourceManager>,
    ) -> Self {
        let triage = CodeTriage::new(config.audit.require_language_hint);
        let steps = default_steps(&config.security);
        Self {
            config,
            judge,
            cache,
            queue,
            sessions,
            resources,
            steps,
            triage,
        }
    }

    /// Replace the workflow step roster.
    pub fn with_steps(mut self, steps: Vec<Arc<dyn WorkflowStep>>) -> Self {
        self.steps = steps;
        self
    }

    /// Audit one thought and wait for the review.
    pub async fn audit_and_wait(
        &self,
        thought: &Thought,
        session_id: Option<&str>,
    ) -> AuditOutcome {
        self.audit_with_prompt(thought, session_id, None, None).await
    }

    /// Audit with an optional pre-rendered prompt and progress consumer.
    #[instrument(skip_all, fields(thought = thought.number, session = session_id.unwrap_or("-")))]
    pub async fn audit_with_prompt(
        &self,
        thought: &Thought,
        session_id: Option<&str>,
        rendered_prompt: Option<String>,
        progress: Option<&ProgressTracker>,
    ) -> AuditOutcome {
        let started = Instant::now();
        let internal_progress;
        let progress = match progress {
            Some(tracker) => tracker,
            None => {
                let (tracker, _rx) = ProgressTracker::channel();
                internal_progress = tracker;
                &internal_progress
            }
        };

        // Gate: auditing disabled.
        if !self.config.audit.enabled {
            return self.outcome(Review::auditing_disabled(), true, false, started, session_id, None);
        }

        // Triage: no code, or rejected format.
        let extracted = match self.triage.triage(&thought.text) {
            Ok(TriageOutcome::NoCode) => {
                return self.outcome(Review::no_code_detected(), true, false, started, session_id, None);
            }
            Ok(TriageOutcome::Code(extracted)) => extracted,
            Err(err) => {
                let mut review = Review::new(0, ReviewVerdict::Reject, "audit rejected: invalid code format");
                review.fold_evidence(&[EvidenceItem::new(
                    EvidenceKind::Format,
                    Severity::Major,
                    "triage",
                    err.to_string(),
                )
                .with_suggested_fix(err.suggested_fix().to_string())]);
                return self.outcome(review, false, false, started, session_id, Some(err.to_string()));
            }
        };

        // Resource watermarks: reclaim, and degrade when still critical.
        if let Err(err) = self.resources.check_and_reclaim() {
            let mut review = Review::new(
                50,
                ReviewVerdict::Revise,
                "audit degraded: resources exhausted",
            );
            review.fold_evidence(&[EvidenceItem::new(
                EvidenceKind::Performance,
                Severity::Major,
                "resources",
                err.to_string(),
            )]);
            return self.outcome(review, false, false, started, session_id, Some(err.to_string()));
        }

        // Cache lookup by normalized fingerprint.
        let fingerprint = CodeFingerprint::compute(&extracted.code, thought.number);
        if let Some(cached) = self.cache.get(&fingerprint).await {
            info!("Returning cached review for thought {}", thought.number);
            return self.outcome(cached, true, false, started, session_id, None);
        }

        // Admission: per-session lock, then a queue slot.
        let _session_guard = match session_id {
            Some(id) => match self
                .sessions
                .acquire(id, self.config.session.wait_when_busy)
                .await
            {
                Ok(guard) => Some(guard),
                Err(err @ Error::SessionBusy(_)) => {
                    let review = Review::new(
                        50,
                        ReviewVerdict::Revise,
                        "audit not performed: session busy",
                    );
                    return self.outcome(review, false, false, started, session_id, Some(err.to_string()));
                }
                Err(err) => {
                    let review = synthetic_failure(&err.to_string());
                    return self.outcome(review, false, false, started, session_id, Some(err.to_string()));
                }
            },
            None => None,
        };
        let _permit = self.queue.acquire().await;
        progress.update(AuditStage::Initializing).await;

        let mut request = AuditRequest::new(thought.number, extracted.code.clone(), self.config.audit.timeout_ms);
        if let Some(id) = session_id {
            request = request.with_session(id);
        }
        if let Some(ref language) = extracted.language {
            request = request.with_language(language.clone());
        }
        if let Some(prompt) = rendered_prompt {
            request = request.with_rendered_prompt(prompt);
        }

        let timeout = Duration::from_millis(self.config.audit.timeout_ms);
        let execution = self.execute(&request, &extracted, progress);

        match tokio::time::timeout(timeout, execution).await {
            Ok(Ok(review)) => {
                self.cache.set(&fingerprint, review.clone()).await;
                let appended = match session_id {
                    Some(id) => self
                        .sessions
                        .append(id, thought.clone(), review.clone())
                        .err(),
                    None => None,
                };
                progress.update(AuditStage::Completed).await;
                if let Some(err) = appended {
                    warn!("Review not recorded in session history: {err}");
                    return self.outcome(review, false, false, started, session_id, Some(err.to_string()));
                }
                self.outcome(review, true, false, started, session_id, None)
            }
            Ok(Err(failure)) => {
                self.recover(failure, progress, started, session_id).await
            }
            Err(_elapsed) => {
                self.recover(
                    JudgeFailure::Timeout {
                        duration_ms: self.config.audit.timeout_ms,
                    },
                    progress,
                    started,
                    session_id,
                )
                .await
            }
        }
    }

    /// Run workflow steps and the judge; fold evidence into the review.
    async fn execute(
        &self,
        request: &AuditRequest,
        extracted: &ExtractedCode,
        progress: &ProgressTracker,
    ) -> Result<Review, JudgeFailure> {
        let mut evidence = extracted.evidence.clone();

        for step in &self.steps {
            progress.update(step.stage()).await;
            match step.execute(request).await {
                Ok(items) => evidence.extend(items),
                Err(err) => {
                    warn!("Workflow step '{}' failed: {err}", step.name());
                    evidence.push(EvidenceItem::new(
                        EvidenceKind::Other,
                        Severity::Major,
                        step.name(),
                        format!("workflow step failed: {err}"),
                    ));
                }
            }
        }

        progress.update(AuditStage::QualityAssessment).await;
        let mut review = self.judge.invoke(request).await?;

        review.fold_evidence(&evidence);
        progress
            .update_with_partial(AuditStage::FeedbackGeneration, Some(review.clone()))
            .await;
        progress.update(AuditStage::ResponseFormatting).await;
        Ok(review)
    }

    /// Map a judge failure to the matching synthetic review.
    async fn recover(
        &self,
        failure: JudgeFailure,
        progress: &ProgressTracker,
        started: Instant,
        session_id: Option<&str>,
    ) -> AuditOutcome {
        match failure {
            JudgeFailure::Unavailable(ref detail) => {
                progress.update(AuditStage::Failed).await;
                warn!("Judge unavailable: {detail}");
                self.outcome(
                    Review::judge_unavailable(detail),
                    false,
                    false,
                    started,
                    session_id,
                    Some(failure.to_string()),
                )
            }
            JudgeFailure::Timeout { duration_ms } => {
                progress.update(AuditStage::TimedOut).await;
                let partial = if self.config.audit.graceful_timeout {
                    progress.usable_partial().await
                } else {
                    None
                };
                let review = match partial {
                    Some(partial) => {
                        info!("Timeout with usable partial results");
                        partial
                    }
                    None => Review::incomplete_timeout(duration_ms),
                };
                self.outcome(review, false, true, started, session_id, Some(failure.to_string()))
            }
            JudgeFailure::Protocol {
                ref message,
                ref raw,
            } => {
                progress.update(AuditStage::Failed).await;
                self.outcome(
                    Review::protocol_failure(message, raw.as_deref()),
                    false,
                    false,
                    started,
                    session_id,
                    Some(failure.to_string()),
                )
            }
            JudgeFailure::Transient(ref detail) => {
                progress.update(AuditStage::Failed).await;
                self.outcome(
                    synthetic_failure(detail),
                    false,
                    false,
                    started,
                    session_id,
                    Some(failure.to_string()),
                )
            }
        }
    }

    fn outcome(
        &self,
        review: Review,
        success: bool,
        timed_out: bool,
        started: Instant,
        session_id: Option<&str>,
        error: Option<String>,
    ) -> AuditOutcome {
        AuditOutcome {
            review,
            success,
            timed_out,
            duration_ms: started.elapsed().as_millis() as u64,
            session_id: session_id.map(str::to_string),
            error,
        }
    }
}

/// Reject-verdict review for generic audit failures.
fn synthetic_failure(detail: &str) -> Review {
    let mut review = Review::new(0, ReviewVerdict::Reject, "audit failed");
    review.fold_evidence(&[EvidenceItem::new(
        EvidenceKind::Other,
        Severity::Critical,
        "engine",
        format!("audit failed: {detail}"),
    )]);
    review
}
