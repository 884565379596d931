//! The prompt-driven auditor: the crate's top-level entry point.
//!
//! Wraps the synchronous audit engine with prompt rendering, completion
//! evaluation, next-action synthesis, and session persistence. One call
//! to [`PromptDrivenAuditor::audit`] takes a client envelope and returns
//! the full structured response.

pub mod actions;
pub mod workspace;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::cache::{AuditCache, PromptCache, PromptKeyParts};
use crate::completion::{CompletionDecision, CompletionEvaluator, NextAction};
use crate::config::{GavelConfig, IdentityAuthority};
use crate::context::{ContextItem, ContextItemType, ContextOptimizer, ContextPriority};
use crate::engine::SynchronousAuditEngine;
use crate::error::{Error, Result};
use crate::judge::{JudgeAdapter, JudgeCard, ProcessJudge, RetryingJudge, Review, ReviewVerdict};
use crate::prompt::{PromptTemplate, PromptVariables};
use crate::queue::AuditQueue;
use crate::resources::ResourceManager;
use crate::session::{CompletionStatus, Session, SessionStore, Thought};

pub use actions::build_next_actions;
pub use workspace::{WorkspaceCollateral, WorkspaceGatherer};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email pattern")
});

/// One client request, as received over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequestEnvelope {
    pub thought_number: u32,
    pub total_thoughts: u32,
    pub next_thought_needed: bool,
    pub thought: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
}

impl AuditRequestEnvelope {
    pub fn new(thought_number: u32, thought: impl Into<String>) -> Self {
        Self {
            thought_number,
            total_thoughts: thought_number,
            next_thought_needed: true,
            thought: thought.into(),
            session_id: None,
            branch_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.thought_number < 1 {
            return Err(Error::ConfigurationInvalid(
                "thoughtNumber must be at least 1".into(),
            ));
        }
        if self.total_thoughts < 1 {
            return Err(Error::ConfigurationInvalid(
                "totalThoughts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Completion block of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub status: CompletionStatus,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill_switch: Option<String>,
    pub next_thought_needed: bool,
}

impl From<&CompletionDecision> for CompletionSummary {
    fn from(decision: &CompletionDecision) -> Self {
        Self {
            status: decision.status,
            reason: decision.reason.clone(),
            tier: decision.tier.clone(),
            kill_switch: decision.kill_switch.clone(),
            next_thought_needed: decision.next_thought_needed,
        }
    }
}

/// One full response to a client envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub review: Review,
    pub completion: CompletionSummary,
    pub next_actions: Vec<NextAction>,
    pub session_id: String,
    #[serde(rename = "loop")]
    pub loop_number: u32,
    pub duration_ms: u64,
    pub timed_out: bool,
}

/// Top-level executor owning every process-wide singleton.
pub struct PromptDrivenAuditor {
    config: GavelConfig,
    engine: SynchronousAuditEngine,
    sessions: Arc<SessionStore>,
    prompt_cache: PromptCache,
    evaluator: CompletionEvaluator,
    template: PromptTemplate,
    gatherer: WorkspaceGatherer,
    optimizer: ContextOptimizer,
    audit_cache: Arc<AuditCache>,
    resources: Arc<ResourceManager>,
}

impl PromptDrivenAuditor {
    /// Boot with the default stdio judge.
    pub fn new(config: GavelConfig) -> Result<Self> {
        let judge: Arc<dyn JudgeAdapter> = Arc::new(RetryingJudge::new(
            ProcessJudge::new(config.judge.clone()),
            config.judge.max_transient_retries,
            Duration::from_millis(config.judge.backoff_base_ms),
        ));
        Self::with_judge(config, judge)
    }

    /// Boot with a caller-provided judge adapter.
    pub fn with_judge(config: GavelConfig, judge: Arc<dyn JudgeAdapter>) -> Result<Self> {
        config.validate()?;

        let sessions = Arc::new(SessionStore::open(&config.session.state_directory)?);
        let audit_cache = Arc::new(AuditCache::new(config.cache.audit.clone()));
        let queue = Arc::new(AuditQueue::new(config.audit.queue.max_concurrent));
        let resources = Arc::new(ResourceManager::new(config.resources.clone()));

        let template = match PromptTemplate::load(&config.prompt.template_path) {
            Ok(template) => template,
            Err(err) => {
                warn!("Prompt template rejected ({err}); using built-in fallback");
                PromptTemplate::fallback()
            }
        };

        let mut prompt_cache_config = config.cache.prompt.clone();
        prompt_cache_config.limits.max_age_ms = config.prompt.cache_max_age_ms;
        let prompt_cache = PromptCache::new(prompt_cache_config);

        let evaluator = CompletionEvaluator::new(config.completion.clone())?;
        let optimizer = ContextOptimizer::new(config.context.clone());

        let engine = SynchronousAuditEngine::new(
            config.clone(),
            judge,
            Arc::clone(&audit_cache),
            queue,
            Arc::clone(&sessions),
            Arc::clone(&resources),
        );

        let root = std::env::current_dir().unwrap_or_else(|_| ".".into());

        Ok(Self {
            config,
            engine,
            sessions,
            prompt_cache,
            evaluator,
            template,
            gatherer: WorkspaceGatherer::new(root),
            optimizer,
            audit_cache,
            resources,
        })
    }

    /// Override the workspace root used for collateral gathering.
    pub fn with_workspace_root(mut self, root: impl AsRef<Path>) -> Self {
        self.gatherer = WorkspaceGatherer::new(root);
        self
    }

    /// The session store, for embedders that manage sessions directly.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Audit one thought end to end.
    #[instrument(skip_all, fields(thought = envelope.thought_number))]
    pub async fn audit(&self, envelope: AuditRequestEnvelope) -> Result<AuditResponse> {
        envelope.validate()?;
        let started = Instant::now();

        let session = self
            .sessions
            .get_or_create(envelope.session_id.as_deref(), envelope.branch_id.as_deref())?;

        if !session.accepts_audits() {
            info!(
                "Session {} is {}; returning terminal response",
                session.id, session.completion.status
            );
            return Ok(self.terminal_response(session, started));
        }

        // Loop number this audit will occupy, per the pre-audit snapshot.
        let eval_loop = session.current_loop + 1;

        let collateral = self.shape_collateral(self.gatherer.gather());
        let mut variables = PromptVariables::from_config(&self.config, eval_loop);
        if let Some(context) = collateral.project_context {
            variables = variables.with_project_context(context);
        }
        if let Some(rules) = collateral.steering_rules {
            variables = variables.with_steering_rules(rules);
        }
        if let Some(requirements) = collateral.spec_requirements {
            variables = variables.with_spec_requirements(requirements);
        }

        let prompt = self
            .render_prompt(&envelope.thought, &session, &variables)
            .await;

        let thought = Thought {
            number: envelope.thought_number,
            text: envelope.thought.clone(),
            total_thoughts: envelope.total_thoughts,
            next_thought_needed: envelope.next_thought_needed,
        };

        let outcome = self
            .engine
            .audit_with_prompt(&thought, Some(&session.id), Some(prompt), None)
            .await;

        // Post-process against the updated session.
        let mut session = self.sessions.get(&session.id)?.unwrap_or(session);

        let stagnation = self.evaluator.assess_stagnation(&session);
        if stagnation != session.stagnation {
            session = self
                .sessions
                .update_stagnation(&session.id, stagnation.clone())?;
        }

        let decision = self
            .evaluator
            .evaluate(outcome.review.overall, eval_loop, Some(&session.stagnation));

        if decision.is_terminal() {
            session = self
                .sessions
                .update_completion(&session.id, decision.to_state())?;
        }

        let review = enhance_review(outcome.review, &decision);
        let next_actions = build_next_actions(&decision, &review);

        Ok(AuditResponse {
            review,
            completion: CompletionSummary::from(&decision),
            next_actions,
            session_id: session.id,
            loop_number: session.current_loop,
            duration_ms: outcome.duration_ms,
            timed_out: outcome.timed_out,
        })
    }

    /// Sweep cold sessions and expired cache entries.
    pub async fn maintenance(&self) -> Result<()> {
        self.sessions.cleanup(self.config.session.max_age_ms)?;
        self.audit_cache.cleanup().await;
        self.prompt_cache.cleanup().await;
        let _ = self.resources.run_cleanup();
        Ok(())
    }

    /// Sanitize and budget the workspace collateral before prompting.
    ///
    /// The optimizer prunes, compresses, and summarizes the collateral to
    /// the configured context budget. Spec requirements are marked
    /// critical when the identity treats the spec as ground truth.
    fn shape_collateral(&self, collateral: WorkspaceCollateral) -> WorkspaceCollateral {
        let sanitize = |content: String| -> String {
            if self.config.security.sanitize_pii {
                EMAIL_PATTERN.replace_all(&content, "[redacted]").into_owned()
            } else {
                content
            }
        };

        let requirements_priority =
            if self.config.identity.authority == IdentityAuthority::SpecAndSteeringGroundTruth {
                ContextPriority::Critical
            } else {
                ContextPriority::High
            };

        let mut items = Vec::new();
        if let Some(context) = collateral.project_context {
            items.push(
                ContextItem::new(
                    "project_context",
                    sanitize(context),
                    ContextItemType::Documentation,
                    ContextPriority::Medium,
                )
                .with_relevance(0.6),
            );
        }
        if let Some(rules) = collateral.steering_rules {
            items.push(
                ContextItem::new(
                    "steering_rules",
                    sanitize(rules),
                    ContextItemType::Steering,
                    ContextPriority::High,
                )
                .with_relevance(0.8),
            );
        }
        if let Some(requirements) = collateral.spec_requirements {
            items.push(
                ContextItem::new(
                    "spec_requirements",
                    sanitize(requirements),
                    ContextItemType::Requirements,
                    requirements_priority,
                )
                .with_relevance(0.9),
            );
        }

        let result = self.optimizer.optimize(items);
        let mut shaped = WorkspaceCollateral::default();
        for item in result.items {
            match item.id.as_str() {
                "project_context" => shaped.project_context = Some(item.content),
                "steering_rules" => shaped.steering_rules = Some(item.content),
                "spec_requirements" => shaped.spec_requirements = Some(item.content),
                _ => {}
            }
        }
        shaped
    }

    /// Render the system prompt, consulting the prompt cache.
    async fn render_prompt(
        &self,
        code: &str,
        session: &Session,
        variables: &PromptVariables,
    ) -> String {
        let workflow_config = serde_json::to_string(&self.config.audit).unwrap_or_default();
        let quality_config = serde_json::to_string(&self.config.completion).unwrap_or_default();
        let session_context = format!("{}:{}", session.id, session.current_loop);
        let parts = PromptKeyParts {
            template: self.template.source(),
            code,
            workflow_config: Some(&workflow_config),
            quality_config: Some(&quality_config),
            session_context: Some(&session_context),
        };

        if let Some(cached) = self.prompt_cache.get(&parts).await {
            return cached.prompt;
        }

        let render_started = Instant::now();
        let rendered = self.template.render(&variables.to_map());
        let render_ms = render_started.elapsed().as_millis() as u64;
        self.prompt_cache
            .set(&parts, rendered.clone(), render_ms)
            .await;
        rendered
    }

    /// Response for a session that no longer accepts audits.
    fn terminal_response(&self, session: Session, started: Instant) -> AuditResponse {
        let review = session.last_review.clone().unwrap_or_else(|| {
            Review::new(100, ReviewVerdict::Pass, "session already closed")
        });
        let next_actions = match session.completion.status {
            CompletionStatus::Completed => vec![NextAction::Complete],
            _ => vec![NextAction::Escalate {
                reason: session.completion.reason.clone(),
            }],
        };
        AuditResponse {
            review,
            completion: CompletionSummary {
                status: session.completion.status,
                reason: session.completion.reason.clone(),
                tier: session.completion.tier.clone(),
                kill_switch: session.completion.kill_switch.clone(),
                next_thought_needed: false,
            },
            next_actions,
            session_id: session.id,
            loop_number: session.current_loop,
            duration_ms: started.elapsed().as_millis() as u64,
            timed_out: false,
        }
    }
}

/// Fold the completion outcome into the review the client sees.
fn enhance_review(mut review: Review, decision: &CompletionDecision) -> Review {
    match decision.status {
        CompletionStatus::Completed => {
            review
                .summary
                .push_str(&format!("\n✅ COMPLETION: {}", decision.reason));
        }
        CompletionStatus::Terminated => {
            review
                .summary
                .push_str(&format!("\n⚠️ TERMINATED: {}", decision.reason));
        }
        CompletionStatus::InProgress => return review,
    }
    review.judge_cards.push(
        JudgeCard::new("completion-evaluator", review.overall).with_notes(decision.reason.clone()),
    );
    review
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::MockJudge;
    use pretty_assertions::assert_eq;

    fn test_config(dir: &tempfile::TempDir) -> GavelConfig {
        let mut config = GavelConfig::default();
        config.session.state_directory = dir.path().join("state");
        config
    }

    fn auditor_with(judge: MockJudge, dir: &tempfile::TempDir) -> PromptDrivenAuditor {
        PromptDrivenAuditor::with_judge(test_config(dir), Arc::new(judge))
            .unwrap()
            .with_workspace_root(dir.path())
    }

    fn code_envelope(n: u32) -> AuditRequestEnvelope {
        AuditRequestEnvelope::new(
            n,
            format!("```rust\nfn step_{n}(x: u32) -> u32 {{ x + {n} }}\n```"),
        )
    }

    #[tokio::test]
    async fn test_single_audit_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let judge =
            MockJudge::new().push(Ok(Review::new(72, ReviewVerdict::Revise, "needs tests")));
        let auditor = auditor_with(judge, &dir);

        let response = auditor.audit(code_envelope(1)).await.unwrap();

        assert_eq!(response.loop_number, 1);
        assert_eq!(response.completion.status, CompletionStatus::InProgress);
        assert!(response.completion.next_thought_needed);
        assert_eq!(response.review.overall, 72);
        assert!(!response.next_actions.is_empty());
        assert!(!response.timed_out);
    }

    #[tokio::test]
    async fn test_loops_are_monotone_within_session() {
        let dir = tempfile::tempdir().unwrap();
        let judge = MockJudge::new();
        let auditor = auditor_with(judge, &dir);

        let first = auditor.audit(code_envelope(1)).await.unwrap();
        let second = auditor
            .audit(code_envelope(2).with_session(first.session_id.clone()))
            .await
            .unwrap();

        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.loop_number, first.loop_number + 1);
    }

    #[tokio::test]
    async fn test_completion_at_tier1() {
        let dir = tempfile::tempdir().unwrap();
        let mut judge = MockJudge::new();
        for _ in 0..10 {
            judge = judge.push(Ok(Review::new(96, ReviewVerdict::Pass, "excellent")));
        }
        let auditor = auditor_with(judge, &dir);

        let mut session_id = None;
        let mut last = None;
        for n in 1..=10 {
            let mut envelope = code_envelope(n);
            if let Some(ref id) = session_id {
                envelope = envelope.with_session(String::clone(id));
            }
            let response = auditor.audit(envelope).await.unwrap();
            session_id = Some(response.session_id.clone());
            last = Some(response);
        }

        let last = last.unwrap();
        assert_eq!(last.completion.status, CompletionStatus::Completed);
        assert_eq!(last.completion.reason, "score_95_at_10");
        assert_eq!(last.completion.tier.as_deref(), Some("tier1"));
        assert!(!last.completion.next_thought_needed);
        assert_eq!(last.next_actions, vec![NextAction::Complete]);
        assert!(last.review.summary.contains("✅ COMPLETION"));
        assert!(last
            .review
            .judge_cards
            .iter()
            .any(|c| c.model == "completion-evaluator"));
    }

    #[tokio::test]
    async fn test_closed_session_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let mut judge = MockJudge::new();
        for _ in 0..10 {
            judge = judge.push(Ok(Review::new(96, ReviewVerdict::Pass, "excellent")));
        }
        let auditor = auditor_with(judge, &dir);

        let mut session_id: Option<String> = None;
        for n in 1..=10 {
            let mut envelope = code_envelope(n);
            if let Some(ref id) = session_id {
                envelope = envelope.with_session(String::clone(id));
            }
            let response = auditor.audit(envelope).await.unwrap();
            session_id = Some(response.session_id);
        }

        let after_close = auditor
            .audit(code_envelope(11).with_session(session_id.unwrap()))
            .await
            .unwrap();
        assert_eq!(after_close.completion.status, CompletionStatus::Completed);
        assert_eq!(after_close.loop_number, 10);
        assert_eq!(after_close.next_actions, vec![NextAction::Complete]);
    }

    #[tokio::test]
    async fn test_fallback_template_still_audits() {
        // Default config points at a template path that does not exist,
        // so the auditor boots on the fallback prompt.
        let dir = tempfile::tempdir().unwrap();
        let judge = MockJudge::new().push(Ok(Review::new(80, ReviewVerdict::Revise, "fine")));
        let auditor = auditor_with(judge, &dir);

        let response = auditor.audit(code_envelope(1)).await.unwrap();
        assert_eq!(response.review.overall, 80);
    }

    #[tokio::test]
    async fn test_invalid_envelope_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let auditor = auditor_with(MockJudge::new(), &dir);

        let mut envelope = code_envelope(1);
        envelope.thought_number = 0;
        assert!(auditor.audit(envelope).await.is_err());
    }

    #[tokio::test]
    async fn test_wire_format_is_camel_case() {
        let envelope: AuditRequestEnvelope = serde_json::from_str(
            r#"{
                "thoughtNumber": 2,
                "totalThoughts": 5,
                "nextThoughtNeeded": true,
                "thought": "```rust\nfn a() {}\n```",
                "sessionId": "s-1"
            }"#,
        )
        .unwrap();
        assert_eq!(envelope.thought_number, 2);
        assert_eq!(envelope.session_id.as_deref(), Some("s-1"));

        let dir = tempfile::tempdir().unwrap();
        let auditor = auditor_with(MockJudge::new(), &dir);
        let response = auditor.audit(code_envelope(1)).await.unwrap();
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"sessionId\""));
        assert!(json.contains("\"durationMs\""));
        assert!(json.contains("\"loop\""));
        assert!(json.contains("\"nextActions\""));
    }

    #[tokio::test]
    async fn test_failed_audit_does_not_advance_loop() {
        let dir = tempfile::tempdir().unwrap();
        let judge = MockJudge::new().push(Err(crate::judge::JudgeFailure::Unavailable(
            "judge binary missing".into(),
        )));
        let auditor = auditor_with(judge, &dir);

        let response = auditor.audit(code_envelope(1)).await.unwrap();
        assert_eq!(response.loop_number, 0);
        assert_eq!(response.review.verdict, ReviewVerdict::Reject);
        assert_eq!(response.completion.status, CompletionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_collateral_budgeted_and_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let steering = dir.path().join(".gavel/steering");
        std::fs::create_dir_all(&steering).unwrap();
        // Oversized steering content gets pruned to the context budget.
        std::fs::write(steering.join("rules.md"), "x ".repeat(50_000)).unwrap();
        std::fs::write(
            dir.path().join("README.md"),
            "maintained by alice@example.com",
        )
        .unwrap();

        let mut config = test_config(&dir);
        config.context.max_size = 10_000;
        let auditor = PromptDrivenAuditor::with_judge(config, Arc::new(MockJudge::new()))
            .unwrap()
            .with_workspace_root(dir.path());

        let shaped = auditor.shape_collateral(auditor.gatherer.gather());
        let total: usize = [
            shaped.project_context.as_deref(),
            shaped.steering_rules.as_deref(),
            shaped.spec_requirements.as_deref(),
        ]
        .iter()
        .flatten()
        .map(|s| s.len())
        .sum();
        assert!(total <= 10_000);

        let context = shaped.project_context.unwrap();
        assert!(!context.contains("alice@example.com"));
        assert!(context.contains("[redacted]"));
    }

    #[tokio::test]
    async fn test_spec_requirements_survive_budget_as_ground_truth() {
        let dir = tempfile::tempdir().unwrap();
        let spec_dir = dir.path().join(".gavel/spec");
        std::fs::create_dir_all(&spec_dir).unwrap();
        std::fs::write(spec_dir.join("req.md"), "must never drop writes").unwrap();

        let mut config = test_config(&dir);
        // Budget far too small for anything optional.
        config.context.max_size = 8;
        let auditor = PromptDrivenAuditor::with_judge(config, Arc::new(MockJudge::new()))
            .unwrap()
            .with_workspace_root(dir.path());

        let shaped = auditor.shape_collateral(auditor.gatherer.gather());
        assert_eq!(
            shaped.spec_requirements.as_deref(),
            Some("must never drop writes")
        );
    }

    #[tokio::test]
    async fn test_maintenance_runs() {
        let dir = tempfile::tempdir().unwrap();
        let auditor = auditor_with(MockJudge::new(), &dir);
        auditor.audit(code_envelope(1)).await.unwrap();
        auditor.maintenance().await.unwrap();
    }
}
