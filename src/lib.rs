//! # gavel-core
//!
//! Session-aware, bounded-loop orchestration around an adversarial LLM
//! code reviewer (the "judge"). Clients submit numbered thoughts carrying
//! code; the engine answers synchronously with a structured review and a
//! termination verdict. The value is orchestration, not judgment: bounded
//! iteration with tiered completion, stagnation detection, result
//! caching, admission control, prompt rendering, and recoverable failure
//! handling around an otherwise unreliable external reviewer.
//!
//! ## Core Components
//!
//! - **Judge**: uniform adapter over the external reviewer (stdio or HTTP)
//! - **Cache**: content-addressed review cache and rendered-prompt cache
//! - **Session**: durable per-conversation iteration history
//! - **Completion**: tiered termination, kill switches, stagnation
//! - **Engine**: the synchronous validate→cache→queue→judge pipeline
//! - **Auditor**: the prompt-driven top-level entry point
//!
//! ## Example
//!
//! ```rust,ignore
//! use gavel_core::{AuditRequestEnvelope, GavelConfig, PromptDrivenAuditor};
//!
//! let auditor = PromptDrivenAuditor::new(GavelConfig::default())?;
//!
//! let response = auditor
//!     .audit(AuditRequestEnvelope::new(1, "```rust\nfn f() {}\n```"))
//!     .await?;
//!
//! println!("{} ({})", response.review.overall, response.completion.reason);
//! ```

pub mod auditor;
pub mod cache;
pub mod completion;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod judge;
pub mod progress;
pub mod prompt;
pub mod queue;
pub mod resources;
pub mod session;
pub mod workflow;

// Re-exports for convenience
pub use auditor::{
    build_next_actions, AuditRequestEnvelope, AuditResponse, CompletionSummary,
    PromptDrivenAuditor, WorkspaceCollateral, WorkspaceGatherer,
};
pub use cache::{
    normalize_code, AuditCache, CacheStats, CachedPrompt, CodeFingerprint, PromptCache,
    PromptKeyParts, TemplateStats,
};
pub use completion::{
    jaccard_similarity, ActionPriority, CompletionDecision, CompletionEvaluator, NextAction,
    StagnationDetector, TerminationAssessment,
};
pub use config::{
    CacheLimits, CompletionCriteria, CompletionTier, ContextConfig, GavelConfig, HardStop,
    IdentityAuthority, IdentityConfig, IdentityStance, JudgeConfig, PromptCacheConfig,
    PromptConfig, QueueConfig, ResourceConfig, SecurityConfig, SessionConfig, SimilarityMetric,
    StagnationConfig,
};
pub use context::{ContextItem, ContextItemType, ContextOptimizer, ContextPriority, OptimizationResult};
pub use engine::{AuditOutcome, CodeTriage, SynchronousAuditEngine, TriageOutcome};
pub use error::{Error, ErrorSeverity, Result};
pub use judge::{
    AuditRequest, EvidenceItem, EvidenceKind, InlineComment, JudgeAdapter, JudgeCard,
    JudgeFailure, ProcessJudge, QualityDimension, RetryingJudge, Review, ReviewVerdict, Severity,
};
#[cfg(feature = "http-judge")]
pub use judge::HttpJudge;
pub use progress::{into_stream, AuditStage, ProgressStream, ProgressTracker, ProgressUpdate};
pub use prompt::{PromptTemplate, PromptVariables};
pub use queue::{AuditQueue, QueuePermit, QueueStats};
pub use resources::{CleanupOutcome, MemoryStatus, ResourceManager};
pub use session::{
    CompletionState, CompletionStatus, IterationRecord, Session, SessionStore, StagnationState,
    Thought,
};
pub use workflow::{default_steps, WorkflowStep};
