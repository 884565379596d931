//! Configuration for the audit engine.
//!
//! All options are optional in the serialized form and fall back to the
//! defaults below. `GavelConfig::validate` enforces the cross-field
//! invariants (tier ordering, option bounds) and is called once at boot;
//! a violation is fatal.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Bounds for `audit.timeout_ms`.
pub const MIN_AUDIT_TIMEOUT_MS: u64 = 5_000;
pub const MAX_AUDIT_TIMEOUT_MS: u64 = 300_000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GavelConfig {
    pub audit: AuditConfig,
    pub judge: JudgeConfig,
    pub cache: CacheConfig,
    pub completion: CompletionCriteria,
    pub context: ContextConfig,
    pub prompt: PromptConfig,
    pub session: SessionConfig,
    pub resources: ResourceConfig,
    pub security: SecurityConfig,
    pub identity: IdentityConfig,
}

impl GavelConfig {
    /// Validate the whole tree. Called once at boot; any violation is fatal.
    pub fn validate(&self) -> Result<()> {
        self.audit.validate()?;
        self.completion.validate()?;
        self.context.validate()?;
        self.prompt.validate()?;
        self.resources.validate()?;
        Ok(())
    }
}

/// Audit engine options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Wall-clock budget for one audit in milliseconds.
    pub timeout_ms: u64,
    /// When false, every thought gets a synthetic "auditing disabled" pass.
    pub enabled: bool,
    /// Reject thoughts whose fenced code carries no recognizable language.
    pub require_language_hint: bool,
    /// Return partial results captured before a timeout boundary.
    pub graceful_timeout: bool,
    pub queue: QueueConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            enabled: true,
            require_language_hint: false,
            graceful_timeout: true,
            queue: QueueConfig::default(),
        }
    }
}

impl AuditConfig {
    fn validate(&self) -> Result<()> {
        if !(MIN_AUDIT_TIMEOUT_MS..=MAX_AUDIT_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(Error::ConfigurationInvalid(format!(
                "audit.timeout_ms must be within {}..={}, got {}",
                MIN_AUDIT_TIMEOUT_MS, MAX_AUDIT_TIMEOUT_MS, self.timeout_ms
            )));
        }
        if self.queue.max_concurrent == 0 {
            return Err(Error::ConfigurationInvalid(
                "audit.queue.max_concurrent must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Admission control options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum audits in flight across all sessions.
    pub max_concurrent: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// External reviewer invocation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Command to spawn for stdio invocation. Tilde and env vars expand.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// HTTP endpoint for RPC invocation (used by the `http-judge` feature).
    pub endpoint: Option<String>,
    /// Retry attempts for transient failures only.
    pub max_transient_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub backoff_base_ms: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            command: "gavel-judge".to_string(),
            args: Vec::new(),
            endpoint: None,
            max_transient_retries: 2,
            backoff_base_ms: 250,
        }
    }
}

/// Limits for one cache instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_age_ms: u64,
    pub max_memory_bytes: usize,
    pub cleanup_interval_ms: u64,
    pub enable_stats: bool,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            max_age_ms: 30 * 60 * 1_000,
            max_memory_bytes: 64 * 1024 * 1024,
            cleanup_interval_ms: 5 * 60 * 1_000,
            enable_stats: true,
        }
    }
}

impl CacheLimits {
    /// Smaller/shorter defaults for the prompt cache.
    pub fn prompt_defaults() -> Self {
        Self {
            max_entries: 200,
            max_age_ms: 10 * 60 * 1_000,
            max_memory_bytes: 16 * 1024 * 1024,
            cleanup_interval_ms: 2 * 60 * 1_000,
            enable_stats: true,
        }
    }
}

/// Audit and prompt cache options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub audit: CacheLimits,
    pub prompt: PromptCacheConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            audit: CacheLimits::default(),
            prompt: PromptCacheConfig::default(),
        }
    }
}

/// Prompt cache options: shared limit shape plus key composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptCacheConfig {
    #[serde(flatten)]
    pub limits: CacheLimits,
    /// Version string folded into every key; bump to invalidate.
    pub key_version: String,
    /// Session context is too variable to key on by default.
    pub include_session_context: bool,
    pub include_workflow_config: bool,
    pub include_quality_config: bool,
}

impl Default for PromptCacheConfig {
    fn default() -> Self {
        Self {
            limits: CacheLimits::prompt_defaults(),
            key_version: "v1".to_string(),
            include_session_context: false,
            include_workflow_config: true,
            include_quality_config: true,
        }
    }
}

/// A (score, loop floor) pair that authorizes completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionTier {
    pub score: u8,
    pub min_loops: u32,
}

/// Hard iteration ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardStop {
    pub max_loops: u32,
}

/// Similarity metric used for stagnation detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Jaccard similarity over 3-token shingles.
    JaccardShingles,
    /// Score improvement below 2 over the last 3 iterations.
    ScoreImprovement,
}

/// Stagnation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagnationConfig {
    /// Loop at which stagnation checks begin.
    pub start_loop: u32,
    /// Both code and summary similarity must exceed this.
    pub similarity_threshold: f64,
    pub metric: SimilarityMetric,
}

impl Default for StagnationConfig {
    fn default() -> Self {
        Self {
            start_loop: 10,
            similarity_threshold: 0.95,
            metric: SimilarityMetric::JaccardShingles,
        }
    }
}

/// Tiered completion criteria plus hard stop and stagnation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionCriteria {
    pub tier1: CompletionTier,
    pub tier2: CompletionTier,
    pub tier3: CompletionTier,
    pub hard_stop: HardStop,
    pub stagnation: StagnationConfig,
}

impl Default for CompletionCriteria {
    fn default() -> Self {
        Self {
            tier1: CompletionTier {
                score: 95,
                min_loops: 10,
            },
            tier2: CompletionTier {
                score: 90,
                min_loops: 15,
            },
            tier3: CompletionTier {
                score: 85,
                min_loops: 20,
            },
            hard_stop: HardStop { max_loops: 25 },
            stagnation: StagnationConfig::default(),
        }
    }
}

impl CompletionCriteria {
    /// Enforce tier ordering: scores descending, loop floors ascending.
    pub fn validate(&self) -> Result<()> {
        for tier in [&self.tier1, &self.tier2, &self.tier3] {
            if tier.score > 100 {
                return Err(Error::ConfigurationInvalid(format!(
                    "completion tier score must be within 0..=100, got {}",
                    tier.score
                )));
            }
        }
        if !(self.tier1.score >= self.tier2.score && self.tier2.score >= self.tier3.score) {
            return Err(Error::ConfigurationInvalid(format!(
                "completion tier scores must be descending: {} >= {} >= {}",
                self.tier1.score, self.tier2.score, self.tier3.score
            )));
        }
        if !(self.tier1.min_loops <= self.tier2.min_loops
            && self.tier2.min_loops <= self.tier3.min_loops
            && self.tier3.min_loops <= self.hard_stop.max_loops)
        {
            return Err(Error::ConfigurationInvalid(format!(
                "completion loop floors must be ascending up to the hard stop: {} <= {} <= {} <= {}",
                self.tier1.min_loops,
                self.tier2.min_loops,
                self.tier3.min_loops,
                self.hard_stop.max_loops
            )));
        }
        if !(0.0..=1.0).contains(&self.stagnation.similarity_threshold) {
            return Err(Error::ConfigurationInvalid(format!(
                "completion.stagnation.similarity_threshold must be within 0..=1, got {}",
                self.stagnation.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Context optimization options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Hard ceiling on assembled context, in bytes.
    pub max_size: usize,
    /// Optimization target; defaults to 80% of `max_size` when zero.
    pub target_size: usize,
    /// Items below this relevance are dropped unless critical.
    pub min_relevance: f64,
    pub enable_compression: bool,
    pub enable_summarization: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_size: 200 * 1024,
            target_size: 0,
            min_relevance: 0.1,
            enable_compression: true,
            enable_summarization: true,
        }
    }
}

impl ContextConfig {
    /// Effective optimization target with the 80% headroom default.
    pub fn effective_target(&self) -> usize {
        if self.target_size > 0 {
            self.target_size
        } else {
            (self.max_size as f64 * 0.8) as usize
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::ConfigurationInvalid(
                "context.max_size must be nonzero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_relevance) {
            return Err(Error::ConfigurationInvalid(format!(
                "context.min_relevance must be within 0..=1, got {}",
                self.min_relevance
            )));
        }
        if self.target_size > self.max_size {
            return Err(Error::ConfigurationInvalid(format!(
                "context.target_size ({}) exceeds context.max_size ({})",
                self.target_size, self.max_size
            )));
        }
        Ok(())
    }
}

/// Prompt template options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Path to the system prompt template file.
    pub template_path: PathBuf,
    /// TTL for rendered prompt cache entries.
    pub cache_max_age_ms: u64,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("prompts/system-prompt.md"),
            cache_max_age_ms: 10 * 60 * 1_000,
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<()> {
        if self.template_path.as_os_str().is_empty() {
            return Err(Error::ConfigurationInvalid(
                "prompt.template_path must be set".into(),
            ));
        }
        Ok(())
    }
}

/// Session persistence options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding the durable session database.
    pub state_directory: PathBuf,
    /// Cold sessions older than this are swept.
    pub max_age_ms: u64,
    pub cleanup_interval_ms: u64,
    /// When true, a concurrent audit on a busy session waits for the lock
    /// instead of returning SessionBusy.
    pub wait_when_busy: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_directory: PathBuf::from(".gavel/state"),
            max_age_ms: 24 * 60 * 60 * 1_000,
            cleanup_interval_ms: 60 * 60 * 1_000,
            wait_when_busy: false,
        }
    }
}

/// Process-wide resource budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub max_heap_bytes: usize,
    pub max_rss_bytes: usize,
    pub max_file_descriptors: usize,
    /// Warning watermark as a percentage of the heap budget.
    pub memory_warning_pct: u8,
    /// Critical watermark triggering automatic cleanup.
    pub memory_critical_pct: u8,
    pub gc_interval_ms: u64,
    pub enable_auto_gc: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_heap_bytes: 512 * 1024 * 1024,
            max_rss_bytes: 1024 * 1024 * 1024,
            max_file_descriptors: 1_024,
            memory_warning_pct: 80,
            memory_critical_pct: 95,
            gc_interval_ms: 60_000,
            enable_auto_gc: true,
        }
    }
}

impl ResourceConfig {
    fn validate(&self) -> Result<()> {
        if self.memory_warning_pct > 100 || self.memory_critical_pct > 100 {
            return Err(Error::ConfigurationInvalid(
                "resource watermark percentages must be within 0..=100".into(),
            ));
        }
        if self.memory_warning_pct > self.memory_critical_pct {
            return Err(Error::ConfigurationInvalid(format!(
                "resources.memory_warning_pct ({}) exceeds memory_critical_pct ({})",
                self.memory_warning_pct, self.memory_critical_pct
            )));
        }
        Ok(())
    }
}

/// Security posture carried into prompts and workflow steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub sanitize_pii: bool,
    pub validate_commands: bool,
    pub respect_permissions: bool,
    pub flag_vulnerabilities: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sanitize_pii: true,
            validate_commands: true,
            respect_permissions: true,
            flag_vulnerabilities: true,
        }
    }
}

/// Reviewer stance toward the code under audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityStance {
    Adversarial,
    Collaborative,
    ConstructiveAdversarial,
}

impl std::fmt::Display for IdentityStance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adversarial => write!(f, "adversarial"),
            Self::Collaborative => write!(f, "collaborative"),
            Self::ConstructiveAdversarial => write!(f, "constructive-adversarial"),
        }
    }
}

/// What the reviewer treats as ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityAuthority {
    SpecAndSteeringGroundTruth,
    Flexible,
    Advisory,
}

impl std::fmt::Display for IdentityAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpecAndSteeringGroundTruth => write!(f, "spec-and-steering-ground-truth"),
            Self::Flexible => write!(f, "flexible"),
            Self::Advisory => write!(f, "advisory"),
        }
    }
}

/// Reviewer identity rendered into the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: String,
    pub role: String,
    pub stance: IdentityStance,
    pub authority: IdentityAuthority,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "Gavel".to_string(),
            role: "Adversarial code auditor".to_string(),
            stance: IdentityStance::ConstructiveAdversarial,
            authority: IdentityAuthority::SpecAndSteeringGroundTruth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = GavelConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_tiers_match_policy() {
        let criteria = CompletionCriteria::default();
        assert_eq!(criteria.tier1.score, 95);
        assert_eq!(criteria.tier1.min_loops, 10);
        assert_eq!(criteria.tier2.score, 90);
        assert_eq!(criteria.tier2.min_loops, 15);
        assert_eq!(criteria.tier3.score, 85);
        assert_eq!(criteria.tier3.min_loops, 20);
        assert_eq!(criteria.hard_stop.max_loops, 25);
    }

    #[test]
    fn test_tier_score_ordering_enforced() {
        let mut criteria = CompletionCriteria::default();
        criteria.tier2.score = 97;
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn test_tier_loop_ordering_enforced() {
        let mut criteria = CompletionCriteria::default();
        criteria.tier3.min_loops = 30;
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn test_timeout_bounds_enforced() {
        let mut config = GavelConfig::default();
        config.audit.timeout_ms = 1_000;
        assert!(config.validate().is_err());

        config.audit.timeout_ms = 400_000;
        assert!(config.validate().is_err());

        config.audit.timeout_ms = 30_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_effective_target_defaults_to_80_pct() {
        let context = ContextConfig {
            max_size: 100_000,
            target_size: 0,
            ..Default::default()
        };
        assert_eq!(context.effective_target(), 80_000);

        let explicit = ContextConfig {
            max_size: 100_000,
            target_size: 50_000,
            ..Default::default()
        };
        assert_eq!(explicit.effective_target(), 50_000);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = GavelConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: GavelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.completion.hard_stop.max_loops, 25);
        assert_eq!(back.identity.stance, IdentityStance::ConstructiveAdversarial);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"audit": {"timeout_ms": 10000}}"#;
        let config: GavelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.audit.timeout_ms, 10_000);
        assert!(config.audit.enabled);
        assert_eq!(config.audit.queue.max_concurrent, 4);
    }
}
