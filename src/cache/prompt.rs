//! Rendered prompt cache.
//!
//! Keyed on a composite hash of the template, the code under review, and
//! (by opt-in) the workflow/quality configuration and session context.
//! Shares the LRU+TTL machinery with the audit cache under independent,
//! smaller limits. Tracks per-template hit/miss and time-saved statistics.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::fingerprint::CodeFingerprint;
use super::store::{CacheStats, LruTtlStore};
use crate::config::PromptCacheConfig;

/// Inputs folded into a prompt cache key.
#[derive(Debug, Clone, Default)]
pub struct PromptKeyParts<'a> {
    pub template: &'a str,
    pub code: &'a str,
    pub workflow_config: Option<&'a str>,
    pub quality_config: Option<&'a str>,
    pub session_context: Option<&'a str>,
}

/// A cached render result.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPrompt {
    pub prompt: String,
    /// How long the original render took; accumulated as time saved on hits.
    pub render_time_ms: u64,
    /// Template hash, for per-template statistics.
    pub template_hash: String,
}

/// Per-template usage statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateStats {
    pub hits: u64,
    pub misses: u64,
    pub time_saved_ms: u64,
}

/// Process-wide rendered prompt cache.
pub struct PromptCache {
    store: Arc<RwLock<LruTtlStore<CachedPrompt>>>,
    per_template: Arc<RwLock<HashMap<String, TemplateStats>>>,
    config: PromptCacheConfig,
}

impl PromptCache {
    pub fn new(config: PromptCacheConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(LruTtlStore::new(config.limits.clone()))),
            per_template: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Build the composite cache key for the given parts.
    ///
    /// Session context is excluded unless opted in: it varies every loop
    /// and would defeat the cache.
    pub fn key(&self, parts: &PromptKeyParts<'_>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.config.key_version.as_bytes());
        hasher.update(b"\x00");
        hasher.update(CodeFingerprint::of_content(parts.template).0.as_bytes());
        hasher.update(b"\x00");
        hasher.update(CodeFingerprint::of_content(parts.code).0.as_bytes());

        if self.config.include_workflow_config {
            if let Some(workflow) = parts.workflow_config {
                hasher.update(b"\x00");
                hasher.update(CodeFingerprint::of_content(workflow).0.as_bytes());
            }
        }
        if self.config.include_quality_config {
            if let Some(quality) = parts.quality_config {
                hasher.update(b"\x00");
                hasher.update(CodeFingerprint::of_content(quality).0.as_bytes());
            }
        }
        if self.config.include_session_context {
            if let Some(session) = parts.session_context {
                hasher.update(b"\x00");
                hasher.update(CodeFingerprint::of_content(session).0.as_bytes());
            }
        }

        format!("{:x}", hasher.finalize())
    }

    /// Look up a rendered prompt.
    pub async fn get(&self, parts: &PromptKeyParts<'_>) -> Option<CachedPrompt> {
        let key = self.key(parts);
        let template_hash = CodeFingerprint::of_content(parts.template).0;
        let result = self.store.write().await.get(&key);

        let mut per_template = self.per_template.write().await;
        let stats = per_template.entry(template_hash).or_default();
        match &result {
            Some(cached) => {
                stats.hits += 1;
                stats.time_saved_ms += cached.render_time_ms;
                debug!("Prompt cache hit (saved ~{}ms)", cached.render_time_ms);
            }
            None => stats.misses += 1,
        }

        result
    }

    /// Store a rendered prompt.
    pub async fn set(&self, parts: &PromptKeyParts<'_>, prompt: String, render_time_ms: u64) {
        let key = self.key(parts);
        let template_hash = CodeFingerprint::of_content(parts.template).0;
        let size = prompt.len() + template_hash.len() + std::mem::size_of::<CachedPrompt>();
        self.store.write().await.set(
            key,
            CachedPrompt {
                prompt,
                render_time_ms,
                template_hash,
            },
            size,
        );
    }

    pub async fn cleanup(&self) {
        self.store.write().await.cleanup();
    }

    pub async fn clear(&self) {
        self.store.write().await.clear();
        self.per_template.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    pub async fn template_stats(&self, template: &str) -> TemplateStats {
        let hash = CodeFingerprint::of_content(template).0;
        self.per_template
            .read()
            .await
            .get(&hash)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TEMPLATE: &str = "You are ${IDENTITY_NAME}";

    #[tokio::test]
    async fn test_same_inputs_same_key() {
        let cache = PromptCache::new(PromptCacheConfig::default());
        let parts = PromptKeyParts {
            template: TEMPLATE,
            code: "fn main() {}",
            ..Default::default()
        };
        assert_eq!(cache.key(&parts), cache.key(&parts));
    }

    #[tokio::test]
    async fn test_code_change_changes_key() {
        let cache = PromptCache::new(PromptCacheConfig::default());
        let a = PromptKeyParts {
            template: TEMPLATE,
            code: "fn a() {}",
            ..Default::default()
        };
        let b = PromptKeyParts {
            template: TEMPLATE,
            code: "fn b() {}",
            ..Default::default()
        };
        assert_ne!(cache.key(&a), cache.key(&b));
    }

    #[tokio::test]
    async fn test_session_context_excluded_by_default() {
        let cache = PromptCache::new(PromptCacheConfig::default());
        let a = PromptKeyParts {
            template: TEMPLATE,
            code: "fn main() {}",
            session_context: Some("loop 4"),
            ..Default::default()
        };
        let b = PromptKeyParts {
            template: TEMPLATE,
            code: "fn main() {}",
            session_context: Some("loop 5"),
            ..Default::default()
        };
        assert_eq!(cache.key(&a), cache.key(&b));
    }

    #[tokio::test]
    async fn test_session_context_opt_in() {
        let config = PromptCacheConfig {
            include_session_context: true,
            ..Default::default()
        };
        let cache = PromptCache::new(config);
        let a = PromptKeyParts {
            template: TEMPLATE,
            code: "fn main() {}",
            session_context: Some("loop 4"),
            ..Default::default()
        };
        let b = PromptKeyParts {
            template: TEMPLATE,
            code: "fn main() {}",
            session_context: Some("loop 5"),
            ..Default::default()
        };
        assert_ne!(cache.key(&a), cache.key(&b));
    }

    #[tokio::test]
    async fn test_key_version_invalidates() {
        let v1 = PromptCache::new(PromptCacheConfig::default());
        let v2 = PromptCache::new(PromptCacheConfig {
            key_version: "v2".to_string(),
            ..Default::default()
        });
        let parts = PromptKeyParts {
            template: TEMPLATE,
            code: "fn main() {}",
            ..Default::default()
        };
        assert_ne!(v1.key(&parts), v2.key(&parts));
    }

    #[tokio::test]
    async fn test_per_template_time_saved() {
        let cache = PromptCache::new(PromptCacheConfig::default());
        let parts = PromptKeyParts {
            template: TEMPLATE,
            code: "fn main() {}",
            ..Default::default()
        };

        assert!(cache.get(&parts).await.is_none());
        cache.set(&parts, "rendered".to_string(), 40).await;
        assert!(cache.get(&parts).await.is_some());
        assert!(cache.get(&parts).await.is_some());

        let stats = cache.template_stats(TEMPLATE).await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.time_saved_ms, 80);
    }
}
