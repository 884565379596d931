//! Content-addressed review cache.
//!
//! Fronts the judge: a resubmission of the same (normalized) code for the
//! same thought number returns the stored review without a judge call.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::fingerprint::CodeFingerprint;
use super::store::{CacheStats, LruTtlStore};
use crate::config::CacheLimits;
use crate::judge::Review;

/// Process-wide audit result cache.
pub struct AuditCache {
    store: Arc<RwLock<LruTtlStore<Review>>>,
}

impl AuditCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            store: Arc::new(RwLock::new(LruTtlStore::new(limits))),
        }
    }

    /// Look up a review by code fingerprint.
    pub async fn get(&self, fingerprint: &CodeFingerprint) -> Option<Review> {
        let result = self.store.write().await.get(&fingerprint.0);
        if result.is_some() {
            debug!("Audit cache hit for {}", fingerprint);
        }
        result
    }

    /// Store a review under its fingerprint.
    pub async fn set(&self, fingerprint: &CodeFingerprint, review: Review) {
        let size = estimate_review_size(&review);
        self.store
            .write()
            .await
            .set(fingerprint.0.clone(), review, size);
    }

    pub async fn has(&self, fingerprint: &CodeFingerprint) -> bool {
        self.store.read().await.has(&fingerprint.0)
    }

    /// Drop expired entries and enforce budgets.
    pub async fn cleanup(&self) {
        self.store.write().await.cleanup();
    }

    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }
}

/// Approximate the in-memory footprint of a review.
fn estimate_review_size(review: &Review) -> usize {
    let mut size = std::mem::size_of::<Review>();
    size += review.summary.len();
    for dim in &review.dimensions {
        size += dim.name.len() + std::mem::size_of::<f64>() + 1;
    }
    for comment in &review.inline {
        size += comment.path.len() + comment.comment.len() + 4;
    }
    for card in &review.judge_cards {
        size += card.model.len() + card.notes.as_deref().map(str::len).unwrap_or(0) + 1;
    }
    size
}
