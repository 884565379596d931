//! Context item types and scoring weights.

use serde::{Deserialize, Serialize};

/// What a context item contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextItemType {
    SystemPrompt,
    Requirements,
    Design,
    Code,
    Tests,
    Documentation,
    Steering,
    SessionHistory,
    Error,
    Metadata,
}

impl ContextItemType {
    /// Contribution of the type to the selection score.
    pub fn weight(&self) -> f64 {
        match self {
            Self::SystemPrompt => 1.0,
            Self::Requirements => 0.9,
            Self::Code => 0.85,
            Self::Design => 0.8,
            Self::Error => 0.8,
            Self::Steering => 0.75,
            Self::Tests => 0.7,
            Self::SessionHistory => 0.6,
            Self::Documentation => 0.5,
            Self::Metadata => 0.3,
        }
    }
}

/// How important an item is to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPriority {
    Optional,
    Low,
    Medium,
    High,
    /// Never pruned, compressed, or summarized.
    Critical,
}

impl ContextPriority {
    pub fn weight(&self) -> f64 {
        match self {
            Self::Critical => 1.0,
            Self::High => 0.8,
            Self::Medium => 0.6,
            Self::Low => 0.4,
            Self::Optional => 0.2,
        }
    }
}

/// One unit of context competing for the token budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub content: String,
    pub item_type: ContextItemType,
    pub priority: ContextPriority,
    /// Relevance to the current audit, within 0..=1.
    pub relevance_score: f64,
}

impl ContextItem {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        item_type: ContextItemType,
        priority: ContextPriority,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            item_type,
            priority,
            relevance_score: 0.5,
        }
    }

    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance_score = relevance.clamp(0.0, 1.0);
        self
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Selection score: weightier, more relevant, smaller items first.
    pub fn score(&self) -> f64 {
        let weight = self.priority.weight() + self.item_type.weight();
        weight * self.relevance_score / ((self.size() as f64) + 1.0).ln().max(1.0)
    }

    pub fn is_critical(&self) -> bool {
        self.priority == ContextPriority::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_prefers_relevant_small_items() {
        let small = ContextItem::new("a", "x".repeat(100), ContextItemType::Code, ContextPriority::Medium)
            .with_relevance(0.9);
        let large = ContextItem::new("b", "x".repeat(10_000), ContextItemType::Code, ContextPriority::Medium)
            .with_relevance(0.9);
        assert!(small.score() > large.score());

        let irrelevant = ContextItem::new("c", "x".repeat(100), ContextItemType::Code, ContextPriority::Medium)
            .with_relevance(0.1);
        assert!(small.score() > irrelevant.score());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(ContextPriority::Critical > ContextPriority::High);
        assert!(ContextPriority::High > ContextPriority::Optional);
    }

    #[test]
    fn test_relevance_clamped() {
        let item = ContextItem::new("a", "x", ContextItemType::Code, ContextPriority::Low)
            .with_relevance(1.7);
        assert_eq!(item.relevance_score, 1.0);
    }
}
