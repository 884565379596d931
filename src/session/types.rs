//! Session state: the authoritative record of an audit conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::judge::Review;

/// One turn of client input carrying code under review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    /// 1-indexed position in the client's plan.
    pub number: u32,
    pub text: String,
    pub total_thoughts: u32,
    pub next_thought_needed: bool,
}

impl Thought {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
            total_thoughts: number,
            next_thought_needed: true,
        }
    }
}

/// One completed audit in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-indexed loop number; equals its position in the history.
    pub loop_number: u32,
    pub thought: Thought,
    pub review: Review,
    pub timestamp: DateTime<Utc>,
}

/// Where the session stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    InProgress,
    /// A completion tier authorized shipping.
    Completed,
    /// A kill switch fired (hard stop, stagnation).
    Terminated,
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Completion verdict attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionState {
    pub status: CompletionStatus,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill_switch: Option<String>,
}

impl Default for CompletionState {
    fn default() -> Self {
        Self {
            status: CompletionStatus::InProgress,
            reason: "audit in progress".to_string(),
            tier: None,
            kill_switch: None,
        }
    }
}

/// Stagnation signal computed across recent iterations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagnationState {
    pub detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_at_loop: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// A session's full durable state.
///
/// Invariants: `current_loop == history.len()`, history is append-only,
/// and once `completion.status != InProgress` no further audits are
/// accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    pub history: Vec<IterationRecord>,
    pub current_loop: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_review: Option<Review>,
    pub stagnation: StagnationState,
    pub completion: CompletionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            branch_id: None,
            history: Vec::new(),
            current_loop: 0,
            last_review: None,
            stagnation: StagnationState::default(),
            completion: CompletionState::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    /// Whether the session still accepts audits.
    pub fn accepts_audits(&self) -> bool {
        self.completion.status == CompletionStatus::InProgress
    }

    /// Append one iteration, maintaining the loop counter and last review.
    pub fn append(&mut self, thought: Thought, review: Review) {
        let loop_number = self.history.len() as u32 + 1;
        self.last_review = Some(review.clone());
        self.history.push(IterationRecord {
            loop_number,
            thought,
            review,
            timestamp: Utc::now(),
        });
        self.current_loop = self.history.len() as u32;
        self.updated_at = Utc::now();
    }

    /// The most recent `n` iterations, oldest first.
    pub fn recent(&self, n: usize) -> &[IterationRecord] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Fraction of history carrying a reject verdict.
    pub fn failure_rate(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let rejects = self
            .history
            .iter()
            .filter(|r| r.review.verdict == crate::judge::ReviewVerdict::Reject)
            .count();
        rejects as f64 / self.history.len() as f64
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
