//! Completion decisions and next-action synthesis types.

use serde::{Deserialize, Serialize};

use crate::session::{CompletionState, CompletionStatus};

/// Outcome of evaluating completion for one loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionDecision {
    pub status: CompletionStatus,
    /// Machine-readable reason ("score_95_at_10", "max_loops_reached", …).
    pub reason: String,
    /// Which tier authorized completion, when one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    /// Which kill switch fired, when one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill_switch: Option<String>,
    pub next_thought_needed: bool,
    /// Score the session should aim for next, while in progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_threshold: Option<u8>,
}

impl CompletionDecision {
    pub fn is_terminal(&self) -> bool {
        self.status != CompletionStatus::InProgress
    }

    /// Convert into the state persisted on the session.
    pub fn to_state(&self) -> CompletionState {
        CompletionState {
            status: self.status,
            reason: self.reason.clone(),
            tier: self.tier.clone(),
            kill_switch: self.kill_switch.clone(),
        }
    }
}

/// Action priority for next-action synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Critical,
    High,
    Medium,
    Low,
}

/// What the client should do next, as a tagged union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum NextAction {
    /// A completion tier was satisfied; ship.
    Complete,
    /// A kill switch fired; hand off to a human.
    Escalate { reason: String },
    /// Fix the flagged critical issues before anything else.
    FixCritical {
        priority: ActionPriority,
        count: usize,
    },
    /// Improve one weak dimension.
    Improve {
        dimension: String,
        score: u8,
        priority: ActionPriority,
    },
    /// Keep iterating toward the target threshold.
    Continue { target_threshold: u8 },
}

/// Assessment produced when deciding whether a session should stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationAssessment {
    pub terminate: bool,
    /// Fraction of history carrying a reject verdict.
    pub failure_rate: f64,
    /// Up to ten deduplicated critical issues from the last three loops.
    pub critical_issues: Vec<String>,
    /// Final assessment text, present when terminating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_assessment: Option<String>,
}
