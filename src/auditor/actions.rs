//! Next-action synthesis from a completion decision and review.

use crate::completion::{ActionPriority, CompletionDecision, NextAction};
use crate::judge::Review;
use crate::session::CompletionStatus;

/// Dimension scores below this get an improve action.
const WEAK_DIMENSION_THRESHOLD: u8 = 70;

/// Build the ordered next-action list for a response.
pub fn build_next_actions(decision: &CompletionDecision, review: &Review) -> Vec<NextAction> {
    match decision.status {
        CompletionStatus::Completed => vec![NextAction::Complete],
        CompletionStatus::Terminated => vec![NextAction::Escalate {
            reason: decision.reason.clone(),
        }],
        CompletionStatus::InProgress => {
            let mut actions = Vec::new();

            let critical_count = review.critical_count();
            if critical_count > 0 {
                actions.push(NextAction::FixCritical {
                    priority: ActionPriority::Critical,
                    count: critical_count,
                });
            }

            for dimension in &review.dimensions {
                if dimension.score < WEAK_DIMENSION_THRESHOLD {
                    actions.push(NextAction::Improve {
                        dimension: dimension.name.clone(),
                        score: dimension.score,
                        priority: ActionPriority::Medium,
                    });
                }
            }

            if actions.is_empty() {
                actions.push(NextAction::Continue {
                    target_threshold: decision.target_threshold.unwrap_or(100),
                });
            }
            actions
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::{EvidenceItem, EvidenceKind, QualityDimension, ReviewVerdict, Severity};
    use pretty_assertions::assert_eq;

    fn in_progress(target: u8) -> CompletionDecision {
        CompletionDecision {
            status: CompletionStatus::InProgress,
            reason: "below target".to_string(),
            tier: None,
            kill_switch: None,
            next_thought_needed: true,
            target_threshold: Some(target),
        }
    }

    #[test]
    fn test_completed_yields_complete() {
        let decision = CompletionDecision {
            status: CompletionStatus::Completed,
            reason: "score_95_at_10".to_string(),
            tier: Some("tier1".to_string()),
            kill_switch: None,
            next_thought_needed: false,
            target_threshold: None,
        };
        let review = Review::new(97, ReviewVerdict::Pass, "done");
        assert_eq!(
            build_next_actions(&decision, &review),
            vec![NextAction::Complete]
        );
    }

    #[test]
    fn test_terminated_yields_escalate() {
        let decision = CompletionDecision {
            status: CompletionStatus::Terminated,
            reason: "max_loops_reached".to_string(),
            tier: None,
            kill_switch: Some("hard_stop".to_string()),
            next_thought_needed: false,
            target_threshold: None,
        };
        let review = Review::new(70, ReviewVerdict::Revise, "out of budget");
        let actions = build_next_actions(&decision, &review);
        assert_eq!(
            actions,
            vec![NextAction::Escalate {
                reason: "max_loops_reached".to_string()
            }]
        );
    }

    #[test]
    fn test_critical_issues_come_first() {
        let mut review = Review::new(55, ReviewVerdict::Revise, "problems")
            .with_dimension(QualityDimension::new("correctness", 50, 0.5))
            .with_dimension(QualityDimension::new("style", 90, 0.1));
        review.fold_evidence(&[
            EvidenceItem::new(EvidenceKind::Security, Severity::Critical, "a.rs:1", "injection"),
            EvidenceItem::new(EvidenceKind::Security, Severity::Critical, "a.rs:9", "leak"),
        ]);

        let actions = build_next_actions(&in_progress(95), &review);
        assert_eq!(
            actions[0],
            NextAction::FixCritical {
                priority: ActionPriority::Critical,
                count: 2
            }
        );
        assert_eq!(
            actions[1],
            NextAction::Improve {
                dimension: "correctness".to_string(),
                score: 50,
                priority: ActionPriority::Medium
            }
        );
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn test_clean_review_continues_toward_target() {
        let review = Review::new(80, ReviewVerdict::Revise, "fine")
            .with_dimension(QualityDimension::new("correctness", 85, 0.5));
        let actions = build_next_actions(&in_progress(95), &review);
        assert_eq!(
            actions,
            vec![NextAction::Continue {
                target_threshold: 95
            }]
        );
    }
}
