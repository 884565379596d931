//! Tiered completion evaluation.
//!
//! A single pure function decides whether a session is done: kill
//! switches first (stagnation, hard stop), then the completion tiers in
//! descending score order so a score qualifying for several realizes the
//! highest. While in progress, the target threshold is the lowest tier
//! whose loop floor has been reached.

use tracing::info;

use super::stagnation::StagnationDetector;
use super::types::{CompletionDecision, TerminationAssessment};
use crate::config::{CompletionCriteria, CompletionTier};
use crate::error::Result;
use crate::session::{CompletionStatus, Session, StagnationState};

/// Keywords marking an inline comment as a critical issue.
const CRITICAL_MARKERS: [&str; 3] = ["critical", "security", "error"];
/// Cap on extracted critical issues.
const MAX_CRITICAL_ISSUES: usize = 10;
/// Iterations inspected for critical issues.
const CRITICAL_WINDOW: usize = 3;

/// Pure completion decision function over (score, loop, stagnation).
pub struct CompletionEvaluator {
    criteria: CompletionCriteria,
    detector: StagnationDetector,
}

impl CompletionEvaluator {
    /// Construct, rejecting criteria that violate tier ordering.
    pub fn new(criteria: CompletionCriteria) -> Result<Self> {
        criteria.validate()?;
        let detector = StagnationDetector::new(criteria.stagnation.clone());
        Ok(Self { criteria, detector })
    }

    pub fn criteria(&self) -> &CompletionCriteria {
        &self.criteria
    }

    /// Evaluate completion for one loop.
    pub fn evaluate(
        &self,
        score: u8,
        loop_number: u32,
        stagnation: Option<&StagnationState>,
    ) -> CompletionDecision {
        // Kill switches take precedence over any score.
        if let Some(stagnation) = stagnation {
            if stagnation.detected && loop_number >= self.criteria.stagnation.start_loop {
                return CompletionDecision {
                    status: CompletionStatus::Terminated,
                    reason: "stagnation_detected".to_string(),
                    tier: None,
                    kill_switch: Some("stagnation".to_string()),
                    next_thought_needed: false,
                    target_threshold: None,
                };
            }
        }

        if loop_number >= self.criteria.hard_stop.max_loops {
            return CompletionDecision {
                status: CompletionStatus::Terminated,
                reason: "max_loops_reached".to_string(),
                tier: None,
                kill_switch: Some("hard_stop".to_string()),
                next_thought_needed: false,
                target_threshold: None,
            };
        }

        // Tiers in descending score order; the first satisfied wins.
        let tiers = [
            (&self.criteria.tier1, "tier1"),
            (&self.criteria.tier2, "tier2"),
            (&self.criteria.tier3, "tier3"),
        ];
        for (tier, name) in tiers {
            if score >= tier.score && loop_number >= tier.min_loops {
                info!(
                    "Completion: score {score} at loop {loop_number} satisfies {name} \
                     ({}@{})",
                    tier.score, tier.min_loops
                );
                return CompletionDecision {
                    status: CompletionStatus::Completed,
                    reason: tier_reason(tier),
                    tier: Some(name.to_string()),
                    kill_switch: None,
                    next_thought_needed: false,
                    target_threshold: None,
                };
            }
        }

        let target = self.target_threshold(loop_number);
        CompletionDecision {
            status: CompletionStatus::InProgress,
            reason: format!("score_{score}_below_{target}"),
            tier: None,
            kill_switch: None,
            next_thought_needed: true,
            target_threshold: Some(target),
        }
    }

    /// The lowest tier whose loop floor has been reached; tier1's score
    /// when none has.
    fn target_threshold(&self, loop_number: u32) -> u8 {
        if loop_number >= self.criteria.tier3.min_loops {
            self.criteria.tier3.score
        } else if loop_number >= self.criteria.tier2.min_loops {
            self.criteria.tier2.score
        } else {
            self.criteria.tier1.score
        }
    }

    /// Recompute the session's stagnation signal from its history.
    pub fn assess_stagnation(&self, session: &Session) -> StagnationState {
        self.detector.assess(session)
    }

    /// Decide whether a session should stop, with failure accounting.
    pub fn should_terminate(&self, session: &Session) -> TerminationAssessment {
        let score = session
            .last_review
            .as_ref()
            .map(|r| r.overall)
            .unwrap_or(0);
        let decision = self.evaluate(score, session.current_loop, Some(&session.stagnation));

        let failure_rate = session.failure_rate();
        let critical_issues = extract_critical_issues(session);

        let final_assessment = if decision.is_terminal() {
            let verdict = session
                .last_review
                .as_ref()
                .map(|r| r.verdict.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let issues = if critical_issues.is_empty() {
                "none".to_string()
            } else {
                critical_issues
                    .iter()
                    .take(5)
                    .map(|issue| format!("- {issue}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            let recommendation = match decision.status {
                CompletionStatus::Completed => {
                    "quality target met; ship this iteration".to_string()
                }
                _ => session
                    .stagnation
                    .recommendation
                    .clone()
                    .unwrap_or_else(|| {
                        "iteration budget exhausted; escalate remaining issues to a human"
                            .to_string()
                    }),
            };
            Some(format!(
                "Final score: {score} ({verdict}). Reason: {}. Failure rate: {:.0}%.\n\
                 Top issues:\n{issues}\nRecommendation: {recommendation}",
                decision.reason,
                failure_rate * 100.0
            ))
        } else {
            None
        };

        TerminationAssessment {
            terminate: decision.is_terminal(),
            failure_rate,
            critical_issues,
            final_assessment,
        }
    }
}

fn tier_reason(tier: &CompletionTier) -> String {
    format!("score_{}_at_{}", tier.score, tier.min_loops)
}

/// Up to ten deduplicated critical issues from the last three loops,
/// in stable first-seen order.
fn extract_critical_issues(session: &Session) -> Vec<String> {
    let mut issues = Vec::new();
    for record in session.recent(CRITICAL_WINDOW) {
        for comment in &record.review.inline {
            let lower = comment.comment.to_lowercase();
            if CRITICAL_MARKERS.iter().any(|m| lower.contains(m)) {
                let rendered = if comment.line > 0 {
                    format!("{}:{} {}", comment.path, comment.line, comment.comment)
                } else {
                    format!("{} {}", comment.path, comment.comment)
                };
                if !issues.contains(&rendered) {
                    issues.push(rendered);
                    if issues.len() >= MAX_CRITICAL_ISSUES {
                        return issues;
                    }
                }
            }
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::{InlineComment, Review, ReviewVerdict};
    use crate::session::Thought;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn evaluator() -> CompletionEvaluator {
        CompletionEvaluator::new(CompletionCriteria::default()).unwrap()
    }

    #[test]
    fn test_invalid_criteria_rejected_at_construction() {
        let mut criteria = CompletionCriteria::default();
        criteria.tier3.score = 99;
        assert!(CompletionEvaluator::new(criteria).is_err());
    }

    #[test]
    fn test_tier1_satisfied() {
        let decision = evaluator().evaluate(97, 11, None);
        assert_eq!(decision.status, CompletionStatus::Completed);
        assert_eq!(decision.reason, "score_95_at_10");
        assert_eq!(decision.tier.as_deref(), Some("tier1"));
        assert!(!decision.next_thought_needed);
    }

    #[test]
    fn test_below_tier2_stays_in_progress() {
        // At loop 14 only tier1's floor is reached: target stays 95.
        let decision = evaluator().evaluate(88, 14, None);
        assert_eq!(decision.status, CompletionStatus::InProgress);
        assert_eq!(decision.target_threshold, Some(95));
        assert!(decision.next_thought_needed);

        // At loop 15 tier2's floor is reached but 88 < 90: still in
        // progress, now targeting 90.
        let decision = evaluator().evaluate(88, 15, None);
        assert_eq!(decision.status, CompletionStatus::InProgress);
        assert_eq!(decision.target_threshold, Some(90));
    }

    #[test]
    fn test_tier2_satisfied_at_floor() {
        let decision = evaluator().evaluate(90, 15, None);
        assert_eq!(decision.status, CompletionStatus::Completed);
        assert_eq!(decision.reason, "score_90_at_15");
    }

    #[test]
    fn test_hard_stop_overrides_score() {
        let decision = evaluator().evaluate(70, 25, None);
        assert!(decision.is_terminal());
        assert_eq!(decision.reason, "max_loops_reached");
        assert_eq!(decision.kill_switch.as_deref(), Some("hard_stop"));
        assert!(!decision.next_thought_needed);
    }

    #[test]
    fn test_stagnation_overrides_everything() {
        let stagnation = StagnationState {
            detected: true,
            detected_at_loop: Some(12),
            recommendation: None,
        };
        let decision = evaluator().evaluate(97, 12, Some(&stagnation));
        assert_eq!(decision.reason, "stagnation_detected");
        assert_eq!(decision.kill_switch.as_deref(), Some("stagnation"));
    }

    #[test]
    fn test_stagnation_ignored_before_start_loop() {
        let stagnation = StagnationState {
            detected: true,
            detected_at_loop: Some(5),
            recommendation: None,
        };
        let decision = evaluator().evaluate(50, 5, Some(&stagnation));
        assert_eq!(decision.status, CompletionStatus::InProgress);
    }

    #[test]
    fn test_high_score_before_floor_waits() {
        let decision = evaluator().evaluate(100, 5, None);
        assert_eq!(decision.status, CompletionStatus::InProgress);
        assert_eq!(decision.target_threshold, Some(95));
    }

    #[test]
    fn test_tier3_target_past_its_floor() {
        let decision = evaluator().evaluate(60, 21, None);
        assert_eq!(decision.target_threshold, Some(85));
    }

    #[test]
    fn test_critical_issue_extraction() {
        let mut session = Session::new();
        for i in 1..=4 {
            let mut review = Review::new(50, ReviewVerdict::Reject, "bad");
            review.inline.push(InlineComment::new(
                "src/auth.rs",
                i,
                format!("[critical] security hole number {i}"),
            ));
            review
                .inline
                .push(InlineComment::new("src/style.rs", i, "nit: spacing"));
            session.append(Thought::new(i, format!("code {i}")), review);
        }

        let issues = extract_critical_issues(&session);
        // Only the last three iterations are inspected.
        assert_eq!(issues.len(), 3);
        assert!(issues[0].contains("number 2"));
        assert!(issues.iter().all(|i| !i.contains("spacing")));
    }

    #[test]
    fn test_critical_issues_deduplicated() {
        let mut session = Session::new();
        for i in 1..=3 {
            let mut review = Review::new(40, ReviewVerdict::Reject, "bad");
            review.inline.push(InlineComment::new(
                "src/auth.rs",
                7,
                "[critical] same hole every loop",
            ));
            session.append(Thought::new(i, "code"), review);
        }
        assert_eq!(extract_critical_issues(&session).len(), 1);
    }

    #[test]
    fn test_should_terminate_builds_assessment() {
        let mut session = Session::new();
        for i in 1..=25 {
            let verdict = if i % 2 == 0 {
                ReviewVerdict::Reject
            } else {
                ReviewVerdict::Revise
            };
            session.append(Thought::new(i, "code"), Review::new(60, verdict, "issues"));
        }

        let assessment = evaluator().should_terminate(&session);
        assert!(assessment.terminate);
        let text = assessment.final_assessment.unwrap();
        assert!(text.contains("Final score: 60"));
        assert!(text.contains("max_loops_reached"));
        assert!(text.contains("Failure rate: 48%"));
    }

    #[test]
    fn test_should_terminate_in_progress_session() {
        let mut session = Session::new();
        session.append(
            Thought::new(1, "code"),
            Review::new(80, ReviewVerdict::Revise, "fine"),
        );

        let assessment = evaluator().should_terminate(&session);
        assert!(!assessment.terminate);
        assert!(assessment.final_assessment.is_none());
    }

    proptest! {
        /// A decision is terminal exactly when a kill switch or tier fires,
        /// and in-progress decisions always request another thought.
        #[test]
        fn prop_terminal_iff_no_next_thought(score in 0u8..=100, loop_number in 0u32..40) {
            let decision = evaluator().evaluate(score, loop_number, None);
            prop_assert_eq!(decision.is_terminal(), !decision.next_thought_needed);
        }

        /// Loops never exceed the hard stop without terminating.
        #[test]
        fn prop_bounded_loops(score in 0u8..=100, loop_number in 25u32..100) {
            let decision = evaluator().evaluate(score, loop_number, None);
            prop_assert!(decision.is_terminal());
        }

        /// The realized tier is the highest-scoring tier that qualifies.
        #[test]
        fn prop_highest_tier_wins(score in 95u8..=100, loop_number in 20u32..25) {
            let decision = evaluator().evaluate(score, loop_number, None);
            prop_assert_eq!(decision.tier.as_deref(), Some("tier1"));
        }
    }
}
