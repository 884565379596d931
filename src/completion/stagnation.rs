//! Stagnation detection across successive iterations.
//!
//! Two signals feed the detector: similarity between successive
//! normalized code fingerprints and between successive review summaries.
//! Stagnation is declared when both exceed the configured threshold for
//! two consecutive loops past the start loop. When fewer similarity
//! signals are available the detector falls back to a score-improvement
//! check.

use std::collections::HashSet;
use tracing::debug;

use crate::cache::normalize_code;
use crate::config::{SimilarityMetric, StagnationConfig};
use crate::session::{Session, StagnationState};

/// Shingle width for Jaccard similarity.
const SHINGLE_SIZE: usize = 3;
/// Score gain below this over the last three loops counts as stagnant.
const MIN_SCORE_IMPROVEMENT: i32 = 2;

/// Jaccard similarity over token shingles.
///
/// Inputs shorter than one shingle fall back to a plain token-set
/// comparison; two empty inputs are identical.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }

    let set_a = shingles(&tokens_a);
    let set_b = shingles(&tokens_b);
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

fn shingles<'a>(tokens: &[&'a str]) -> HashSet<Vec<&'a str>> {
    if tokens.len() < SHINGLE_SIZE {
        return tokens.iter().map(|t| vec![*t]).collect();
    }
    tokens.windows(SHINGLE_SIZE).map(|w| w.to_vec()).collect()
}

/// Detects lack of progress across a session's recent iterations.
pub struct StagnationDetector {
    config: StagnationConfig,
}

impl StagnationDetector {
    pub fn new(config: StagnationConfig) -> Self {
        Self { config }
    }

    /// Assess the session's recent history for stagnation.
    pub fn assess(&self, session: &Session) -> StagnationState {
        let loop_number = session.current_loop;
        if loop_number < self.config.start_loop {
            return StagnationState::default();
        }

        let detected = match self.config.metric {
            SimilarityMetric::JaccardShingles => self.similarity_stagnant(session),
            SimilarityMetric::ScoreImprovement => self.score_stagnant(session),
        };

        if detected {
            debug!("Stagnation detected at loop {loop_number}");
            StagnationState {
                detected: true,
                detected_at_loop: Some(loop_number),
                recommendation: Some(
                    "iterations are no longer changing the code or the review; \
                     try a different approach or escalate to a human"
                        .to_string(),
                ),
            }
        } else {
            StagnationState::default()
        }
    }

    /// Both code and summary similarity above threshold for the last two
    /// consecutive iteration pairs.
    fn similarity_stagnant(&self, session: &Session) -> bool {
        let recent = session.recent(3);
        if recent.len() < 3 {
            // Not enough pairs for the similarity signal; fall back.
            return self.score_stagnant(session);
        }

        recent.windows(2).all(|pair| {
            let code_sim = jaccard_similarity(
                &normalize_code(&pair[0].thought.text),
                &normalize_code(&pair[1].thought.text),
            );
            let summary_sim =
                jaccard_similarity(&pair[0].review.summary, &pair[1].review.summary);
            code_sim > self.config.similarity_threshold
                && summary_sim > self.config.similarity_threshold
        })
    }

    /// Overall score improved by less than 2 across the last 3 loops.
    fn score_stagnant(&self, session: &Session) -> bool {
        let recent = session.recent(3);
        if recent.len() < 3 {
            return false;
        }
        let first = recent.first().map(|r| r.review.overall as i32).unwrap_or(0);
        let last = recent.last().map(|r| r.review.overall as i32).unwrap_or(0);
        last - first < MIN_SCORE_IMPROVEMENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::{Review, ReviewVerdict};
    use crate::session::Thought;

    fn session_with(loops: &[(&str, &str, u8)]) -> Session {
        let mut session = Session::new();
        for (i, (code, summary, score)) in loops.iter().enumerate() {
            session.append(
                Thought::new(i as u32 + 1, *code),
                Review::new(*score, ReviewVerdict::Revise, *summary),
            );
        }
        session
    }

    fn config(start_loop: u32) -> StagnationConfig {
        StagnationConfig {
            start_loop,
            similarity_threshold: 0.95,
            metric: SimilarityMetric::JaccardShingles,
        }
    }

    #[test]
    fn test_identical_strings_fully_similar() {
        assert!((jaccard_similarity("fn main() {}", "fn main() {}") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_strings_dissimilar() {
        let sim = jaccard_similarity(
            "the quick brown fox jumps over dogs",
            "entirely different words appear right here now",
        );
        assert!(sim < 0.1);
    }

    #[test]
    fn test_near_identical_high_similarity() {
        let a = "let total = items iter map size sum collect into vec result value";
        let b = "let total = items iter map size sum collect into vec result count";
        let sim = jaccard_similarity(a, b);
        assert!(sim > 0.5 && sim < 1.0);
    }

    #[test]
    fn test_no_stagnation_before_start_loop() {
        let loops: Vec<(&str, &str, u8)> =
            (0..5).map(|_| ("fn a() {}", "same summary", 70)).collect();
        let session = session_with(&loops);

        let detector = StagnationDetector::new(config(10));
        assert!(!detector.assess(&session).detected);
    }

    #[test]
    fn test_identical_iterations_stagnate_past_start() {
        let loops: Vec<(&str, &str, u8)> = (0..12)
            .map(|_| ("fn a() { body(); }", "the same issues remain in place", 70))
            .collect();
        let session = session_with(&loops);

        let detector = StagnationDetector::new(config(10));
        let state = detector.assess(&session);
        assert!(state.detected);
        assert_eq!(state.detected_at_loop, Some(12));
        assert!(state.recommendation.is_some());
    }

    #[test]
    fn test_changing_code_does_not_stagnate() {
        let loops: Vec<(String, String, u8)> = (0..12)
            .map(|i| {
                (
                    format!("fn a{i}() {{ body_{i}(); other_{i}(); }}"),
                    format!("iteration {i} fixed different new issues entirely"),
                    60 + i as u8,
                )
            })
            .collect();
        let borrowed: Vec<(&str, &str, u8)> = loops
            .iter()
            .map(|(a, b, c)| (a.as_str(), b.as_str(), *c))
            .collect();
        let session = session_with(&borrowed);

        let detector = StagnationDetector::new(config(10));
        assert!(!detector.assess(&session).detected);
    }

    #[test]
    fn test_score_improvement_metric() {
        let loops: Vec<(&str, &str, u8)> = vec![
            ("a", "s1", 70),
            ("b", "s2", 70),
            ("c", "s3", 71),
        ];
        let mut session = session_with(&loops);
        // Pad history so current_loop passes the start gate.
        for i in 0..9 {
            session.append(
                Thought::new(i + 4, "pad"),
                Review::new(70, ReviewVerdict::Revise, "pad"),
            );
        }

        let detector = StagnationDetector::new(StagnationConfig {
            metric: SimilarityMetric::ScoreImprovement,
            ..config(10)
        });
        assert!(detector.assess(&session).detected);
    }
}
