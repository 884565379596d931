//! Judge wire protocol parsing and validation.
//!
//! The judge emits a single JSON review object. Parsing is permissive about
//! extra fields but strict about bounds: scores outside 0..=100 or weights
//! outside 0..=1 are protocol errors, not clamped.

use serde::Deserialize;

use super::adapter::JudgeFailure;
use super::types::{InlineComment, JudgeCard, QualityDimension, Review, ReviewVerdict};

/// Wire shape of a review as emitted by the judge. Scores are kept wide so
/// out-of-range values reach validation instead of failing deserialization.
#[derive(Debug, Deserialize)]
struct RawReview {
    overall: i64,
    verdict: String,
    #[serde(default)]
    dimensions: Vec<RawDimension>,
    #[serde(default)]
    inline: Vec<RawInline>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    judge_cards: Vec<RawJudgeCard>,
}

#[derive(Debug, Deserialize)]
struct RawDimension {
    name: String,
    score: i64,
    weight: f64,
}

#[derive(Debug, Deserialize)]
struct RawInline {
    path: String,
    #[serde(default)]
    line: u32,
    comment: String,
}

#[derive(Debug, Deserialize)]
struct RawJudgeCard {
    model: String,
    score: i64,
    #[serde(default)]
    notes: Option<String>,
}

fn check_score(value: i64, what: &str, raw: &str) -> Result<u8, JudgeFailure> {
    if !(0..=100).contains(&value) {
        return Err(JudgeFailure::Protocol {
            message: format!("{what} score {value} outside 0..=100"),
            raw: Some(raw.to_string()),
        });
    }
    Ok(value as u8)
}

/// Parse and validate a review payload.
pub fn parse_review(payload: &str) -> Result<Review, JudgeFailure> {
    let raw: RawReview = serde_json::from_str(payload).map_err(|e| JudgeFailure::Protocol {
        message: format!("malformed review JSON: {e}"),
        raw: Some(payload.to_string()),
    })?;

    let overall = check_score(raw.overall, "overall", payload)?;

    let verdict = match raw.verdict.as_str() {
        "pass" => ReviewVerdict::Pass,
        "revise" => ReviewVerdict::Revise,
        "reject" => ReviewVerdict::Reject,
        other => {
            return Err(JudgeFailure::Protocol {
                message: format!("unknown verdict '{other}'"),
                raw: Some(payload.to_string()),
            })
        }
    };

    let mut dimensions = Vec::with_capacity(raw.dimensions.len());
    for dim in raw.dimensions {
        let score = check_score(dim.score, &format!("dimension '{}'", dim.name), payload)?;
        if !(0.0..=1.0).contains(&dim.weight) {
            return Err(JudgeFailure::Protocol {
                message: format!(
                    "dimension '{}' weight {} outside 0..=1",
                    dim.name, dim.weight
                ),
                raw: Some(payload.to_string()),
            });
        }
        dimensions.push(QualityDimension::new(dim.name, score, dim.weight));
    }

    let inline = raw
        .inline
        .into_iter()
        .map(|c| InlineComment::new(c.path, c.line, c.comment))
        .collect();

    let mut judge_cards = Vec::with_capacity(raw.judge_cards.len());
    for card in raw.judge_cards {
        let score = check_score(card.score, &format!("judge card '{}'", card.model), payload)?;
        let mut out = JudgeCard::new(card.model, score);
        if let Some(notes) = card.notes {
            out = out.with_notes(notes);
        }
        judge_cards.push(out);
    }

    Ok(Review {
        overall,
        verdict,
        dimensions,
        inline,
        summary: raw.summary,
        judge_cards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_minimal_review() {
        let review = parse_review(r#"{"overall": 92, "verdict": "pass"}"#).unwrap();
        assert_eq!(review.overall, 92);
        assert_eq!(review.verdict, ReviewVerdict::Pass);
        assert!(review.dimensions.is_empty());
    }

    #[test]
    fn test_parse_full_review() {
        let payload = r#"{
            "overall": 78,
            "verdict": "revise",
            "dimensions": [{"name": "correctness", "score": 70, "weight": 0.5}],
            "inline": [{"path": "src/lib.rs", "line": 3, "comment": "off-by-one"}],
            "summary": "one bug found",
            "judge_cards": [{"model": "reviewer-1", "score": 78, "notes": "solid otherwise"}]
        }"#;

        let review = parse_review(payload).unwrap();
        assert_eq!(review.dimensions.len(), 1);
        assert_eq!(review.inline[0].line, 3);
        assert_eq!(review.judge_cards[0].notes.as_deref(), Some("solid otherwise"));
    }

    #[test]
    fn test_out_of_range_overall_is_protocol_error() {
        let err = parse_review(r#"{"overall": 240, "verdict": "pass"}"#).unwrap_err();
        match err {
            JudgeFailure::Protocol { message, raw } => {
                assert!(message.contains("240"));
                assert!(raw.is_some());
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_weight_is_protocol_error() {
        let payload = r#"{
            "overall": 80, "verdict": "pass",
            "dimensions": [{"name": "style", "score": 80, "weight": 1.5}]
        }"#;
        assert!(matches!(
            parse_review(payload),
            Err(JudgeFailure::Protocol { .. })
        ));
    }

    #[test]
    fn test_unknown_verdict_is_protocol_error() {
        let err = parse_review(r#"{"overall": 50, "verdict": "maybe"}"#).unwrap_err();
        assert!(matches!(err, JudgeFailure::Protocol { .. }));
    }

    #[test]
    fn test_malformed_json_keeps_raw_payload() {
        let err = parse_review("not json").unwrap_err();
        match err {
            JudgeFailure::Protocol { raw, .. } => assert_eq!(raw.as_deref(), Some("not json")),
            other => panic!("unexpected failure: {other:?}"),
        }
    }
}
