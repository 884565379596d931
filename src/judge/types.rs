//! Core types exchanged with the external reviewer.
//!
//! A `Review` is the structured judgment returned by the Judge: an overall
//! score, per-dimension scores, inline comments, and a ship/revise/reject
//! verdict. Workflow collaborators contribute `EvidenceItem`s that are
//! folded into the review's inline comments.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Termination verdict attached to a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    /// Ship it.
    Pass,
    /// Needs another iteration.
    Revise,
    /// Blocking problems found.
    Reject,
}

impl std::fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Revise => write!(f, "revise"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// One scored quality dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDimension {
    pub name: String,
    /// Score within 0..=100.
    pub score: u8,
    /// Weight within 0..=1.
    pub weight: f64,
}

impl QualityDimension {
    pub fn new(name: impl Into<String>, score: u8, weight: f64) -> Self {
        Self {
            name: name.into(),
            score,
            weight,
        }
    }
}

/// An inline comment anchored to a location in the reviewed code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineComment {
    pub path: String,
    /// 1-indexed; 0 when the comment has no code anchor.
    pub line: u32,
    pub comment: String,
}

impl InlineComment {
    pub fn new(path: impl Into<String>, line: u32, comment: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            comment: comment.into(),
        }
    }
}

/// Attribution card for one judge model's contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeCard {
    pub model: String,
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl JudgeCard {
    pub fn new(model: impl Into<String>, score: u8) -> Self {
        Self {
            model: model.into(),
            score,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
        }
    }
}

/// Kind of evidence contributed by a workflow collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    LogicError,
    Security,
    ErrorHandling,
    Testing,
    Performance,
    Format,
    Conformance,
    Traceability,
    Outage,
    Other,
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LogicError => write!(f, "logic_error"),
            Self::Security => write!(f, "security"),
            Self::ErrorHandling => write!(f, "error_handling"),
            Self::Testing => write!(f, "testing"),
            Self::Performance => write!(f, "performance"),
            Self::Format => write!(f, "format"),
            Self::Conformance => write!(f, "conformance"),
            Self::Traceability => write!(f, "traceability"),
            Self::Outage => write!(f, "outage"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A single finding contributing to a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub kind: EvidenceKind,
    pub severity: Severity,
    /// "path:line" or a symbolic location like "engine".
    pub location: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl EvidenceItem {
    pub fn new(
        kind: EvidenceKind,
        severity: Severity,
        location: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            location: location.into(),
            description: description.into(),
            proof: None,
            suggested_fix: None,
        }
    }

    pub fn with_proof(mut self, proof: impl Into<String>) -> Self {
        self.proof = Some(proof.into());
        self
    }

    pub fn with_suggested_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    /// Render as an inline comment for folding into a review.
    pub fn to_inline_comment(&self) -> InlineComment {
        let (path, line) = match self.location.rsplit_once(':') {
            Some((p, l)) => match l.parse::<u32>() {
                Ok(n) => (p.to_string(), n),
                Err(_) => (self.location.clone(), 0),
            },
            None => (self.location.clone(), 0),
        };
        let mut comment = format!("[{}] [{}] {}", self.severity, self.kind, self.description);
        if let Some(ref fix) = self.suggested_fix {
            comment.push_str(&format!(" (fix: {})", fix));
        }
        InlineComment::new(path, line, comment)
    }
}

/// Structured judgment returned by the Judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Overall score within 0..=100.
    pub overall: u8,
    pub verdict: ReviewVerdict,
    pub dimensions: Vec<QualityDimension>,
    pub inline: Vec<InlineComment>,
    pub summary: String,
    pub judge_cards: Vec<JudgeCard>,
}

impl Review {
    /// Create a review with no findings.
    pub fn new(overall: u8, verdict: ReviewVerdict, summary: impl Into<String>) -> Self {
        Self {
            overall,
            verdict,
            dimensions: Vec::new(),
            inline: Vec::new(),
            summary: summary.into(),
            judge_cards: Vec::new(),
        }
    }

    pub fn with_dimension(mut self, dimension: QualityDimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn with_inline(mut self, comment: InlineComment) -> Self {
        self.inline.push(comment);
        self
    }

    pub fn with_judge_card(mut self, card: JudgeCard) -> Self {
        self.judge_cards.push(card);
        self
    }

    /// Fold workflow evidence into the inline comments.
    pub fn fold_evidence(&mut self, items: &[EvidenceItem]) {
        for item in items {
            self.inline.push(item.to_inline_comment());
        }
    }

    /// Count inline comments by the severity tag they carry.
    pub fn severity_counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for comment in &self.inline {
            let severity = if comment.comment.contains("[critical]") {
                Severity::Critical
            } else if comment.comment.contains("[major]") {
                Severity::Major
            } else {
                Severity::Minor
            };
            *counts.entry(severity).or_insert(0) += 1;
        }
        counts
    }

    /// Count of inline comments flagged critical.
    pub fn critical_count(&self) -> usize {
        self.severity_counts()
            .get(&Severity::Critical)
            .copied()
            .unwrap_or(0)
    }

    // ==================== Synthetic reviews ====================
    //
    // Recovery paths never surface an Err to the caller: each failure mode
    // maps to one of these fabricated reviews.

    /// Auditing is disabled by configuration.
    pub fn auditing_disabled() -> Self {
        Self::new(100, ReviewVerdict::Pass, "auditing disabled")
            .with_judge_card(JudgeCard::new("skipped", 100).with_notes("auditing disabled"))
    }

    /// The thought carried no code worth auditing.
    pub fn no_code_detected() -> Self {
        Self::new(100, ReviewVerdict::Pass, "no code detected")
            .with_judge_card(JudgeCard::new("skipped", 100).with_notes("no code detected"))
    }

    /// The external reviewer could not be reached.
    pub fn judge_unavailable(detail: &str) -> Self {
        let mut review = Self::new(
            0,
            ReviewVerdict::Reject,
            "audit failed: judge unavailable",
        );
        review.fold_evidence(&[EvidenceItem::new(
            EvidenceKind::Outage,
            Severity::Critical,
            "judge",
            format!("external reviewer unavailable: {detail}"),
        )
        .with_suggested_fix("verify the judge command is installed and reachable")]);
        review
    }

    /// The audit timed out with no usable partial result.
    pub fn incomplete_timeout(timeout_ms: u64) -> Self {
        Self::new(
            50,
            ReviewVerdict::Revise,
            format!("audit incomplete: timed out after {timeout_ms}ms"),
        )
    }

    /// The judge returned a malformed response.
    pub fn protocol_failure(message: &str, raw: Option<&str>) -> Self {
        let mut review = Self::new(0, ReviewVerdict::Reject, "audit failed: malformed judge response");
        let mut item = EvidenceItem::new(
            EvidenceKind::Other,
            Severity::Critical,
            "judge",
            format!("protocol error: {message}"),
        );
        if let Some(raw) = raw {
            item = item.with_proof(raw.to_string());
        }
        review.fold_evidence(&[item]);
        review
    }
}

/// Request handed to a judge adapter for one audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub thought_number: u32,
    /// Code under review, extracted from the thought.
    pub code: String,
    /// Declared language from the fence label, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Rendered system prompt attached by the prompt-driven auditor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_prompt: Option<String>,
    /// Wall-clock budget the adapter must respect.
    pub timeout_ms: u64,
}

impl AuditRequest {
    pub fn new(thought_number: u32, code: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            session_id: None,
            thought_number,
            code: code.into(),
            language: None,
            rendered_prompt: None,
            timeout_ms,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_rendered_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.rendered_prompt = Some(prompt.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_evidence_to_inline_comment() {
        let item = EvidenceItem::new(
            EvidenceKind::Security,
            Severity::Critical,
            "src/auth.rs:42",
            "password compared without constant-time equality",
        )
        .with_suggested_fix("use a constant-time comparison");

        let comment = item.to_inline_comment();
        assert_eq!(comment.path, "src/auth.rs");
        assert_eq!(comment.line, 42);
        assert!(comment.comment.contains("[critical]"));
        assert!(comment.comment.contains("constant-time"));
    }

    #[test]
    fn test_evidence_symbolic_location() {
        let item = EvidenceItem::new(
            EvidenceKind::Outage,
            Severity::Critical,
            "judge",
            "unreachable",
        );
        let comment = item.to_inline_comment();
        assert_eq!(comment.path, "judge");
        assert_eq!(comment.line, 0);
    }

    #[test]
    fn test_severity_counts() {
        let mut review = Review::new(60, ReviewVerdict::Revise, "issues found");
        review.fold_evidence(&[
            EvidenceItem::new(EvidenceKind::Security, Severity::Critical, "a.rs:1", "x"),
            EvidenceItem::new(EvidenceKind::Testing, Severity::Major, "a.rs:2", "y"),
            EvidenceItem::new(EvidenceKind::Format, Severity::Minor, "a.rs:3", "z"),
        ]);

        let counts = review.severity_counts();
        assert_eq!(counts[&Severity::Critical], 1);
        assert_eq!(counts[&Severity::Major], 1);
        assert_eq!(counts[&Severity::Minor], 1);
        assert_eq!(review.critical_count(), 1);
    }

    #[test]
    fn test_synthetic_disabled_review() {
        let review = Review::auditing_disabled();
        assert_eq!(review.overall, 100);
        assert_eq!(review.verdict, ReviewVerdict::Pass);
        assert_eq!(review.summary, "auditing disabled");
    }

    #[test]
    fn test_synthetic_unavailable_review() {
        let review = Review::judge_unavailable("spawn failed");
        assert_eq!(review.overall, 0);
        assert_eq!(review.verdict, ReviewVerdict::Reject);
        assert_eq!(review.critical_count(), 1);
        assert!(review.inline[0].comment.contains("spawn failed"));
    }

    #[test]
    fn test_review_roundtrip() {
        let review = Review::new(87, ReviewVerdict::Revise, "close")
            .with_dimension(QualityDimension::new("correctness", 90, 0.4))
            .with_inline(InlineComment::new("src/lib.rs", 10, "unwrap in library code"))
            .with_judge_card(JudgeCard::new("internal", 87));

        let json = serde_json::to_string(&review).unwrap();
        let back: Review = serde_json::from_str(&json).unwrap();
        assert_eq!(back, review);
    }
}
