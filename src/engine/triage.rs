//! Code triage: deciding whether a thought carries auditable code.
//!
//! A thought is audited when it contains a fenced code block, inline
//! code, or enough code-like tokens in plain text. Malformed fences
//! degrade to Minor evidence; a missing language hint is rejected only
//! in strict mode.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::judge::{EvidenceItem, EvidenceKind, Severity};

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\n(.*?)```").expect("valid fence pattern")
});

static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("valid inline code pattern"));

static CODE_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \bfn\s+\w+ | \bdef\s+\w+ | \bclass\s+\w+ | \bimpl\b | \bstruct\s+\w+ |
        \breturn\b | \blet\s+\w+ | \bconst\s+\w+ | =>| -> | ::\w+ |
        [{};]\s*$ | \bif\s*\( | \bfor\s*\( | \bwhile\s*\(
    ",
    )
    .expect("valid code token pattern")
});

/// Minimum code-like tokens for plain text to count as code.
const MIN_CODE_TOKENS: usize = 3;

/// Code extracted from a thought.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCode {
    pub code: String,
    /// Declared fence language, when present and fenced.
    pub language: Option<String>,
    /// Format findings accumulated during extraction.
    pub evidence: Vec<EvidenceItem>,
}

/// Outcome of triaging one thought.
#[derive(Debug, Clone, PartialEq)]
pub enum TriageOutcome {
    /// Nothing auditable; the engine returns a synthetic pass.
    NoCode,
    Code(ExtractedCode),
}

/// Thought triage with configurable strictness.
pub struct CodeTriage {
    require_language_hint: bool,
}

impl CodeTriage {
    pub fn new(require_language_hint: bool) -> Self {
        Self {
            require_language_hint,
        }
    }

    /// Triage a thought's text.
    ///
    /// Errors only in strict mode, when code is present but carries no
    /// usable language hint.
    pub fn triage(&self, text: &str) -> Result<TriageOutcome> {
        let mut evidence = Vec::new();

        let fences: Vec<(Option<String>, String)> = FENCED_BLOCK
            .captures_iter(text)
            .map(|caps| {
                let label = caps
                    .get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|s| !s.is_empty());
                let body = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
                (label, body)
            })
            .collect();

        // An odd number of fence markers means one block never closed.
        if text.matches("```").count() % 2 == 1 {
            evidence.push(EvidenceItem::new(
                EvidenceKind::Format,
                Severity::Minor,
                "triage",
                "unterminated code fence in submission",
            ));
        }

        if !fences.is_empty() {
            let language = fences.iter().find_map(|(label, _)| label.clone());
            if language.is_none() {
                if self.require_language_hint {
                    return Err(Error::InvalidCodeFormat(
                        "fenced code carries no language label".into(),
                    ));
                }
                evidence.push(EvidenceItem::new(
                    EvidenceKind::Format,
                    Severity::Minor,
                    "triage",
                    "fenced code carries no language label",
                ));
            }

            let code = fences
                .iter()
                .map(|(_, body)| body.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(TriageOutcome::Code(ExtractedCode {
                code,
                language,
                evidence,
            }));
        }

        // Inline code spans that look like code (not prose emphasis).
        let inline: Vec<&str> = INLINE_CODE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .filter(|span| CODE_TOKENS.is_match(span) || span.contains('('))
            .collect();
        if !inline.is_empty() {
            return Ok(TriageOutcome::Code(ExtractedCode {
                code: inline.join("\n"),
                language: None,
                evidence,
            }));
        }

        // Bare text with enough code-like tokens.
        if CODE_TOKENS.find_iter(text).count() >= MIN_CODE_TOKENS {
            return Ok(TriageOutcome::Code(ExtractedCode {
                code: text.to_string(),
                language: None,
                evidence,
            }));
        }

        Ok(TriageOutcome::NoCode)
    }
}
