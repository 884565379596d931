//! Content-addressed code fingerprints.
//!
//! Cache keys are derived from a normalized form of the code so trivially
//! reformatted submissions hit the same entry: comments are stripped,
//! whitespace runs collapse to single spaces, and spaces adjacent to
//! structural punctuation are removed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

static BLOCK_COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment pattern"));

static LINE_COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//[^\n]*").expect("valid line comment pattern"));

static HASH_COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#[^\n]*").expect("valid hash comment pattern"));

static HTML_COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid html comment pattern"));

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ([{}();,])").expect("valid punct pattern"));

static SPACE_AFTER_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([{}();,]) ").expect("valid punct pattern"));

/// Normalize code for fingerprinting.
///
/// Strips `//`, `/* */`, `#`, and `<!-- -->` comment syntaxes, collapses
/// whitespace runs to one space, and removes spaces next to `{}();,`.
pub fn normalize_code(code: &str) -> String {
    let stripped = BLOCK_COMMENTS.replace_all(code, "");
    let stripped = LINE_COMMENTS.replace_all(&stripped, "");
    let stripped = HASH_COMMENTS.replace_all(&stripped, "");
    let stripped = HTML_COMMENTS.replace_all(&stripped, "");

    let collapsed = WHITESPACE_RUNS.replace_all(&stripped, " ");

    // Iterate until adjacent punctuation like ") ;" settles.
    let mut out = collapsed.into_owned();
    loop {
        let next = SPACE_AFTER_PUNCT
            .replace_all(&SPACE_BEFORE_PUNCT.replace_all(&out, "$1"), "$1")
            .into_owned();
        if next == out {
            break;
        }
        out = next;
    }

    out.trim().to_string()
}

/// Fingerprint of one code submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeFingerprint(pub String);

impl CodeFingerprint {
    /// Fingerprint code for a given thought number.
    pub fn compute(code: &str, thought_number: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_code(code).as_bytes());
        hasher.update(b"\x00");
        hasher.update(thought_number.to_le_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Hash arbitrary content; used for prompt-cache key components.
    pub fn of_content(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }
}

impl std::fmt::Display for CodeFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0[..16.min(self.0.len())])
    }
}
