//! Prompt template loading, validation, and substitution.
//!
//! Templates are plain text with `${NAME}` and `${NAME | default: literal}`
//! substitutions. Loading validates that the required section headings and
//! variable names are present; rendering substitutes typed values
//! (primitives canonically, arrays joined with ", ", objects as pretty
//! JSON). Unresolved variables after rendering are warned about, never
//! fatal.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

use crate::error::{Error, Result};

/// Section headings every template must contain (literal substring match).
pub const REQUIRED_SECTIONS: [&str; 5] = [
    "Identity & Role Definition",
    "Audit Workflow",
    "Multi-Dimensional Quality Assessment",
    "Intelligent Completion Criteria",
    "Structured Output Format",
];

/// Variable names every template must reference.
pub const REQUIRED_VARIABLES: [&str; 6] = [
    "IDENTITY_NAME",
    "IDENTITY_ROLE",
    "IDENTITY_STANCE",
    "MODEL_CONTEXT_TOKENS",
    "CURRENT_LOOP",
    "MAX_ITERATIONS",
];

/// Soft bounds on rendered prompt length.
const MIN_RENDERED_LEN: usize = 1_000;
const MAX_RENDERED_LEN: usize = 50_000;

static VARIABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z][A-Z0-9_]*)(?:\s*\|\s*default:\s*([^}]*))?\}")
        .expect("valid variable pattern")
});

/// The built-in minimal prompt used when the configured template fails.
/// Satisfies every structural requirement so the fallback cannot itself
/// fail validation.
const FALLBACK_TEMPLATE: &str = r#"# Identity & Role Definition
You are ${IDENTITY_NAME}, an AI code auditor acting as ${IDENTITY_ROLE} with a ${IDENTITY_STANCE} stance.
You review code adversarially: your job is to find real defects, not to be agreeable.
Your model context is ${MODEL_CONTEXT_TOKENS} tokens. Treat the provided requirements and steering rules as ground truth.

# Audit Workflow
Review the submitted code in order: reproduce the author's intent, inspect for defects,
check tests, evaluate conformance to requirements, and only then settle a verdict.
This is loop ${CURRENT_LOOP} of at most ${MAX_ITERATIONS} iterations.

# Multi-Dimensional Quality Assessment
Score each dimension from 0 to 100 and weight them:
${QUALITY_DIMENSIONS_RENDERED | default: - correctness (weight 0.50)
- security (weight 0.25)
- maintainability (weight 0.25)}

# Intelligent Completion Criteria
${COMPLETION_TIERS_RENDERED | default: - score >= 95 after 10 loops}
Kill switches:
${KILL_SWITCHES_RENDERED | default: - hard stop at 25 loops}

# Structured Output Format
Respond with a single JSON object: {"overall": <0-100>, "verdict": "pass"|"revise"|"reject",
"dimensions": [{"name", "score", "weight"}], "inline": [{"path", "line", "comment"}],
"summary": "<one paragraph>", "judge_cards": [{"model", "score", "notes"}]}.
Do not wrap the JSON in markdown fences or commentary.
"#;

/// A validated prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    /// Load and validate a template from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::Template(format!("cannot read template {}: {e}", path.display()))
        })?;
        Self::from_source(source)
    }

    /// Validate template source: required sections and variables.
    pub fn from_source(source: impl Into<String>) -> Result<Self> {
        let source = source.into();

        for section in REQUIRED_SECTIONS {
            if !source.contains(section) {
                return Err(Error::Template(format!(
                    "missing required section '{section}'"
                )));
            }
        }

        let referenced: Vec<&str> = VARIABLE_PATTERN
            .captures_iter(&source)
            .map(|c| c.get(1).map(|m| m.as_str()).unwrap_or_default())
            .collect();
        for variable in REQUIRED_VARIABLES {
            if !referenced.contains(&variable) {
                return Err(Error::Template(format!(
                    "missing required variable '${{{variable}}}'"
                )));
            }
        }

        Ok(Self { source })
    }

    /// The built-in minimal template. Must always validate.
    pub fn fallback() -> Self {
        Self::from_source(FALLBACK_TEMPLATE).expect("fallback template is structurally valid")
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the template with the given variables.
    ///
    /// Unknown variables fall back to their inline default when present;
    /// otherwise the `${…}` occurrence is left in place and warned about.
    pub fn render(&self, variables: &HashMap<String, Value>) -> String {
        let rendered = VARIABLE_PATTERN.replace_all(&self.source, |caps: &regex::Captures<'_>| {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            match variables.get(name) {
                Some(value) => render_value(value),
                None => match caps.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default(),
                },
            }
        });

        let rendered = rendered.into_owned();

        for caps in VARIABLE_PATTERN.captures_iter(&rendered) {
            warn!(
                "Unresolved template variable {} after rendering",
                caps.get(0).map(|m| m.as_str()).unwrap_or_default()
            );
        }
        if rendered.len() < MIN_RENDERED_LEN {
            warn!(
                "Rendered prompt is only {} chars (expected >= {})",
                rendered.len(),
                MIN_RENDERED_LEN
            );
        } else if rendered.len() > MAX_RENDERED_LEN {
            warn!(
                "Rendered prompt is {} chars (expected <= {})",
                rendered.len(),
                MAX_RENDERED_LEN
            );
        }

        rendered
    }
}

/// Canonical rendering of a variable value.
///
/// Primitives render bare, arrays join with ", ", objects pretty-print
/// as JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => serde_json::to_string_pretty(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn minimal_valid_source() -> String {
        FALLBACK_TEMPLATE.to_string()
    }

    #[test]
    fn test_fallback_always_validates() {
        let _ = PromptTemplate::fallback();
    }

    #[test]
    fn test_missing_section_rejected() {
        let source = minimal_valid_source().replace("Identity & Role Definition", "Who You Are");
        let err = PromptTemplate::from_source(source).unwrap_err();
        match err {
            Error::Template(msg) => assert!(msg.contains("Identity & Role Definition")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_required_variable_rejected() {
        let source = minimal_valid_source().replace("${CURRENT_LOOP}", "this loop");
        let err = PromptTemplate::from_source(source).unwrap_err();
        match err {
            Error::Template(msg) => assert!(msg.contains("CURRENT_LOOP")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_substitution_of_primitives() {
        let template = PromptTemplate::fallback();
        let mut vars = HashMap::new();
        vars.insert("IDENTITY_NAME".to_string(), json!("Gavel"));
        vars.insert("IDENTITY_ROLE".to_string(), json!("reviewer"));
        vars.insert("IDENTITY_STANCE".to_string(), json!("adversarial"));
        vars.insert("MODEL_CONTEXT_TOKENS".to_string(), json!(200000));
        vars.insert("CURRENT_LOOP".to_string(), json!(3));
        vars.insert("MAX_ITERATIONS".to_string(), json!(25));

        let rendered = template.render(&vars);
        assert!(rendered.contains("You are Gavel"));
        assert!(rendered.contains("loop 3 of at most 25"));
        assert!(!rendered.contains("${CURRENT_LOOP}"));
    }

    #[test]
    fn test_inline_default_applies_when_missing() {
        let template = PromptTemplate::fallback();
        let rendered = template.render(&HashMap::new());
        // QUALITY_DIMENSIONS_RENDERED is absent, so the default applies.
        assert!(rendered.contains("correctness (weight 0.50)"));
    }

    #[test]
    fn test_array_joins_and_object_pretty_prints() {
        assert_eq!(render_value(&json!(["a", "b", 3])), "a, b, 3");
        let obj = render_value(&json!({"k": 1}));
        assert!(obj.contains("\"k\": 1"));
    }

    #[test]
    fn test_unresolved_variable_left_in_place() {
        let source = minimal_valid_source() + "\nExtra: ${NOT_PROVIDED}\n";
        let template = PromptTemplate::from_source(source).unwrap();
        let rendered = template.render(&HashMap::new());
        assert!(rendered.contains("${NOT_PROVIDED}"));
    }

    #[test]
    fn test_load_missing_file_is_template_error() {
        let err = PromptTemplate::load("/nonexistent/template.md").unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }
}
