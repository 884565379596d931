//! The closed record of variables available to prompt templates.

use serde_json::Value;
use std::collections::HashMap;

use crate::config::{CompletionCriteria, GavelConfig};

/// Variables substituted into the system prompt template.
///
/// This is a closed record: templates may only reference these names
/// (plus defaults for anything optional).
#[derive(Debug, Clone)]
pub struct PromptVariables {
    pub identity_name: String,
    pub identity_role: String,
    pub identity_stance: String,
    pub identity_authority: String,
    pub model_context_tokens: u64,
    pub audit_timeout_ms: u64,
    pub current_loop: u32,
    pub max_iterations: u32,
    pub stagnation_threshold: f64,
    pub quality_dimensions_rendered: String,
    pub completion_tiers_rendered: String,
    pub kill_switches_rendered: String,
    pub project_context: Option<String>,
    pub steering_rules: Option<String>,
    pub spec_requirements: Option<String>,
}

impl PromptVariables {
    /// Build variables from configuration for the given loop.
    pub fn from_config(config: &GavelConfig, current_loop: u32) -> Self {
        Self {
            identity_name: config.identity.name.clone(),
            identity_role: config.identity.role.clone(),
            identity_stance: config.identity.stance.to_string(),
            identity_authority: config.identity.authority.to_string(),
            model_context_tokens: 200_000,
            audit_timeout_ms: config.audit.timeout_ms,
            current_loop,
            max_iterations: config.completion.hard_stop.max_loops,
            stagnation_threshold: config.completion.stagnation.similarity_threshold,
            quality_dimensions_rendered: render_quality_dimensions(),
            completion_tiers_rendered: render_completion_tiers(&config.completion),
            kill_switches_rendered: render_kill_switches(&config.completion),
            project_context: None,
            steering_rules: None,
            spec_requirements: None,
        }
    }

    pub fn with_project_context(mut self, context: impl Into<String>) -> Self {
        self.project_context = Some(context.into());
        self
    }

    pub fn with_steering_rules(mut self, rules: impl Into<String>) -> Self {
        self.steering_rules = Some(rules.into());
        self
    }

    pub fn with_spec_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.spec_requirements = Some(requirements.into());
        self
    }

    /// Flatten into the name → value map consumed by the template engine.
    pub fn to_map(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("IDENTITY_NAME".into(), Value::from(self.identity_name.clone()));
        map.insert("IDENTITY_ROLE".into(), Value::from(self.identity_role.clone()));
        map.insert(
            "IDENTITY_STANCE".into(),
            Value::from(self.identity_stance.clone()),
        );
        map.insert(
            "IDENTITY_AUTHORITY".into(),
            Value::from(self.identity_authority.clone()),
        );
        map.insert(
            "MODEL_CONTEXT_TOKENS".into(),
            Value::from(self.model_context_tokens),
        );
        map.insert("AUDIT_TIMEOUT_MS".into(), Value::from(self.audit_timeout_ms));
        map.insert("CURRENT_LOOP".into(), Value::from(self.current_loop));
        map.insert("MAX_ITERATIONS".into(), Value::from(self.max_iterations));
        map.insert(
            "STAGNATION_THRESHOLD".into(),
            Value::from(self.stagnation_threshold),
        );
        map.insert(
            "QUALITY_DIMENSIONS_RENDERED".into(),
            Value::from(self.quality_dimensions_rendered.clone()),
        );
        map.insert(
            "COMPLETION_TIERS_RENDERED".into(),
            Value::from(self.completion_tiers_rendered.clone()),
        );
        map.insert(
            "KILL_SWITCHES_RENDERED".into(),
            Value::from(self.kill_switches_rendered.clone()),
        );
        if let Some(ref context) = self.project_context {
            map.insert("PROJECT_CONTEXT".into(), Value::from(context.clone()));
        }
        if let Some(ref rules) = self.steering_rules {
            map.insert("STEERING_RULES".into(), Value::from(rules.clone()));
        }
        if let Some(ref requirements) = self.spec_requirements {
            map.insert("SPEC_REQUIREMENTS".into(), Value::from(requirements.clone()));
        }
        map
    }
}

/// The default audit dimensions and their weights.
fn render_quality_dimensions() -> String {
    [
        ("correctness", 0.30),
        ("security", 0.20),
        ("maintainability", 0.15),
        ("testing", 0.15),
        ("performance", 0.10),
        ("style", 0.10),
    ]
    .iter()
    .map(|(name, weight)| format!("- {name} (weight {weight:.2})"))
    .collect::<Vec<_>>()
    .join("\n")
}

fn render_completion_tiers(criteria: &CompletionCriteria) -> String {
    [
        (&criteria.tier1, "tier 1"),
        (&criteria.tier2, "tier 2"),
        (&criteria.tier3, "tier 3"),
    ]
    .iter()
    .map(|(tier, label)| {
        format!(
            "- {label}: score >= {} after {} loops",
            tier.score, tier.min_loops
        )
    })
    .collect::<Vec<_>>()
    .join("\n")
}

fn render_kill_switches(criteria: &CompletionCriteria) -> String {
    format!(
        "- hard stop at {} loops\n- stagnation past loop {} (similarity > {})",
        criteria.hard_stop.max_loops,
        criteria.stagnation.start_loop,
        criteria.stagnation.similarity_threshold
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_map_contains_required_names() {
        let vars = PromptVariables::from_config(&GavelConfig::default(), 4);
        let map = vars.to_map();

        for name in [
            "IDENTITY_NAME",
            "IDENTITY_ROLE",
            "IDENTITY_STANCE",
            "MODEL_CONTEXT_TOKENS",
            "CURRENT_LOOP",
            "MAX_ITERATIONS",
        ] {
            assert!(map.contains_key(name), "missing {name}");
        }
        assert_eq!(map["CURRENT_LOOP"], Value::from(4u32));
    }

    #[test]
    fn test_optional_variables_absent_by_default() {
        let vars = PromptVariables::from_config(&GavelConfig::default(), 1);
        let map = vars.to_map();
        assert!(!map.contains_key("PROJECT_CONTEXT"));

        let map = vars.with_project_context("a web service").to_map();
        assert_eq!(map["PROJECT_CONTEXT"], Value::from("a web service"));
    }

    #[test]
    fn test_rendered_tiers_reflect_config() {
        let vars = PromptVariables::from_config(&GavelConfig::default(), 1);
        assert!(vars.completion_tiers_rendered.contains("score >= 95 after 10 loops"));
        assert!(vars.kill_switches_rendered.contains("hard stop at 25 loops"));
    }
}
