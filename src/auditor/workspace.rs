//! Workspace collateral gathering.
//!
//! Project context, steering rules, and spec requirements are opaque
//! strings pulled from conventional locations in the workspace and
//! handed to the prompt renderer. Missing files are simply absent
//! collateral, never errors.

use glob::glob;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Candidate files for project context, first hit wins.
const PROJECT_CONTEXT_FILES: [&str; 3] = ["PROJECT.md", "README.md", "docs/overview.md"];

/// Opaque workspace collateral attached to prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceCollateral {
    pub project_context: Option<String>,
    pub steering_rules: Option<String>,
    pub spec_requirements: Option<String>,
}

/// Gathers collateral from a workspace root.
pub struct WorkspaceGatherer {
    root: PathBuf,
}

impl WorkspaceGatherer {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Read collateral from the workspace. All parts are optional.
    pub fn gather(&self) -> WorkspaceCollateral {
        WorkspaceCollateral {
            project_context: self.first_of(&PROJECT_CONTEXT_FILES),
            steering_rules: self.concat_glob(".gavel/steering/*.md"),
            spec_requirements: self.concat_glob(".gavel/spec/*.md"),
        }
    }

    fn first_of(&self, candidates: &[&str]) -> Option<String> {
        for candidate in candidates {
            let path = self.root.join(candidate);
            if let Ok(content) = std::fs::read_to_string(&path) {
                debug!("Using {} as project context", path.display());
                return Some(content);
            }
        }
        None
    }

    /// Concatenate all files matching the pattern, sorted by path so the
    /// result is stable across runs.
    fn concat_glob(&self, pattern: &str) -> Option<String> {
        let full_pattern = self.root.join(pattern);
        let mut paths: Vec<PathBuf> = glob(full_pattern.to_str()?)
            .ok()?
            .filter_map(|entry| entry.ok())
            .collect();
        paths.sort();

        let mut parts = Vec::new();
        for path in paths {
            if let Ok(content) = std::fs::read_to_string(&path) {
                parts.push(content);
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_workspace_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let collateral = WorkspaceGatherer::new(dir.path()).gather();
        assert_eq!(collateral, WorkspaceCollateral::default());
    }

    #[test]
    fn test_readme_becomes_project_context() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "a web service").unwrap();

        let collateral = WorkspaceGatherer::new(dir.path()).gather();
        assert_eq!(collateral.project_context.as_deref(), Some("a web service"));
    }

    #[test]
    fn test_steering_rules_concatenated_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let steering = dir.path().join(".gavel/steering");
        std::fs::create_dir_all(&steering).unwrap();
        std::fs::write(steering.join("20-style.md"), "no unwrap").unwrap();
        std::fs::write(steering.join("10-errors.md"), "use thiserror").unwrap();

        let collateral = WorkspaceGatherer::new(dir.path()).gather();
        let rules = collateral.steering_rules.unwrap();
        let errors_pos = rules.find("use thiserror").unwrap();
        let style_pos = rules.find("no unwrap").unwrap();
        assert!(errors_pos < style_pos);
    }
}
