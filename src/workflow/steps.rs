//! The eight built-in workflow steps.
//!
//! These are heuristic analyzers: they inspect the code text for
//! suspicious patterns rather than running real tools. Wiring them to
//! actual linters and test runners is an integration concern; the
//! contract (evidence items in, advisory only) stays the same.

use async_trait::async_trait;
use std::sync::Arc;

use super::WorkflowStep;
use crate::config::SecurityConfig;
use crate::error::Result;
use crate::judge::{AuditRequest, EvidenceItem, EvidenceKind, Severity};
use crate::progress::AuditStage;

/// The default step roster, in execution order.
pub fn default_steps(security: &SecurityConfig) -> Vec<Arc<dyn WorkflowStep>> {
    vec![
        Arc::new(InitStep),
        Arc::new(ReproStep),
        Arc::new(StaticStep::new(security.flag_vulnerabilities)),
        Arc::new(TestsStep),
        Arc::new(DynamicStep),
        Arc::new(ConformStep),
        Arc::new(TraceStep),
        Arc::new(VerdictStep),
    ]
}

/// INIT: sanity-check the submission itself.
pub struct InitStep;

#[async_trait]
impl WorkflowStep for InitStep {
    fn name(&self) -> &'static str {
        "init"
    }

    fn stage(&self) -> AuditStage {
        AuditStage::ContextBuilding
    }

    async fn execute(&self, request: &AuditRequest) -> Result<Vec<EvidenceItem>> {
        let mut evidence = Vec::new();
        if request.code.trim().is_empty() {
            evidence.push(EvidenceItem::new(
                EvidenceKind::Format,
                Severity::Major,
                "init",
                "submission contains an empty code payload",
            ));
        }
        if request.language.is_none() {
            evidence.push(EvidenceItem::new(
                EvidenceKind::Format,
                Severity::Minor,
                "init",
                "no language declared on the code fence",
            ));
        }
        Ok(evidence)
    }
}

/// REPRO: look for reproduction context (how to run the thing).
pub struct ReproStep;

#[async_trait]
impl WorkflowStep for ReproStep {
    fn name(&self) -> &'static str {
        "repro"
    }

    async fn execute(&self, request: &AuditRequest) -> Result<Vec<EvidenceItem>> {
        let has_entry = ["fn main", "def main", "if __name__", "public static void main"]
            .iter()
            .any(|marker| request.code.contains(marker));
        if !has_entry && request.code.len() > 2_000 {
            return Ok(vec![EvidenceItem::new(
                EvidenceKind::Testing,
                Severity::Minor,
                "repro",
                "large submission with no entry point; reviewer cannot reproduce behavior",
            )
            .with_suggested_fix("include the calling context or a minimal driver")]);
        }
        Ok(Vec::new())
    }
}

/// STATIC: pattern-level static inspection.
pub struct StaticStep {
    flag_vulnerabilities: bool,
}

impl StaticStep {
    pub fn new(flag_vulnerabilities: bool) -> Self {
        Self {
            flag_vulnerabilities,
        }
    }
}

#[async_trait]
impl WorkflowStep for StaticStep {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn execute(&self, request: &AuditRequest) -> Result<Vec<EvidenceItem>> {
        let mut evidence = Vec::new();
        for (line_number, line) in request.code.lines().enumerate() {
            let line_number = line_number as u32 + 1;
            if line.contains(".unwrap()") || line.contains(".expect(") {
                evidence.push(
                    EvidenceItem::new(
                        EvidenceKind::ErrorHandling,
                        Severity::Major,
                        format!("static:{line_number}"),
                        "unchecked unwrap/expect can panic at runtime",
                    )
                    .with_proof(line.trim().to_string())
                    .with_suggested_fix("propagate the error with ? or handle the None case"),
                );
            }
            if line.contains("panic!(") {
                evidence.push(
                    EvidenceItem::new(
                        EvidenceKind::ErrorHandling,
                        Severity::Major,
                        format!("static:{line_number}"),
                        "explicit panic in submitted code",
                    )
                    .with_proof(line.trim().to_string()),
                );
            }
            if self.flag_vulnerabilities && looks_like_hardcoded_secret(line) {
                evidence.push(
                    EvidenceItem::new(
                        EvidenceKind::Security,
                        Severity::Critical,
                        format!("static:{line_number}"),
                        "credential appears to be hard-coded",
                    )
                    .with_suggested_fix("load secrets from the environment or a vault"),
                );
            }
        }
        Ok(evidence)
    }
}

/// Assignment of a quoted literal to a secret-looking name.
fn looks_like_hardcoded_secret(line: &str) -> bool {
    let lower = line.to_lowercase();
    let named_secret = ["password", "api_key", "apikey", "secret", "token"]
        .iter()
        .any(|name| lower.contains(name));
    named_secret && (lower.contains("= \"") || lower.contains("=\"")) && !lower.contains("env")
}

/// TESTS: check whether the submission carries or touches tests.
pub struct TestsStep;

#[async_trait]
impl WorkflowStep for TestsStep {
    fn name(&self) -> &'static str {
        "tests"
    }

    async fn execute(&self, request: &AuditRequest) -> Result<Vec<EvidenceItem>> {
        let markers = ["#[test]", "#[tokio::test]", "def test_", "it(", "assert"];
        let has_tests = markers.iter().any(|m| request.code.contains(m));
        if !has_tests && request.code.len() > 500 {
            return Ok(vec![EvidenceItem::new(
                EvidenceKind::Testing,
                Severity::Minor,
                "tests",
                "no tests accompany this change",
            )
            .with_suggested_fix("add a test exercising the changed behavior")]);
        }
        Ok(Vec::new())
    }
}

/// DYNAMIC: runtime-behavior heuristics (unbounded loops, sleeps).
pub struct DynamicStep;

#[async_trait]
impl WorkflowStep for DynamicStep {
    fn name(&self) -> &'static str {
        "dynamic"
    }

    async fn execute(&self, request: &AuditRequest) -> Result<Vec<EvidenceItem>> {
        let mut evidence = Vec::new();
        if request.code.contains("loop {") && !request.code.contains("break") {
            evidence.push(EvidenceItem::new(
                EvidenceKind::LogicError,
                Severity::Major,
                "dynamic",
                "loop with no visible break condition",
            ));
        }
        if request.code.contains("sleep(") {
            evidence.push(EvidenceItem::new(
                EvidenceKind::Performance,
                Severity::Minor,
                "dynamic",
                "hard-coded sleep; prefer notification or polling with backoff",
            ));
        }
        Ok(evidence)
    }
}

/// CONFORM: naming and structure conformance.
pub struct ConformStep;

#[async_trait]
impl WorkflowStep for ConformStep {
    fn name(&self) -> &'static str {
        "conform"
    }

    async fn execute(&self, request: &AuditRequest) -> Result<Vec<EvidenceItem>> {
        let mut evidence = Vec::new();
        let long_lines = request.code.lines().filter(|l| l.len() > 120).count();
        if long_lines > 5 {
            evidence.push(EvidenceItem::new(
                EvidenceKind::Conformance,
                Severity::Minor,
                "conform",
                format!("{long_lines} lines exceed 120 columns"),
            ));
        }
        Ok(evidence)
    }
}

/// TRACE: requirement traceability markers.
pub struct TraceStep;

#[async_trait]
impl WorkflowStep for TraceStep {
    fn name(&self) -> &'static str {
        "trace"
    }

    async fn execute(&self, request: &AuditRequest) -> Result<Vec<EvidenceItem>> {
        let todo_count = request
            .code
            .lines()
            .filter(|l| l.contains("TODO") || l.contains("FIXME"))
            .count();
        if todo_count > 0 {
            return Ok(vec![EvidenceItem::new(
                EvidenceKind::Traceability,
                Severity::Minor,
                "trace",
                format!("{todo_count} TODO/FIXME markers left in the submission"),
            )]);
        }
        Ok(Vec::new())
    }
}

/// VERDICT: cross-check aggregate signals before the judge settles.
pub struct VerdictStep;

#[async_trait]
impl WorkflowStep for VerdictStep {
    fn name(&self) -> &'static str {
        "verdict"
    }

    fn stage(&self) -> AuditStage {
        AuditStage::QualityAssessment
    }

    async fn execute(&self, request: &AuditRequest) -> Result<Vec<EvidenceItem>> {
        // Aggregate signal: submissions dominated by deletions or noise
        // give the judge nothing to hold a verdict on.
        let meaningful = request
            .code
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count();
        if meaningful < 2 && !request.code.trim().is_empty() {
            return Ok(vec![EvidenceItem::new(
                EvidenceKind::Other,
                Severity::Minor,
                "verdict",
                "single-line submission; verdict confidence is low",
            )]);
        }
        Ok(Vec::new())
    }
}
