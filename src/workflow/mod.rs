//! Advisory workflow step collaborators.
//!
//! Eight analyzers contribute evidence items to a review: INIT, REPRO,
//! STATIC, TESTS, DYNAMIC, CONFORM, TRACE, and VERDICT. They are
//! heuristic by design; the engine treats their output as advisory
//! collateral and swallows their failures (a raising step yields a
//! single Major evidence item instead of aborting the audit).

pub mod steps;

use async_trait::async_trait;

use crate::error::Result;
use crate::judge::{AuditRequest, EvidenceItem};
use crate::progress::AuditStage;

pub use steps::default_steps;

/// One advisory analyzer in the audit workflow.
#[async_trait]
pub trait WorkflowStep: Send + Sync {
    /// Step name as it appears in evidence locations and logs.
    fn name(&self) -> &'static str;

    /// Progress stage this step reports under.
    fn stage(&self) -> AuditStage {
        AuditStage::WorkflowExecution
    }

    /// Analyze the request and emit evidence.
    async fn execute(&self, request: &AuditRequest) -> Result<Vec<EvidenceItem>>;
}
