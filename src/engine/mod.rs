//! Synchronous audit engine: validate, cache, queue, judge, recover.

pub mod sync;
pub mod triage;

pub use sync::{AuditOutcome, SynchronousAuditEngine};
pub use triage::{CodeTriage, ExtractedCode, TriageOutcome};
