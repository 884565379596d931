//! Judge adapter: the uniform call surface over the external reviewer.
//!
//! The Judge is an opaque process (or RPC endpoint) that turns one audit
//! request into one structured review. This module owns the request/review
//! data model, the wire protocol validation, the typed failure taxonomy,
//! and the transient-only retry policy. The engine above decides how each
//! failure degrades into a synthetic review.

pub mod adapter;
#[cfg(feature = "http-judge")]
pub mod http;
pub mod process;
pub mod protocol;
pub mod types;

pub use adapter::{JudgeAdapter, JudgeFailure, RetryingJudge};
#[cfg(feature = "http-judge")]
pub use http::HttpJudge;
pub use process::ProcessJudge;
pub use protocol::parse_review;
pub use types::{
    AuditRequest, EvidenceItem, EvidenceKind, InlineComment, JudgeCard, QualityDimension, Review,
    ReviewVerdict, Severity,
};

#[cfg(test)]
pub use adapter::MockJudge;
