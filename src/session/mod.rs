//! Session and iteration store.
//!
//! Sessions record per-conversation audit history, completion state, and
//! stagnation signals; they feed both the completion evaluator and the
//! prompt renderer. The store is the only component that mutates them.

pub mod schema;
pub mod store;
pub mod types;

pub use store::{SessionGuard, SessionStore};
pub use types::{
    CompletionState, CompletionStatus, IterationRecord, Session, StagnationState, Thought,
};
