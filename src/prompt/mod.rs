//! Prompt rendering pipeline: template validation and typed substitution.

pub mod template;
pub mod variables;

pub use template::{PromptTemplate, REQUIRED_SECTIONS, REQUIRED_VARIABLES};
pub use variables::PromptVariables;
