//! Agent daemon: LLM-driven ticket diagnosis and remediation.

pub mod context;
pub mod diagnosis;
pub mod prompt;
pub mod runner;

pub use context::{ContextGatherer, DiagnosisContext};
pub use diagnosis::{parse_diagnosis_response, DiagnosisOutcome, DIAGNOSIS_TOOL_NAME};
pub use runner::AgentRunner;
