//! Ports: trait seams between the operator core and its collaborators.

pub mod authorization;
pub mod checker;
pub mod llm;
pub mod subject;
pub mod tools;

pub use authorization::{AllowAllCapabilities, AllowAllPermissions, CapabilityChecker, PermissionChecker};
pub use checker::InvariantChecker;
pub use llm::LlmClient;
pub use subject::{ChaosSubject, Subject};
pub use tools::ToolExecutor;
