//! Core domain types for the Conduit pipeline compiler.
//!
//! This crate contains:
//! - The build document (the parsed, templated configuration)
//! - Rulesets and the runtime rule data they are matched against
//! - The executable pipeline handed to an executor
//! - Collaborator records (build, repo, user, platform metadata)
//! - Composite identifiers and stage completion signals

mod de;

pub mod document;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod records;
pub mod rules;
pub mod signal;
pub mod value;

pub use error::{Error, Result};
pub use id::BuildIdentity;
pub use value::ParameterValue;

/// Map of environment variable names to values.
pub type Environment = std::collections::BTreeMap<String, String>;

/// Name of the injected init step and stage.
pub const INIT_NAME: &str = "init";

/// Placeholder image of the injected init step.
pub const INIT_IMAGE: &str = "#init";

/// Name of the injected clone step and stage.
pub const CLONE_NAME: &str = "clone";

/// Prefix shared by every platform-provided environment variable.
pub const ENV_PREFIX: &str = "CONDUIT_";

/// Returns true for the reserved names that may repeat within a scope.
pub fn is_reserved_name(name: &str) -> bool {
    name == INIT_NAME || name == CLONE_NAME
}
