//! Compiles Conduit configuration into executable pipelines.
//!
//! A compile runs, in order: parse, inline and step template expansion, the
//! optional modification hook, document validation, `init`/`clone`
//! injection, environment layering, `${VAR}` substitution, script
//! generation, transformation, pipeline validation and rule purging.

pub mod cache;
mod compiler;
pub mod environment;
mod error;
mod expand;
mod inject;
pub mod modify;
pub mod purge;
pub mod registry;
mod resolve;
pub mod script;
pub mod substitute;
pub mod summary;
pub mod transform;
pub mod validate;

pub use compiler::{CompileOutput, Compiler, LiteOutput};
pub use error::{CompileError, Result, ValidationErrors};
pub use summary::ConfigSummary;
