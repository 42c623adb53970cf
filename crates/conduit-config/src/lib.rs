//! Configuration handling for Conduit.
//!
//! This crate handles:
//! - Parsing pipeline configuration in any supported dialect
//! - Rendering templates (native text templates and scripts)
//! - `${VAR}` substitution
//! - Compiler settings (conduit.kdl)

pub mod error;
pub mod parse;
pub mod render;
pub mod system;
pub mod variables;

pub use error::{ConfigError, ConfigResult, ParseError, RenderError};
pub use parse::{Parsed, Source, parse};
pub use render::{RenderContext, Rendered, Renderer};
pub use system::CompilerConfig;
