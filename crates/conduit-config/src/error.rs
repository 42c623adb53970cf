//! Configuration errors.

use conduit_core::document::Format;
use thiserror::Error;

/// Failure to turn configuration input into a build document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown format: {0}")]
    UnknownFormat(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode {format} configuration: {message}")]
    Decode { format: Format, message: String },

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Failure to render a template.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template {name}: {message}")]
    Template { name: String, message: String },

    #[error("script {name}: {message}")]
    Script { name: String, message: String },

    #[error("script {name} exceeded the limit of {limit} operations")]
    TooManyOperations { name: String, limit: u64 },

    #[error("template {name} rendered an invalid document: {message}")]
    Decode { name: String, message: String },
}

/// Failure to load compiler settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("duplicate definition: {0}")]
    Duplicate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
