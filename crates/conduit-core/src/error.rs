//! Error types for Conduit domain types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid rule pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("unknown format: {0}")]
    UnknownFormat(String),
}

pub type Result<T> = std::result::Result<T, Error>;
