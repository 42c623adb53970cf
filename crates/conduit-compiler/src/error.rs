//! Compile errors.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] conduit_config::ParseError),

    #[error("unable to fetch template {name}: {message}")]
    TemplateSource { name: String, message: String },

    #[error(transparent)]
    TemplateRender(#[from] conduit_config::RenderError),

    #[error("templates nest deeper than the maximum of {max}")]
    TemplateDepthExceeded { max: usize },

    #[error("mixed content: {0}")]
    MixedContent(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("unable to substitute variables in step {step}: {message}")]
    Substitution { step: String, message: String },

    #[error("modification request failed after {attempts} attempt(s): {message}")]
    ModificationHook { attempts: u32, message: String },

    #[error(transparent)]
    Rule(#[from] conduit_core::Error),
}

impl CompileError {
    pub(crate) fn template_source(name: &str, message: impl fmt::Display) -> Self {
        CompileError::TemplateSource {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Every structural problem found in a document or pipeline.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    /// Whether any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.0.iter().any(|message| message.contains(needle))
    }

    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid pipeline:")?;
        for message in &self.0 {
            write!(f, "\n  - {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_display() {
        let mut errors = ValidationErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.push("no version provided");
        errors.push("step test: no image provided");
        assert_eq!(
            CompileError::from(errors.clone()).to_string(),
            "invalid pipeline:\n  - no version provided\n  - step test: no image provided"
        );
        assert!(errors.contains("no image"));
        assert_eq!(errors.len(), 2);
    }
}
