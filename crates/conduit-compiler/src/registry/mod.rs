//! Remote template registries.

mod github;

pub use github::GitHubRegistry;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid template source {0:?}: expected [host/]org/repo/path[@ref]")]
    InvalidSource(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("registry returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// A file in a source repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySource {
    /// Source provider host, when given.
    pub host: Option<String>,
    pub org: String,
    pub repo: String,
    pub path: String,
    /// Branch, tag or commit. The default branch when `None`.
    pub reference: Option<String>,
}

impl RegistrySource {
    /// Parses `[host/]org/repo/path[@ref]`. A leading segment containing a dot
    /// is taken as the host.
    pub fn parse(source: &str) -> Result<Self, RegistryError> {
        let invalid = || RegistryError::InvalidSource(source.to_string());

        let (location, reference) = match source.rsplit_once('@') {
            Some((location, reference)) if !reference.is_empty() => {
                (location, Some(reference.to_string()))
            }
            Some(_) => return Err(invalid()),
            None => (source, None),
        };

        let mut segments: Vec<&str> = location
            .trim_start_matches("https://")
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let host = match segments.first() {
            Some(first) if first.contains('.') || first.contains(':') => {
                Some(segments.remove(0).to_string())
            }
            _ => None,
        };

        if segments.len() < 3 {
            return Err(invalid());
        }

        Ok(RegistrySource {
            host,
            org: segments[0].to_string(),
            repo: segments[1].to_string(),
            path: segments[2..].join("/"),
            reference,
        })
    }
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(host) = &self.host {
            write!(f, "{host}/")?;
        }
        write!(f, "{}/{}/{}", self.org, self.repo, self.path)?;
        if let Some(reference) = &self.reference {
            write!(f, "@{reference}")?;
        }
        Ok(())
    }
}

/// Fetches template files from a source provider.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetch the raw contents of a file. `token` authenticates the request
    /// when given; otherwise the registry's own credentials, if any, are used.
    async fn template(
        &self,
        token: Option<&str>,
        source: &RegistrySource,
    ) -> Result<Vec<u8>, RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_host_and_ref() {
        let source = RegistrySource::parse("github.com/octo/templates/ci/go.yml@v1.2").unwrap();
        assert_eq!(source.host.as_deref(), Some("github.com"));
        assert_eq!(source.org, "octo");
        assert_eq!(source.repo, "templates");
        assert_eq!(source.path, "ci/go.yml");
        assert_eq!(source.reference.as_deref(), Some("v1.2"));
        assert_eq!(source.to_string(), "github.com/octo/templates/ci/go.yml@v1.2");
    }

    #[test]
    fn test_parse_without_host() {
        let source = RegistrySource::parse("octo/templates/go.yml").unwrap();
        assert_eq!(source.host, None);
        assert_eq!(source.path, "go.yml");
        assert_eq!(source.reference, None);
    }

    #[test]
    fn test_parse_invalid() {
        for source in ["octo/go.yml", "github.com/octo/go.yml", "octo/tmpl/go.yml@", ""] {
            assert!(
                matches!(RegistrySource::parse(source), Err(RegistryError::InvalidSource(_))),
                "{source}"
            );
        }
    }
}
