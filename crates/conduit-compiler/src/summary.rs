//! Facts about a compiled configuration, kept for auditing.

use conduit_core::document::{Build, Format};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    /// The configuration exactly as it was read.
    #[serde(skip)]
    pub raw: Vec<u8>,
    /// Hex SHA-256 of `raw`.
    pub digest: String,
    pub format: Format,
    pub warnings: Vec<String>,
    pub flags: Flags,
}

/// Features the configuration uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub stages: bool,
    pub steps: bool,
    pub services: bool,
    pub templates: bool,
    pub internal_secrets: bool,
    pub external_secrets: bool,
}

impl Flags {
    pub fn of(build: &Build) -> Self {
        Self {
            stages: !build.stages.is_empty(),
            steps: !build.steps.is_empty(),
            services: !build.services.is_empty(),
            templates: !build.templates.is_empty(),
            internal_secrets: build.secrets.iter().any(|s| !s.is_origin()),
            external_secrets: build.secrets.iter().any(|s| s.is_origin()),
        }
    }
}

impl ConfigSummary {
    pub fn new(raw: Vec<u8>, format: Format, build: &Build, warnings: Vec<String>) -> Self {
        let digest = hex::encode(Sha256::digest(&raw));
        Self {
            raw,
            digest,
            format,
            warnings,
            flags: Flags::of(build),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let raw = b"version: \"1\"\nsteps: []\n".to_vec();
        let build: Build = serde_yaml::from_str(
            r#"
version: "1"
templates:
  - name: go
    source: octo/tmpl/go.yml
secrets:
  - name: token
  - name: vault
    origin:
      name: vault
      image: plugins/vault
"#,
        )
        .unwrap();

        let summary = ConfigSummary::new(raw, Format::Yaml, &build, vec![]);
        assert_eq!(summary.digest.len(), 64);
        assert_eq!(
            summary.digest,
            hex::encode(Sha256::digest(b"version: \"1\"\nsteps: []\n"))
        );
        assert!(summary.flags.templates);
        assert!(summary.flags.internal_secrets);
        assert!(summary.flags.external_secrets);
        assert!(!summary.flags.stages);
    }
}
