//! The build document: a pipeline configuration as written by a user,
//! before and during compilation.

mod secret;
mod service;
mod stage;
mod step;
mod template;

pub use secret::{Secret, SecretPull, SecretType};
pub use service::Service;
pub use stage::Stage;
pub use step::{Pull, Step, StepSecret, StepTemplate};
pub use template::{Format, Template, TemplateType};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::Environment;
use crate::de::{one_or_many, stage_map, string_map};

/// Environment scopes a build may inherit its global environment into.
pub const ENVIRONMENT_SCOPES: [&str; 3] = ["steps", "services", "secrets"];

/// The root of a pipeline configuration.
///
/// A build holds either stages or steps, never both. A build with neither is
/// only meaningful when it renders its templates inline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Build {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Worker::is_empty")]
    pub worker: Worker,
    #[serde(skip_serializing_if = "Deployment::is_empty")]
    pub deployment: Deployment,
    #[serde(skip_serializing_if = "Environment::is_empty", deserialize_with = "string_map")]
    pub environment: Environment,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<Secret>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,
    #[serde(skip_serializing_if = "Vec::is_empty", with = "stage_map")]
    pub stages: Vec<Stage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<Template>,
}

impl Build {
    /// Every step of the build, stage by stage or from the flat list.
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.stages
            .iter()
            .flat_map(|stage| stage.steps.iter())
            .chain(self.steps.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
            && self.services.is_empty()
            && self.stages.is_empty()
            && self.steps.is_empty()
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }
}

/// Build-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    /// Inject a clone step. Enabled unless set to false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone: Option<bool>,
    /// Render the top-level `templates` straight into the build.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub render_inline: bool,
    /// Scopes that inherit the global environment. Defaults to all of them.
    #[serde(deserialize_with = "environment_scopes")]
    pub environment: Vec<String>,
    #[serde(skip_serializing_if = "AutoCancel::is_empty")]
    pub auto_cancel: AutoCancel,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            clone: None,
            render_inline: false,
            environment: default_scopes(),
            auto_cancel: AutoCancel::default(),
        }
    }
}

fn default_scopes() -> Vec<String> {
    ENVIRONMENT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn environment_scopes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let scopes = one_or_many(deserializer)?;
    Ok(if scopes.is_empty() {
        default_scopes()
    } else {
        scopes
    })
}

impl Metadata {
    pub fn clone_enabled(&self) -> bool {
        self.clone.unwrap_or(true)
    }

    /// Whether the global environment is inherited by `scope`.
    pub fn has_environment(&self, scope: &str) -> bool {
        self.environment.iter().any(|s| s == scope)
    }
}

/// Cancellation policy for superseded builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCancel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<bool>,
}

impl AutoCancel {
    pub fn is_empty(&self) -> bool {
        self.pending.is_none() && self.running.is_none() && self.default_branch.is_none()
    }
}

/// Routing hints for the worker that picks the build up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Worker {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub flavor: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub platform: String,
}

impl Worker {
    pub fn is_empty(&self) -> bool {
        self.flavor.is_empty() && self.platform.is_empty()
    }
}

/// Restrictions for deployment-triggered builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deployment {
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, DeployParameter>,
}

impl Deployment {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.parameters.is_empty()
    }
}

/// A parameter a deployment may be triggered with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployParameter {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_step_build() {
        let yaml = r#"
version: "1"
environment:
  GLOBAL: true
steps:
  - name: test
    image: rust:1.85
    commands: cargo test
"#;
        let build: Build = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(build.version, "1");
        assert_eq!(build.steps.len(), 1);
        assert_eq!(build.steps[0].commands, vec!["cargo test"]);
        assert_eq!(build.environment["GLOBAL"], "true");
        assert!(build.metadata.clone_enabled());
        assert!(build.metadata.has_environment("services"));
    }

    #[test]
    fn test_stages_keep_declaration_order() {
        let yaml = r#"
version: "1"
stages:
  zeta:
    steps:
      - name: a
        image: alpine
        commands: [echo a]
  alpha:
    needs: zeta
    steps:
      - name: b
        image: alpine
        commands: [echo b]
"#;
        let build: Build = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<_> = build.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(build.stages[1].needs, vec!["zeta"]);

        let again: Build = serde_yaml::from_str(&serde_yaml::to_string(&build).unwrap()).unwrap();
        assert_eq!(build, again);
    }

    #[test]
    fn test_metadata_scopes() {
        let build: Build =
            serde_yaml::from_str("metadata: {clone: false, environment: [steps]}").unwrap();
        assert!(!build.metadata.clone_enabled());
        assert!(build.metadata.has_environment("steps"));
        assert!(!build.metadata.has_environment("secrets"));
    }

    #[test]
    fn test_environment_list_form() {
        let build: Build = serde_yaml::from_str("environment: [A=1, B=x=y]").unwrap();
        assert_eq!(build.environment["A"], "1");
        assert_eq!(build.environment["B"], "x=y");
        assert!(serde_yaml::from_str::<Build>("environment: [NOPE]").is_err());
    }
}
