use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::de::{one_or_many, string_map};
use crate::rules::Ruleset;
use crate::{Environment, ParameterValue};

/// A single container unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,
    pub pull: Pull,
    /// Run in the background for the rest of the build.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub detach: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub commands: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub entrypoint: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty", alias = "directory")]
    pub working_dir: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(skip_serializing_if = "Ruleset::is_empty")]
    pub ruleset: Ruleset,
    /// Plugin settings, exposed to the container as `PARAMETER_<KEY>`.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ParameterValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<StepSecret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<StepTemplate>,
    #[serde(skip_serializing_if = "Environment::is_empty", deserialize_with = "string_map")]
    pub environment: Environment,
    /// External status context this step reports as.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub report_as: String,
}

impl Step {
    /// Whether this is an injected `init` or `clone` step.
    pub fn is_reserved(&self) -> bool {
        crate::is_reserved_name(&self.name)
    }
}

/// A reference from a step to a named template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepTemplate {
    pub name: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty", alias = "variables")]
    pub vars: IndexMap<String, ParameterValue>,
}

/// A secret mounted into a step as an environment variable.
///
/// Written either as a bare secret name, which is exposed under its uppercased
/// name, or as `{ source, target }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepSecret {
    pub source: String,
    pub target: String,
}

impl<'de> Deserialize<'de> for StepSecret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Full { source: String, target: String },
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Name(name) => StepSecret {
                target: name.to_uppercase(),
                source: name,
            },
            Raw::Full { source, target } => StepSecret { source, target },
        })
    }
}

/// When the image for a container is pulled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pull {
    Always,
    #[default]
    NotPresent,
    OnStart,
    Never,
}
