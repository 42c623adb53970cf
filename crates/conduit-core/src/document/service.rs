use serde::{Deserialize, Serialize};

use super::Pull;
use crate::Environment;
use crate::de::{one_or_many, string_map};
use crate::rules::Ruleset;

/// A background container that lives for the whole build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,
    pub pull: Pull,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub entrypoint: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub commands: Vec<String>,
    #[serde(skip_serializing_if = "Environment::is_empty", deserialize_with = "string_map")]
    pub environment: Environment,
    #[serde(skip_serializing_if = "Ruleset::is_empty")]
    pub ruleset: Ruleset,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
}
