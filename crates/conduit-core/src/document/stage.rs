use serde::{Deserialize, Serialize};

use super::Step;
use crate::Environment;
use crate::de::{one_or_many, string_map};
use crate::rules::Ruleset;

/// A named group of steps.
///
/// Stages are keyed by name in the document, so the name is filled in from the
/// map key and left out when serializing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage {
    #[serde(skip_serializing)]
    pub name: String,
    /// Stages that must complete before this one starts.
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub needs: Vec<String>,
    /// Keep running the stage's steps after one fails.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub independent: bool,
    #[serde(skip_serializing_if = "Environment::is_empty", deserialize_with = "string_map")]
    pub environment: Environment,
    #[serde(skip_serializing_if = "Ruleset::is_empty")]
    pub ruleset: Ruleset,
    pub steps: Vec<Step>,
}

impl Stage {
    pub fn has_templates(&self) -> bool {
        self.steps.iter().any(|step| step.template.is_some())
    }
}
