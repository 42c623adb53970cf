use serde::{Deserialize, Deserializer, Serialize};

use super::Step;

pub const DEFAULT_ENGINE: &str = "native";

/// A secret declared by the build.
///
/// Secrets are either looked up by `key` in an `engine`, or produced by an
/// `origin` plugin container that runs before the build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Secret {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub engine: String,
    #[serde(rename = "type")]
    pub kind: SecretType,
    pub pull: SecretPull,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Step>,
}

impl Secret {
    pub fn is_origin(&self) -> bool {
        self.origin.is_some()
    }
}

impl Default for Secret {
    fn default() -> Self {
        Self {
            name: String::new(),
            key: String::new(),
            engine: DEFAULT_ENGINE.to_string(),
            kind: SecretType::default(),
            pull: SecretPull::default(),
            origin: None,
        }
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(default)]
        struct Raw {
            name: String,
            key: String,
            engine: String,
            #[serde(rename = "type")]
            kind: SecretType,
            pull: SecretPull,
            origin: Option<Step>,
        }

        impl Default for Raw {
            fn default() -> Self {
                let secret = Secret::default();
                Self {
                    name: secret.name,
                    key: secret.key,
                    engine: secret.engine,
                    kind: secret.kind,
                    pull: secret.pull,
                    origin: None,
                }
            }
        }

        let raw = Raw::deserialize(deserializer)?;
        // Plugin secrets are fetched by their origin, not looked up by key.
        let (key, engine) = if raw.origin.is_some() {
            (raw.key, raw.engine)
        } else {
            let key = if raw.key.is_empty() {
                raw.name.clone()
            } else {
                raw.key
            };
            let engine = if raw.engine.is_empty() {
                DEFAULT_ENGINE.to_string()
            } else {
                raw.engine
            };
            (key, engine)
        };

        Ok(Secret {
            name: raw.name,
            key,
            engine,
            kind: raw.kind,
            pull: raw.pull,
            origin: raw.origin,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretType {
    #[default]
    Repo,
    Org,
    Shared,
}

/// When the secret value is fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretPull {
    #[default]
    BuildStart,
    StepStart,
}
