//! Lenient deserializers shared by the document types.
//!
//! Hand-written configuration is loose about shapes: a list field may be given
//! as a single scalar, an environment may be a map or a list of `KEY=VALUE`
//! strings, and stages are keyed by name.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serializer};
use std::collections::BTreeMap;

use crate::document::Stage;

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::String(s) => s,
            Scalar::Integer(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Accepts a scalar or a sequence of scalars.
pub(crate) fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(Scalar),
        Many(Vec<Scalar>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s.into_string()],
        Some(OneOrMany::Many(v)) => v.into_iter().map(Scalar::into_string).collect(),
    })
}

/// Accepts a map of scalars or a list of `KEY=VALUE` entries.
pub(crate) fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Map(BTreeMap<String, Option<Scalar>>),
        List(Vec<String>),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(BTreeMap::new()),
        Some(Raw::Map(map)) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, v.map(Scalar::into_string).unwrap_or_default()))
            .collect()),
        Some(Raw::List(list)) => list
            .into_iter()
            .map(|entry| match entry.split_once('=') {
                Some((k, v)) => Ok((k.to_string(), v.to_string())),
                None => Err(D::Error::custom(format!(
                    "invalid environment entry {entry:?}: expected KEY=VALUE"
                ))),
            })
            .collect(),
    }
}

/// Stages are written as a map keyed by stage name; a list of named stages is
/// accepted too. Declaration order is preserved.
pub(crate) mod stage_map {
    use super::*;

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S>(stages: &Vec<Stage>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(stages.len()))?;
        for stage in stages {
            map.serialize_entry(&stage.name, stage)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Stage>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Map(IndexMap<String, Stage>),
            List(Vec<Stage>),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => Vec::new(),
            Some(Raw::Map(map)) => map
                .into_iter()
                .map(|(name, mut stage)| {
                    stage.name = name;
                    stage
                })
                .collect(),
            Some(Raw::List(list)) => list,
        })
    }
}
