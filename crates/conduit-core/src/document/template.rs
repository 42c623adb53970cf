use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, ParameterValue};

/// A named, reusable piece of pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Template {
    pub name: String,
    /// Where to fetch the template from. For `github` templates this is
    /// `[host/]org/repo/path[@ref]`, for `file` templates a path.
    pub source: String,
    #[serde(rename = "type")]
    pub kind: TemplateType,
    pub format: Format,
    /// Variables for inline rendering. Step templates take theirs from the
    /// calling step instead.
    #[serde(skip_serializing_if = "IndexMap::is_empty", alias = "variables")]
    pub vars: IndexMap<String, ParameterValue>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            name: String::new(),
            source: String::new(),
            kind: TemplateType::default(),
            format: Format::Jinja,
            vars: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    File,
    #[default]
    #[serde(alias = "git")]
    Github,
}

/// The dialect a configuration or template is written in.
///
/// `Yaml` is plain structured data. `Jinja` is a text template rendering to
/// YAML. `Rhai` is a script whose final expression evaluates to the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Format {
    #[default]
    Yaml,
    Jinja,
    Rhai,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Yaml => "yaml",
            Format::Jinja => "jinja",
            Format::Rhai => "rhai",
        }
    }

    /// Whether documents in this dialect have to be rendered before decoding.
    pub fn is_templated(&self) -> bool {
        !matches!(self, Format::Yaml)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "" | "jinja" | "j2" | "native" => Ok(Format::Jinja),
            "rhai" | "script" => Ok(Format::Rhai),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

impl TryFrom<String> for Format {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        format.as_str().to_string()
    }
}
