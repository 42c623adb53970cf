//! Compiler settings, read from `conduit.kdl`.
//!
//! ```kdl
//! clone-image "ghcr.io/conduit-ci/git:latest"
//! template-depth 3
//! script-exec-limit 7500
//! report-as-limit 10
//! local #true
//! template "go" path="./templates/go.yml"
//!
//! modification {
//!     endpoint "https://hooks.example.com/modify"
//!     secret "s3cret"
//!     timeout-secs 8
//!     retries 3
//!     backoff-min-ms 500
//!     backoff-max-ms 5000
//! }
//!
//! github {
//!     api-url "https://api.github.com"
//!     token "ghp_..."
//! }
//! ```

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CLONE_IMAGE: &str = "ghcr.io/conduit-ci/git:latest";
pub const DEFAULT_TEMPLATE_DEPTH: usize = 3;
pub const DEFAULT_REPORT_AS_LIMIT: usize = 10;
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Settings that apply to every compile.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerConfig {
    pub clone_image: String,
    /// How deep templates may nest.
    pub template_depth: usize,
    /// Operation budget for script templates.
    pub script_exec_limit: u64,
    /// Maximum number of steps that may set `report_as`.
    pub report_as_limit: usize,
    /// Compile for a local run: no repository metadata, templates from disk.
    pub local: bool,
    /// Template name to path, for local compiles.
    pub local_templates: BTreeMap<String, PathBuf>,
    pub modification: Option<ModificationConfig>,
    pub github: GithubConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            clone_image: DEFAULT_CLONE_IMAGE.to_string(),
            template_depth: DEFAULT_TEMPLATE_DEPTH,
            script_exec_limit: crate::render::DEFAULT_SCRIPT_LIMIT,
            report_as_limit: DEFAULT_REPORT_AS_LIMIT,
            local: false,
            local_templates: BTreeMap::new(),
            modification: None,
            github: GithubConfig::default(),
        }
    }
}

/// The modification endpoint a compiled configuration is sent to.
#[derive(Debug, Clone, PartialEq)]
pub struct ModificationConfig {
    pub endpoint: String,
    pub secret: String,
    pub timeout: Duration,
    pub retries: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl ModificationConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            secret: String::new(),
            timeout: Duration::from_secs(8),
            retries: 3,
            backoff_min: Duration::from_millis(500),
            backoff_max: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GithubConfig {
    pub api_url: String,
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GITHUB_API.to_string(),
            token: None,
        }
    }
}

impl CompilerConfig {
    /// Applies `CONDUIT_GITHUB_TOKEN` and `CONDUIT_MODIFICATION_SECRET`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("CONDUIT_GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let (Ok(secret), Some(modification)) = (
            std::env::var("CONDUIT_MODIFICATION_SECRET"),
            self.modification.as_mut(),
        ) {
            modification.secret = secret;
        }
        self
    }
}

/// Parse compiler settings from KDL text.
pub fn parse_compiler_config(kdl: &str) -> ConfigResult<CompilerConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = CompilerConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "clone-image" => {
                config.clone_image = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("clone-image".to_string()))?;
            }
            "template-depth" => {
                config.template_depth = get_int_arg(node, "template-depth")?;
            }
            "script-exec-limit" => {
                config.script_exec_limit = get_int_arg(node, "script-exec-limit")?;
            }
            "report-as-limit" => {
                config.report_as_limit = get_int_arg(node, "report-as-limit")?;
            }
            "local" => {
                config.local = get_first_bool_arg(node).unwrap_or(true);
            }
            "template" => {
                let name = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("template name".to_string()))?;
                let path = get_string_prop(node, "path").ok_or_else(|| {
                    ConfigError::MissingField(format!("path for template '{}'", name))
                })?;
                if config
                    .local_templates
                    .insert(name.clone(), PathBuf::from(path))
                    .is_some()
                {
                    return Err(ConfigError::Duplicate(format!("template '{}'", name)));
                }
            }
            "modification" => {
                config.modification = Some(parse_modification(node)?);
            }
            "github" => {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "api-url" => {
                                config.github.api_url =
                                    get_first_string_arg(child).unwrap_or_default();
                            }
                            "token" => config.github.token = get_first_string_arg(child),
                            _ => {}
                        }
                    }
                }
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if config.template_depth == 0 {
        return Err(ConfigError::InvalidValue {
            field: "template-depth".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    Ok(config)
}

/// Read compiler settings from a file.
pub fn load_compiler_config(path: &Path) -> ConfigResult<CompilerConfig> {
    let kdl = std::fs::read_to_string(path)?;
    parse_compiler_config(&kdl)
}

fn parse_modification(node: &KdlNode) -> ConfigResult<ModificationConfig> {
    let mut endpoint = None;
    let mut config = ModificationConfig::new("");

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "endpoint" => endpoint = get_first_string_arg(child),
                "secret" => config.secret = get_first_string_arg(child).unwrap_or_default(),
                "timeout-secs" => {
                    config.timeout = Duration::from_secs(get_int_arg(child, "timeout-secs")?)
                }
                "retries" => config.retries = get_int_arg(child, "retries")?,
                "backoff-min-ms" => {
                    config.backoff_min = Duration::from_millis(get_int_arg(child, "backoff-min-ms")?)
                }
                "backoff-max-ms" => {
                    config.backoff_max = Duration::from_millis(get_int_arg(child, "backoff-max-ms")?)
                }
                _ => {}
            }
        }
    }

    config.endpoint =
        endpoint.ok_or_else(|| ConfigError::MissingField("modification endpoint".to_string()))?;
    if config.backoff_min > config.backoff_max {
        return Err(ConfigError::InvalidValue {
            field: "backoff-min-ms".to_string(),
            message: "must not exceed backoff-max-ms".to_string(),
        });
    }
    Ok(config)
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

fn get_int_arg<T: TryFrom<i128>>(node: &KdlNode, field: &str) -> ConfigResult<T> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    };
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?
        .value()
        .as_integer()
        .ok_or_else(|| invalid("expected an integer"))?;
    T::try_from(value).map_err(|_| invalid("out of range"))
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}
