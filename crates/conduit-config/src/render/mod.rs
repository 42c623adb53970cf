//! Template rendering.
//!
//! A renderer turns template source plus variables into a build document.
//! There is one renderer per templated [`Format`].

mod native;
mod script;

pub use native::NativeRenderer;
pub use script::ScriptRenderer;

use conduit_core::document::{Build, Format};
use conduit_core::{ENV_PREFIX, Environment, ParameterValue};
use indexmap::IndexMap;
use std::collections::BTreeMap;

use crate::RenderError;

/// Default cap on the operations a script template may run.
pub const DEFAULT_SCRIPT_LIMIT: u64 = 7500;

/// Everything a template can see while rendering.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Template name, used in errors and exposed as `template_name`.
    pub name: String,
    pub vars: IndexMap<String, ParameterValue>,
    /// The calling step's environment.
    pub environment: Environment,
    pub script_limit: u64,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            vars: IndexMap::new(),
            environment: Environment::new(),
            script_limit: DEFAULT_SCRIPT_LIMIT,
        }
    }
}

impl RenderContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Platform values exposed to templates.
    ///
    /// Every `CONDUIT_` variable is exposed lowercased with the prefix
    /// stripped, so `CONDUIT_BUILD_BRANCH` becomes `build_branch`.
    pub fn platform(&self) -> BTreeMap<String, String> {
        let mut platform: BTreeMap<String, String> = self
            .environment
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .map(|name| (name.to_lowercase(), value.clone()))
            })
            .collect();
        platform.insert("template_name".to_string(), self.name.clone());
        platform
    }
}

/// A rendered template.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub build: Build,
    pub warnings: Vec<String>,
}

pub trait Renderer: Send + Sync {
    fn render(&self, source: &str, ctx: &RenderContext) -> Result<Rendered, RenderError>;
}

/// The renderer for a format, or `None` for plain YAML.
pub fn renderer_for(format: Format) -> Option<&'static dyn Renderer> {
    match format {
        Format::Yaml => None,
        Format::Jinja => Some(&NativeRenderer),
        Format::Rhai => Some(&ScriptRenderer),
    }
}
