//! CLI command implementations.

pub mod compile;
pub mod validate;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use conduit_compiler::Compiler;
use conduit_config::Source;
use conduit_config::parse::parse_format;
use conduit_config::system::{CompilerConfig, load_compiler_config};
use conduit_core::pipeline::RuntimeDriver;
use conduit_core::records::{BuildRecord, PlatformMetadata, Repo};
use conduit_core::rules::RuleData;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The configuration and the build it is compiled for.
#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Path to the configuration file
    #[arg(default_value = ".conduit.yml")]
    pub path: PathBuf,

    /// Configuration dialect (yaml, jinja, rhai)
    #[arg(long)]
    pub format: Option<String>,

    /// Compile for a local run: local identity, templates from disk
    #[arg(long)]
    pub local: bool,

    /// Local template as NAME=PATH
    #[arg(long = "template", value_parser = parse_template)]
    pub templates: Vec<(String, PathBuf)>,

    #[arg(long)]
    pub org: Option<String>,
    #[arg(long)]
    pub repo: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub number: i64,

    /// Build event; rules are only evaluated when one is given
    #[arg(long)]
    pub event: Option<String>,
    #[arg(long, default_value = "")]
    pub action: String,
    #[arg(long, default_value = "main")]
    pub branch: String,
    #[arg(long = "ref", default_value = "")]
    pub reference: String,
    #[arg(long, default_value = "")]
    pub commit: String,
    #[arg(long, default_value = "")]
    pub sender: String,
    /// Deployment target
    #[arg(long, default_value = "")]
    pub target: String,
    /// Changed file, for path rules
    #[arg(long = "file")]
    pub files: Vec<String>,
    #[arg(long = "label")]
    pub labels: Vec<String>,

    /// Source provider token
    #[arg(long, env = "CONDUIT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

fn parse_template(s: &str) -> std::result::Result<(String, PathBuf), String> {
    s.split_once('=')
        .map(|(name, path)| (name.to_string(), PathBuf::from(path)))
        .ok_or_else(|| format!("expected NAME=PATH, got {s:?}"))
}

impl BuildArgs {
    fn build_record(&self) -> BuildRecord {
        BuildRecord {
            number: self.number,
            event: self.event.clone().unwrap_or_default(),
            action: self.action.clone(),
            branch: self.branch.clone(),
            reference: self.reference.clone(),
            commit: self.commit.clone(),
            sender: self.sender.clone(),
            deploy: self.target.clone(),
            ..Default::default()
        }
    }

    fn repo_record(&self) -> Option<Repo> {
        let (org, name) = (self.org.clone()?, self.repo.clone()?);
        Some(Repo {
            full_name: format!("{org}/{name}"),
            org,
            name,
            ..Default::default()
        })
    }

    /// Rule data for the build, when an event was given.
    pub fn rule_data(&self) -> Option<RuleData> {
        self.event.as_ref()?;
        Some(RuleData::from_records(
            &self.build_record(),
            &self.repo_record().unwrap_or_default(),
            &PlatformMetadata::default(),
            &self.files,
            &self.labels,
        ))
    }

    pub fn source(&self) -> Source {
        Source::Path(self.path.clone())
    }

    pub fn compiler(&self, config: CompilerConfig) -> Result<Compiler> {
        let mut compiler = Compiler::new(config)
            .with_local(self.local)
            .with_files(self.files.clone())
            .with_labels(self.labels.clone());

        if !self.templates.is_empty() {
            let templates: BTreeMap<String, PathBuf> = self.templates.iter().cloned().collect();
            compiler = compiler.with_local_templates(templates);
        }
        if let Some(format) = &self.format {
            compiler = compiler.with_format(parse_format(format)?);
        }
        if self.event.is_some() {
            compiler = compiler.with_build(self.build_record());
        }
        if let Some(repo) = self.repo_record() {
            compiler = compiler.with_repo(repo);
        }
        if let Some(token) = &self.token {
            compiler = compiler.with_token(token.clone());
        }
        Ok(compiler)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Runtime {
    Docker,
    Kubernetes,
}

impl From<Runtime> for RuntimeDriver {
    fn from(runtime: Runtime) -> Self {
        match runtime {
            Runtime::Docker => RuntimeDriver::Docker,
            Runtime::Kubernetes => RuntimeDriver::Kubernetes,
        }
    }
}

/// Loads compiler settings, falling back to defaults when the file is absent.
pub fn load_config(path: &Path) -> Result<CompilerConfig> {
    let config = if path.exists() {
        load_compiler_config(path)
            .with_context(|| format!("Failed to load compiler settings: {}", path.display()))?
    } else {
        debug!(path = %path.display(), "no compiler settings, using defaults");
        CompilerConfig::default()
    };
    Ok(config.with_env_overrides())
}

pub fn print<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let out = match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
    };
    println!("{}", out.trim_end());
    Ok(())
}

pub fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}
