//! The executable pipeline: a fully compiled build, ready for an executor.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::document::{AutoCancel, Deployment, Pull, SecretPull, SecretType, StepSecret, Worker};
use crate::rules::{RuleData, Ruleset};
use crate::{Environment, ParameterValue, Result};

/// A compiled pipeline.
///
/// Holds either `stages` or `steps`. Every container carries a composite `id`
/// and a `number` that is sequential across the whole pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pipeline {
    pub id: String,
    pub version: String,
    pub metadata: PipelineMetadata,
    #[serde(skip_serializing_if = "Worker::is_empty")]
    pub worker: Worker,
    #[serde(skip_serializing_if = "Deployment::is_empty")]
    pub deployment: Deployment,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<PipelineStage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Container>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Container>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<PipelineSecret>,
    /// Installation token for the source provider, when one was resolved.
    #[serde(skip)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineMetadata {
    /// The configuration used templates.
    pub template: bool,
    pub clone: bool,
    pub render_inline: bool,
    pub environment: Vec<String>,
    #[serde(skip_serializing_if = "AutoCancel::is_empty")]
    pub auto_cancel: AutoCancel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineStage {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub independent: bool,
    #[serde(skip_serializing_if = "Environment::is_empty")]
    pub environment: Environment,
    #[serde(skip_serializing_if = "Ruleset::is_empty")]
    pub ruleset: Ruleset,
    pub steps: Vec<Container>,
}

/// A step or service as the executor sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    pub id: String,
    pub number: usize,
    pub name: String,
    pub image: String,
    pub pull: Pull,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub detach: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(skip_serializing_if = "Environment::is_empty")]
    pub environment: Environment,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ParameterValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<StepSecret>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub report_as: String,
    #[serde(skip_serializing_if = "Ruleset::is_empty")]
    pub ruleset: Ruleset,
}

impl Container {
    /// Whether the container should run for the given rule data.
    pub fn should_run(&self, data: &RuleData) -> Result<bool> {
        self.ruleset.matches(data)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSecret {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub engine: String,
    #[serde(rename = "type")]
    pub kind: SecretType,
    pub pull: SecretPull,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Container>,
}

/// Container runtimes an executor may hand the pipeline to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeDriver {
    Docker,
    Kubernetes,
}

impl Pipeline {
    /// Drops every container whose ruleset does not match `data`, and every
    /// stage whose own ruleset does not match.
    ///
    /// Stages left without steps are removed. `needs` that point at removed
    /// stages are kept as they are.
    pub fn purge(&self, data: &RuleData) -> Result<Pipeline> {
        let mut pipeline = self.clone();

        pipeline.steps = retain_matching(pipeline.steps, data)?;

        let mut stages = Vec::with_capacity(pipeline.stages.len());
        for mut stage in pipeline.stages {
            if !stage.ruleset.matches(data)? {
                continue;
            }
            stage.steps = retain_matching(stage.steps, data)?;
            if !stage.steps.is_empty() {
                stages.push(stage);
            }
        }
        pipeline.stages = stages;

        pipeline.services = retain_matching(pipeline.services, data)?;

        let mut secrets = Vec::with_capacity(pipeline.secrets.len());
        for secret in pipeline.secrets {
            let keep = match &secret.origin {
                Some(origin) => origin.should_run(data)?,
                None => true,
            };
            if keep {
                secrets.push(secret);
            }
        }
        pipeline.secrets = secrets;

        Ok(pipeline)
    }

    /// Rewrites every id into a form the runtime accepts.
    pub fn sanitize(&self, driver: RuntimeDriver) -> Pipeline {
        let fix = |id: &str| match driver {
            RuntimeDriver::Docker => id.replace(' ', "-"),
            RuntimeDriver::Kubernetes => id
                .to_lowercase()
                .replace(['_', '.', ' '], "-"),
        };

        let mut pipeline = self.clone();
        pipeline.id = fix(&pipeline.id);
        let containers = pipeline
            .stages
            .iter_mut()
            .flat_map(|stage| stage.steps.iter_mut())
            .chain(pipeline.steps.iter_mut())
            .chain(pipeline.services.iter_mut())
            .chain(pipeline.secrets.iter_mut().filter_map(|s| s.origin.as_mut()));
        for container in containers {
            container.id = fix(&container.id);
        }
        pipeline
    }

    /// All step containers, stage by stage or from the flat list.
    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.stages
            .iter()
            .flat_map(|stage| stage.steps.iter())
            .chain(self.steps.iter())
    }
}

fn retain_matching(containers: Vec<Container>, data: &RuleData) -> Result<Vec<Container>> {
    let mut kept = Vec::with_capacity(containers.len());
    for container in containers {
        if container.should_run(data)? {
            kept.push(container);
        }
    }
    Ok(kept)
}
