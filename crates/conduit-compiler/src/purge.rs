//! Rule purging on build documents.
//!
//! Each candidate is wrapped in a one-container pipeline and purged on its
//! own, so documents and pipelines share one set of matching rules.

use conduit_core::document::{Build, Service, Stage, Step};
use conduit_core::pipeline::{Pipeline, PipelineStage};
use conduit_core::rules::RuleData;
use conduit_core::Result;
use tracing::debug;

use crate::transform::{service_container, step_container};

/// Whether `step` survives purging for `data`.
pub(crate) fn step_survives(step: &Step, data: &RuleData) -> Result<bool> {
    let pipeline = Pipeline {
        steps: vec![step_container(step, step.name.clone(), 1)],
        ..Default::default()
    };
    Ok(!pipeline.purge(data)?.steps.is_empty())
}

fn service_survives(service: &Service, data: &RuleData) -> Result<bool> {
    let pipeline = Pipeline {
        services: vec![service_container(service, service.name.clone(), 1)],
        ..Default::default()
    };
    Ok(!pipeline.purge(data)?.services.is_empty())
}

fn stage_survives(stage: &Stage, data: &RuleData) -> Result<bool> {
    // A placeholder step keeps the stage from being dropped for being empty.
    let pipeline = Pipeline {
        stages: vec![PipelineStage {
            name: stage.name.clone(),
            ruleset: stage.ruleset.clone(),
            steps: vec![Default::default()],
            ..Default::default()
        }],
        ..Default::default()
    };
    Ok(!pipeline.purge(data)?.stages.is_empty())
}

fn retain_steps(steps: Vec<Step>, data: &RuleData) -> Result<Vec<Step>> {
    let mut kept = Vec::with_capacity(steps.len());
    for step in steps {
        if step_survives(&step, data)? {
            kept.push(step);
        } else {
            debug!(step = %step.name, "purged");
        }
    }
    Ok(kept)
}

/// Removes every step, stage, service and secret origin whose ruleset does
/// not match `data`. Stages left without steps are removed.
pub fn purge_document(mut build: Build, data: &RuleData) -> Result<Build> {
    build.steps = retain_steps(build.steps, data)?;

    let mut stages = Vec::with_capacity(build.stages.len());
    for mut stage in build.stages {
        if !stage_survives(&stage, data)? {
            debug!(stage = %stage.name, "purged");
            continue;
        }
        stage.steps = retain_steps(stage.steps, data)?;
        if !stage.steps.is_empty() {
            stages.push(stage);
        }
    }
    build.stages = stages;

    let mut services = Vec::with_capacity(build.services.len());
    for service in build.services {
        if service_survives(&service, data)? {
            services.push(service);
        }
    }
    build.services = services;

    let mut secrets = Vec::with_capacity(build.secrets.len());
    for secret in build.secrets {
        let keep = match &secret.origin {
            Some(origin) => step_survives(origin, data)?,
            None => true,
        };
        if keep {
            secrets.push(secret);
        }
    }
    build.secrets = secrets;

    Ok(build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purge_document() {
        let build: Build = serde_yaml::from_str(
            r#"
version: "1"
stages:
  test:
    steps:
      - name: unit
        image: golang
      - name: publish
        image: plugins/docker
        ruleset:
          event: [push]
  nightly:
    ruleset:
      event: schedule
    steps:
      - name: fuzz
        image: golang
services:
  - name: postgres
    image: postgres
    ruleset:
      event: [push]
secrets:
  - name: vault
    origin:
      name: vault
      image: plugins/vault
      ruleset:
        branch: main
"#,
        )
        .unwrap();
        let data = RuleData {
            event: "pull_request".to_string(),
            branch: "main".to_string(),
            ..Default::default()
        };

        let purged = purge_document(build, &data).unwrap();
        assert_eq!(purged.stages.len(), 1);
        let names: Vec<_> = purged.stages[0].steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["unit"]);
        assert!(purged.services.is_empty());
        assert_eq!(purged.secrets.len(), 1);
    }

    #[test]
    fn test_step_survives() {
        let step: Step = serde_yaml::from_str("{name: a, image: b, ruleset: {unless: {branch: main}}}").unwrap();
        let data = RuleData {
            branch: "main".to_string(),
            ..Default::default()
        };
        assert!(!step_survives(&step, &data).unwrap());
    }
}
