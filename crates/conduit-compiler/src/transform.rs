//! Build document to executable pipeline.

use conduit_core::BuildIdentity;
use conduit_core::document::{Build, Secret, Service, Step};
use conduit_core::pipeline::{Container, Pipeline, PipelineMetadata, PipelineSecret, PipelineStage};

/// Converts a fully expanded document into a pipeline.
///
/// Steps are numbered from 1 across the whole pipeline in stage order.
/// Services and secret origins are numbered on their own.
pub fn transform(build: &Build, identity: &BuildIdentity, templated: bool) -> Pipeline {
    let mut number = 0;
    let mut next = || {
        number += 1;
        number
    };

    let stages = build
        .stages
        .iter()
        .map(|stage| PipelineStage {
            name: stage.name.clone(),
            needs: stage.needs.clone(),
            independent: stage.independent,
            environment: stage.environment.clone(),
            ruleset: stage.ruleset.clone(),
            steps: stage
                .steps
                .iter()
                .map(|step| {
                    step_container(step, identity.stage_step_id(&stage.name, &step.name), next())
                })
                .collect(),
        })
        .collect();

    let steps = build
        .steps
        .iter()
        .map(|step| step_container(step, identity.step_id(&step.name), next()))
        .collect();

    let services = build
        .services
        .iter()
        .enumerate()
        .map(|(i, service)| service_container(service, identity.service_id(&service.name), i + 1))
        .collect();

    let mut origins = 0;
    let secrets = build
        .secrets
        .iter()
        .map(|secret| {
            let origin = secret.origin.as_ref().map(|origin| {
                origins += 1;
                step_container(origin, identity.secret_id(&secret.name), origins)
            });
            pipeline_secret(secret, origin)
        })
        .collect();

    Pipeline {
        id: identity.pipeline_id(),
        version: build.version.clone(),
        metadata: PipelineMetadata {
            template: templated,
            clone: build.metadata.clone_enabled(),
            render_inline: build.metadata.render_inline,
            environment: build.metadata.environment.clone(),
            auto_cancel: build.metadata.auto_cancel.clone(),
        },
        worker: build.worker.clone(),
        deployment: build.deployment.clone(),
        stages,
        steps,
        services,
        secrets,
        token: None,
    }
}

pub(crate) fn step_container(step: &Step, id: String, number: usize) -> Container {
    Container {
        id,
        number,
        name: step.name.clone(),
        image: step.image.clone(),
        pull: step.pull,
        detach: step.detach,
        privileged: step.privileged,
        commands: step.commands.clone(),
        entrypoint: step.entrypoint.clone(),
        working_dir: step.working_dir.clone(),
        user: step.user.clone(),
        environment: step.environment.clone(),
        parameters: step.parameters.clone(),
        secrets: step.secrets.clone(),
        ports: Vec::new(),
        report_as: step.report_as.clone(),
        ruleset: step.ruleset.clone(),
    }
}

pub(crate) fn service_container(service: &Service, id: String, number: usize) -> Container {
    Container {
        id,
        number,
        name: service.name.clone(),
        image: service.image.clone(),
        pull: service.pull,
        detach: true,
        commands: service.commands.clone(),
        entrypoint: service.entrypoint.clone(),
        user: service.user.clone(),
        environment: service.environment.clone(),
        ports: service.ports.clone(),
        ruleset: service.ruleset.clone(),
        ..Default::default()
    }
}

fn pipeline_secret(secret: &Secret, origin: Option<Container>) -> PipelineSecret {
    PipelineSecret {
        name: secret.name.clone(),
        key: secret.key.clone(),
        engine: secret.engine.clone(),
        kind: secret.kind,
        pull: secret.pull,
        origin,
    }
}
