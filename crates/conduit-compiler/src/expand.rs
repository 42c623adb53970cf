//! Template expansion.
//!
//! Step templates replace the step that references them with the steps they
//! render. Inline templates (`metadata.render_inline`) are rendered with their
//! own variables and merged into the document. Both recurse into rendered
//! documents that reference further templates, spending one unit of depth per
//! level, so self-referencing templates fail instead of looping.

use std::collections::HashSet;

use async_recursion::async_recursion;
use conduit_config::parse::decode_yaml;
use conduit_config::render::{RenderContext, renderer_for};
use conduit_core::document::{Build, Step, Template};
use conduit_core::rules::RuleData;
use conduit_core::{Environment, ParameterValue};
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::environment::EnvironmentContext;
use crate::purge::step_survives;
use crate::resolve::Resolver;
use crate::{CompileError, Result, ValidationErrors};

pub(crate) struct Expander<'a> {
    pub resolver: &'a Resolver,
    pub env: &'a EnvironmentContext,
    pub rule_data: Option<&'a RuleData>,
    pub max_depth: usize,
    pub script_limit: u64,
    pub warnings: Vec<String>,
    /// Set once any template has been rendered.
    pub templated: bool,
}

impl<'a> Expander<'a> {
    pub fn new(
        resolver: &'a Resolver,
        env: &'a EnvironmentContext,
        rule_data: Option<&'a RuleData>,
        max_depth: usize,
        script_limit: u64,
    ) -> Self {
        Self {
            resolver,
            env,
            rule_data,
            max_depth,
            script_limit,
            warnings: Vec::new(),
            templated: false,
        }
    }

    /// Expands every step template in `build`.
    #[async_recursion]
    pub async fn expand_steps(&mut self, mut build: Build, depth: usize) -> Result<Build> {
        if build.metadata.render_inline && build.all_steps().any(|s| s.template.is_some()) {
            let mut errors = ValidationErrors::new();
            errors.push("step templates cannot be used with render_inline");
            return Err(errors.into());
        }

        let templates = build.templates.clone();
        let mixed = is_mixed(&build);

        let mut stages = std::mem::take(&mut build.stages);
        for stage in &mut stages {
            if !stage.has_templates() {
                continue;
            }
            let steps = std::mem::take(&mut stage.steps);
            stage.steps = self
                .expand_list(steps, &mut build, &templates, Some(&stage.environment), depth)
                .await?;
        }
        build.stages = stages;

        let steps = std::mem::take(&mut build.steps);
        build.steps = self
            .expand_list(steps, &mut build, &templates, None, depth)
            .await?;

        if !mixed && is_mixed(&build) {
            return Err(CompileError::MixedContent(
                "templates produced both stages and steps".to_string(),
            ));
        }
        Ok(build)
    }

    async fn expand_list(
        &mut self,
        steps: Vec<Step>,
        build: &mut Build,
        templates: &[Template],
        stage: Option<&Environment>,
        depth: usize,
    ) -> Result<Vec<Step>> {
        let mut expanded = Vec::with_capacity(steps.len());

        for step in steps {
            let Some(reference) = step.template.clone() else {
                expanded.push(step);
                continue;
            };

            if let Some(data) = self.rule_data {
                if !step_survives(&step, data)? {
                    debug!(step = %step.name, template = %reference.name, "skipping template for purged step");
                    continue;
                }
            }

            if depth == 0 {
                return Err(CompileError::TemplateDepthExceeded { max: self.max_depth });
            }

            let template = templates
                .iter()
                .find(|t| t.name == reference.name)
                .ok_or_else(|| {
                    CompileError::template_source(&reference.name, "template is not declared")
                })?;

            let environment = self.env.step_environment(build, stage, &step);
            let mut rendered = self
                .render(template, &reference.vars, environment)
                .await?;

            if rendered.metadata.render_inline && !build.metadata.render_inline {
                let mut errors = ValidationErrors::new();
                errors.push(format!(
                    "template {}: render_inline is not enabled for the calling configuration",
                    template.name
                ));
                return Err(errors.into());
            }
            if rendered.is_empty() {
                return Err(CompileError::MixedContent(format!(
                    "template {} produced no secrets, services, stages or steps",
                    template.name
                )));
            }
            if !rendered.stages.is_empty() {
                return Err(CompileError::MixedContent(format!(
                    "step template {} cannot produce stages",
                    template.name
                )));
            }

            if rendered.steps.iter().any(|s| s.template.is_some()) {
                rendered = self.expand_steps(rendered, depth - 1).await?;
            }

            merge(build, &mut rendered);
            for mut produced in rendered.steps {
                produced.name = format!("{}_{}", step.name, produced.name);
                expanded.push(produced);
            }
        }

        Ok(expanded)
    }

    /// Renders every inline template of `build` into it.
    #[async_recursion]
    pub async fn render_inline(&mut self, mut build: Build, depth: usize) -> Result<Build> {
        if !build.metadata.render_inline || build.templates.is_empty() {
            return Ok(build);
        }

        let mixed = is_mixed(&build);
        for template in build.templates.clone() {
            if depth == 0 {
                return Err(CompileError::TemplateDepthExceeded { max: self.max_depth });
            }

            let environment = self.env.step_environment(&build, None, &Step::default());
            let mut rendered = self
                .render(&template, &template.vars, environment)
                .await?;

            if rendered.metadata.render_inline && !rendered.templates.is_empty() {
                rendered = self.render_inline(rendered, depth - 1).await?;
            }
            if rendered.is_empty() {
                return Err(CompileError::MixedContent(format!(
                    "template {} produced no secrets, services, stages or steps",
                    template.name
                )));
            }

            let prefix = format!("{}_", template.name);
            let local: HashSet<String> = rendered.stages.iter().map(|s| s.name.clone()).collect();
            for mut stage in std::mem::take(&mut rendered.stages) {
                stage.name = format!("{prefix}{}", stage.name);
                for need in &mut stage.needs {
                    if local.contains(need) {
                        *need = format!("{prefix}{need}");
                    }
                }
                build.stages.push(stage);
            }
            for mut step in std::mem::take(&mut rendered.steps) {
                step.name = format!("{prefix}{}", step.name);
                build.steps.push(step);
            }
            merge(&mut build, &mut rendered);
        }

        if !mixed && is_mixed(&build) {
            return Err(CompileError::MixedContent(
                "inline templates produced both stages and steps".to_string(),
            ));
        }
        Ok(build)
    }

    async fn render(
        &mut self,
        template: &Template,
        vars: &IndexMap<String, ParameterValue>,
        environment: Environment,
    ) -> Result<Build> {
        let bytes = self.resolver.fetch(template).await?;
        let source = String::from_utf8(bytes)
            .map_err(|e| CompileError::template_source(&template.name, e))?;

        info!(template = %template.name, format = %template.format, "rendering template");
        let (build, warnings) = match renderer_for(template.format) {
            None => decode_yaml(source.as_bytes())?,
            Some(renderer) => {
                let ctx = RenderContext {
                    name: template.name.clone(),
                    vars: vars.clone(),
                    environment,
                    script_limit: self.script_limit,
                };
                let rendered = renderer.render(&source, &ctx)?;
                (rendered.build, rendered.warnings)
            }
        };

        self.templated = true;
        self.warnings.extend(
            warnings
                .into_iter()
                .map(|w| format!("template {}: {w}", template.name)),
        );
        Ok(build)
    }
}

/// Stages and steps side by side. Validation reports this when the author
/// wrote it; expansion only fails when a template caused it.
fn is_mixed(build: &Build) -> bool {
    !build.stages.is_empty() && !build.steps.is_empty()
}

/// Merges the secrets, services and environment of a rendered template into
/// `build`. Entries already in `build` win; origin secrets are always added.
fn merge(build: &mut Build, rendered: &mut Build) {
    for secret in std::mem::take(&mut rendered.secrets) {
        if secret.is_origin() || !build.secrets.iter().any(|s| s.name == secret.name) {
            build.secrets.push(secret);
        }
    }
    for service in std::mem::take(&mut rendered.services) {
        if !build.services.iter().any(|s| s.name == service.name) {
            build.services.push(service);
        }
    }
    for (key, value) in std::mem::take(&mut rendered.environment) {
        build.environment.entry(key).or_insert(value);
    }
}
