//! Structural validation.
//!
//! Both checks collect every problem they find instead of stopping at the
//! first one.

use std::collections::{HashMap, HashSet};

use conduit_core::document::{Build, Step};
use conduit_core::is_reserved_name;
use conduit_core::pipeline::{Pipeline, PipelineStage};

use crate::ValidationErrors;

/// Validates an expanded build document.
pub fn validate_document(build: &Build, report_as_limit: usize) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if build.version.is_empty() {
        errors.push("no version provided");
    }
    let inline_only = build.metadata.render_inline && !build.templates.is_empty();
    if build.stages.is_empty() && build.steps.is_empty() && !inline_only {
        errors.push("no stages, steps or templates provided");
    }
    if !build.stages.is_empty() && !build.steps.is_empty() {
        errors.push("stages and steps cannot both be provided");
    }
    if build.metadata.render_inline && build.all_steps().any(|step| step.template.is_some()) {
        errors.push("step templates cannot be used with render_inline");
    }

    let mut services = HashSet::new();
    for service in &build.services {
        if service.name.is_empty() {
            errors.push("service: no name provided");
        } else if !services.insert(service.name.as_str()) {
            errors.push(format!("service {}: name already used", service.name));
        }
        if service.image.is_empty() {
            errors.push(format!("service {}: no image provided", service.name));
        }
    }

    let mut stages = HashSet::new();
    for stage in &build.stages {
        if stage.name.is_empty() {
            errors.push("stage: no name provided");
        } else if !stages.insert(stage.name.as_str()) {
            errors.push(format!("stage {}: name already used", stage.name));
        }
        if is_reserved_name(&stage.name) {
            errors.push(format!("stage {}: name is reserved", stage.name));
        }
        if stage.needs.iter().any(|need| need == &stage.name) {
            errors.push(format!("stage {}: needs itself", stage.name));
        }
        validate_steps(&stage.steps, Some(&stage.name), &mut errors);
    }
    validate_steps(&build.steps, None, &mut errors);

    validate_report_as(build, report_as_limit, &mut errors);

    errors.into_result()
}

fn validate_steps(steps: &[Step], stage: Option<&str>, errors: &mut ValidationErrors) {
    let label = |step: &Step| match stage {
        Some(stage) => format!("step {}.{}", stage, step.name),
        None => format!("step {}", step.name),
    };

    let mut names = HashSet::new();
    for step in steps {
        if step.name.is_empty() {
            errors.push(format!("{}: no name provided", label(step)));
        }
        if step.is_reserved() {
            continue;
        }
        if !step.name.is_empty() && !names.insert(step.name.as_str()) {
            errors.push(format!("{}: name already used", label(step)));
        }
        if step.image.is_empty() && step.template.is_none() {
            errors.push(format!("{}: no image provided", label(step)));
        }
        let does_something = !step.commands.is_empty()
            || !step.environment.is_empty()
            || !step.parameters.is_empty()
            || !step.secrets.is_empty()
            || step.template.is_some()
            || step.detach;
        if !does_something {
            errors.push(format!(
                "{}: no commands, environment, parameters, secrets or template provided",
                label(step)
            ));
        }
    }
}

fn validate_report_as(build: &Build, limit: usize, errors: &mut ValidationErrors) {
    let mut claimed: HashMap<&str, &str> = HashMap::new();
    for step in build.all_steps() {
        if step.report_as.is_empty() {
            continue;
        }
        if let Some(first) = claimed.insert(step.report_as.as_str(), step.name.as_str()) {
            errors.push(format!(
                "step {}: report_as {:?} already used by step {}",
                step.name, step.report_as, first
            ));
        }
    }

    let count = build.all_steps().filter(|step| !step.report_as.is_empty()).count();
    if count > limit {
        errors.push(format!(
            "report_as is set on {count} steps, the maximum is {limit}"
        ));
    }
}

/// Validates a transformed pipeline.
pub fn validate_pipeline(pipeline: &Pipeline) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let containers = pipeline
        .containers()
        .map(|c| ("step", c))
        .chain(pipeline.services.iter().map(|c| ("service", c)))
        .chain(
            pipeline
                .secrets
                .iter()
                .filter_map(|s| s.origin.as_ref())
                .map(|c| ("secret origin", c)),
        );
    for (kind, container) in containers {
        if container.name.is_empty() {
            errors.push(format!("{kind} {}: no name provided", container.id));
        }
        if container.image.is_empty() {
            errors.push(format!("{kind} {}: no image provided", container.name));
        }
    }

    let names: HashSet<&str> = pipeline.stages.iter().map(|s| s.name.as_str()).collect();
    for stage in &pipeline.stages {
        for need in &stage.needs {
            if need == &stage.name {
                errors.push(format!("stage {}: needs itself", stage.name));
            } else if !names.contains(need.as_str()) {
                errors.push(format!("stage {}: needs unknown stage {}", stage.name, need));
            }
        }
    }
    if let Err(cycle) = detect_cycle(&pipeline.stages) {
        errors.push(format!("stage dependency cycle: {cycle}"));
    }

    errors.into_result()
}

/// Detect cycles in the stage dependency graph using DFS.
///
/// Self-dependencies are reported on their own and skipped here.
fn detect_cycle(stages: &[PipelineStage]) -> Result<(), String> {
    let mut visited = HashMap::new();
    let mut rec_stack = HashMap::new();

    let stage_map: HashMap<&str, &PipelineStage> =
        stages.iter().map(|s| (s.name.as_str(), s)).collect();

    for stage in stages {
        if !visited.contains_key(stage.name.as_str()) {
            if let Some(cycle) =
                dfs_detect_cycle(&stage.name, &stage_map, &mut visited, &mut rec_stack)
            {
                return Err(cycle);
            }
        }
    }
    Ok(())
}

fn dfs_detect_cycle<'a>(
    node: &'a str,
    stage_map: &HashMap<&'a str, &'a PipelineStage>,
    visited: &mut HashMap<&'a str, bool>,
    rec_stack: &mut HashMap<&'a str, bool>,
) -> Option<String> {
    visited.insert(node, true);
    rec_stack.insert(node, true);

    if let Some(stage) = stage_map.get(node) {
        for dep in stage.needs.iter().filter(|dep| dep.as_str() != node) {
            let dep_str: &'a str = dep.as_str();
            if !visited.contains_key(dep_str) {
                if let Some(cycle) = dfs_detect_cycle(dep_str, stage_map, visited, rec_stack) {
                    return Some(cycle);
                }
            } else if rec_stack.get(dep_str).copied().unwrap_or(false) {
                return Some(format!("{} -> {}", node, dep));
            }
        }
    }

    rec_stack.insert(node, false);
    None
}
