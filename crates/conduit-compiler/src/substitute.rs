//! Step-level `${VAR}` substitution.

use conduit_config::variables::{references, substitute};
use conduit_core::Environment;
use conduit_core::document::Step;
use serde_yaml::Value;
use tracing::debug;

use crate::{CompileError, Result};

/// Substitutes `${VAR}` in every string of `step` from `env`.
///
/// The step is serialized, rewritten and decoded again, so the result fully
/// replaces the original.
pub fn substitute_step(step: &Step, env: &Environment) -> Result<Step> {
    let err = |e: serde_yaml::Error| CompileError::Substitution {
        step: step.name.clone(),
        message: e.to_string(),
    };

    let mut value = serde_yaml::to_value(step).map_err(err)?;
    let mut unresolved = Vec::new();
    rewrite(&mut value, env, &mut unresolved);
    if !unresolved.is_empty() {
        debug!(step = %step.name, ?unresolved, "left unresolved references in place");
    }
    serde_yaml::from_value(value).map_err(err)
}

fn rewrite(value: &mut Value, env: &Environment, unresolved: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let replaced = substitute(s, env);
            unresolved.extend(references(&replaced));
            *s = replaced;
        }
        Value::Sequence(items) => {
            for item in items {
                rewrite(item, env, unresolved);
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                rewrite(item, env, unresolved);
            }
        }
        Value::Tagged(tagged) => rewrite(&mut tagged.value, env, unresolved),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> Step {
        serde_yaml::from_str(
            r#"
name: publish
image: plugins/docker:${TAG}
commands:
  - echo ${BUILD_COMMIT}
  - echo $${NOT_ME}
  - echo ${UNKNOWN}
parameters:
  repo: ${REPO}
environment:
  TAG: "1.2"
  BUILD_COMMIT: abc123
  REPO: octo/hello
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_substitute_step() {
        let step = step();
        let out = substitute_step(&step, &step.environment).unwrap();
        assert_eq!(out.image, "plugins/docker:1.2");
        assert_eq!(
            out.commands,
            vec!["echo abc123", "echo ${NOT_ME}", "echo ${UNKNOWN}"]
        );
        assert_eq!(out.parameters["repo"].to_display_string(), "octo/hello");
    }

    #[test]
    fn test_substitution_is_idempotent_when_resolved() {
        let mut step = step();
        step.commands.retain(|c| c == "echo ${BUILD_COMMIT}");
        let once = substitute_step(&step, &step.environment).unwrap();
        let twice = substitute_step(&once, &step.environment).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_multiline_values() {
        let mut step = step();
        step.environment
            .insert("BUILD_COMMIT".to_string(), "a\nb".to_string());
        let out = substitute_step(&step, &step.environment).unwrap();
        assert_eq!(out.commands[0], r#"echo "a\nb""#);
    }
}
