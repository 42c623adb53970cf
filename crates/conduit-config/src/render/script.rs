use conduit_core::document::Build;
use rhai::{Dynamic, Engine, EvalAltResult, Map, Scope};

use super::{RenderContext, Rendered, Renderer};
use crate::RenderError;

/// Renders script templates.
///
/// The script sees a constant `ctx` map with `vars` and `platform`, and may
/// call `platform("name")`. Its final expression is the document: a map
/// shaped like a build, or an array, which is taken as the list of steps.
///
/// Scripts run with an operation budget of `RenderContext::script_limit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptRenderer;

impl Renderer for ScriptRenderer {
    fn render(&self, source: &str, ctx: &RenderContext) -> Result<Rendered, RenderError> {
        let script_err = |message: String| RenderError::Script {
            name: ctx.name.clone(),
            message,
        };

        let platform = ctx.platform();

        let mut engine = Engine::new();
        engine.set_max_operations(ctx.script_limit);
        {
            let platform = platform.clone();
            engine.register_fn("platform", move |name: &str| -> String {
                platform.get(name).cloned().unwrap_or_default()
            });
        }

        let mut script_ctx = Map::new();
        script_ctx.insert(
            "vars".into(),
            rhai::serde::to_dynamic(&ctx.vars).map_err(|e| script_err(e.to_string()))?,
        );
        script_ctx.insert(
            "platform".into(),
            rhai::serde::to_dynamic(&platform).map_err(|e| script_err(e.to_string()))?,
        );

        let mut scope = Scope::new();
        scope.push_constant("ctx", script_ctx);

        let ast = engine
            .compile(source)
            .map_err(|e| script_err(e.to_string()))?;
        let result: Dynamic = engine
            .eval_ast_with_scope(&mut scope, &ast)
            .map_err(|e| match *e {
                EvalAltResult::ErrorTooManyOperations(_) => RenderError::TooManyOperations {
                    name: ctx.name.clone(),
                    limit: ctx.script_limit,
                },
                other => script_err(other.to_string()),
            })?;

        let decode_err = |message: String| RenderError::Decode {
            name: ctx.name.clone(),
            message,
        };
        let mut value: serde_json::Value =
            rhai::serde::from_dynamic(&result).map_err(|e| decode_err(e.to_string()))?;
        if value.is_array() {
            value = serde_json::json!({ "steps": value });
        }
        if !value.is_object() {
            return Err(decode_err(format!(
                "script must evaluate to a map or an array, got {}",
                result.type_name()
            )));
        }

        let build: Build = serde_json::from_value(value).map_err(|e| decode_err(e.to_string()))?;
        Ok(Rendered {
            build,
            warnings: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::ParameterValue;

    fn ctx() -> RenderContext {
        let mut ctx = RenderContext::new("matrix");
        ctx.vars.insert(
            "versions".to_string(),
            ParameterValue::List(vec!["1.21".into(), "1.22".into()]),
        );
        ctx
    }

    #[test]
    fn test_render_steps_array() {
        let source = r#"
let steps = [];
for v in ctx.vars.versions {
    steps.push(#{
        name: `test_${v}`,
        image: `golang:${v}`,
        commands: ["go test ./..."],
    });
}
steps
"#;
        let rendered = ScriptRenderer.render(source, &ctx()).unwrap();
        let names: Vec<_> = rendered.build.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["test_1.21", "test_1.22"]);
        assert_eq!(rendered.build.steps[1].image, "golang:1.22");
    }

    #[test]
    fn test_render_document_map() {
        let source = r#"
#{
    version: "1",
    environment: #{ TEMPLATE: platform("template_name") },
    services: [#{ name: "redis", image: "redis:7" }],
    steps: [#{ name: "ping", image: "redis:7", commands: ["redis-cli -h redis ping"] }],
}
"#;
        let rendered = ScriptRenderer.render(source, &ctx()).unwrap();
        assert_eq!(rendered.build.environment["TEMPLATE"], "matrix");
        assert_eq!(rendered.build.services[0].name, "redis");
    }

    #[test]
    fn test_operation_limit() {
        let mut ctx = ctx();
        ctx.script_limit = 100;
        let err = ScriptRenderer
            .render("let x = 0; loop { x += 1; }", &ctx)
            .unwrap_err();
        assert!(matches!(err, RenderError::TooManyOperations { limit: 100, .. }));
    }

    #[test]
    fn test_non_document_result() {
        let err = ScriptRenderer.render("42", &ctx()).unwrap_err();
        assert!(matches!(err, RenderError::Decode { .. }));
    }

    #[test]
    fn test_script_error() {
        let err = ScriptRenderer.render("let x = ;", &ctx()).unwrap_err();
        assert!(matches!(err, RenderError::Script { .. }));
    }
}
