use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, Value};

use super::{RenderContext, Rendered, Renderer};
use crate::RenderError;
use crate::parse::decode_yaml;

/// Renders Jinja-style text templates into YAML.
///
/// Variables are available at the top level (`{{ image }}`). Platform values
/// are read with `platform("build_branch")`. Undefined variables are an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRenderer;

impl Renderer for NativeRenderer {
    fn render(&self, source: &str, ctx: &RenderContext) -> Result<Rendered, RenderError> {
        let template_err = |e: Error| RenderError::Template {
            name: ctx.name.clone(),
            message: e.to_string(),
        };

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("toyaml", to_yaml);

        let platform = ctx.platform();
        env.add_function("platform", move |name: String| -> String {
            platform.get(&name).cloned().unwrap_or_default()
        });

        let output = env
            .render_named_str(&ctx.name, source, Value::from_serialize(&ctx.vars))
            .map_err(template_err)?;

        let (build, warnings) =
            decode_yaml(output.as_bytes()).map_err(|e| RenderError::Decode {
                name: ctx.name.clone(),
                message: e.to_string(),
            })?;
        Ok(Rendered { build, warnings })
    }
}

fn to_yaml(value: Value) -> Result<String, Error> {
    serde_yaml::to_string(&value)
        .map(|yaml| yaml.trim_end().to_string())
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}
