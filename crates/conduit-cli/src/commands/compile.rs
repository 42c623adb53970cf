//! Compile and expand commands.

use anyhow::{Context, Result};
use conduit_config::system::CompilerConfig;
use tracing::info;

use super::{BuildArgs, OutputFormat, Runtime, print, print_warnings};

pub async fn compile(
    config: CompilerConfig,
    args: &BuildArgs,
    runtime: Option<Runtime>,
    output: OutputFormat,
) -> Result<()> {
    let compiled = args
        .compiler(config)?
        .compile(args.source())
        .await
        .with_context(|| format!("Failed to compile {}", args.path.display()))?;

    print_warnings(&compiled.warnings);
    info!(digest = %compiled.summary.digest, "compiled configuration");

    let pipeline = match runtime {
        Some(runtime) => compiled.pipeline.sanitize(runtime.into()),
        None => compiled.pipeline,
    };
    print(&pipeline, output)
}

pub async fn expand(
    config: CompilerConfig,
    args: &BuildArgs,
    substitute: bool,
    output: OutputFormat,
) -> Result<()> {
    let rule_data = args.rule_data();
    let expanded = args
        .compiler(config)?
        .compile_lite(args.source(), rule_data.as_ref(), substitute)
        .await
        .with_context(|| format!("Failed to expand {}", args.path.display()))?;

    print_warnings(&expanded.warnings);
    print(&expanded.document, output)
}
