use anyhow::Result;
use conduit_compiler::CompileError;
use conduit_config::system::CompilerConfig;

use super::{BuildArgs, print_warnings};

pub async fn validate(config: CompilerConfig, args: &BuildArgs) -> Result<()> {
    match args.compiler(config)?.compile(args.source()).await {
        Ok(compiled) => {
            print_warnings(&compiled.warnings);
            println!("Configuration is valid");
            Ok(())
        }
        Err(CompileError::Validation(errors)) => {
            println!("Configuration error: {}", errors);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
