//! Conduit CLI tool.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{BuildArgs, OutputFormat};

#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "Compile Conduit pipeline configuration", long_about = None)]
struct Cli {
    /// Compiler settings file
    #[arg(long, env = "CONDUIT_CONFIG", default_value = "conduit.kdl")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a configuration into an executable pipeline
    Compile {
        #[command(flatten)]
        build: BuildArgs,
        /// Rewrite ids for a runtime
        #[arg(long, value_enum)]
        runtime: Option<commands::Runtime>,
        #[arg(long, value_enum, default_value = "yaml")]
        output: OutputFormat,
    },
    /// Expand templates without compiling
    Expand {
        #[command(flatten)]
        build: BuildArgs,
        /// Resolve ${VAR} references in every step
        #[arg(long)]
        substitute: bool,
        #[arg(long, value_enum, default_value = "yaml")]
        output: OutputFormat,
    },
    /// Validate a configuration
    Validate {
        #[command(flatten)]
        build: BuildArgs,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = commands::load_config(&cli.config)?;

    match cli.command {
        Commands::Compile {
            build,
            runtime,
            output,
        } => {
            commands::compile::compile(config, &build, runtime, output).await?;
        }
        Commands::Expand {
            build,
            substitute,
            output,
        } => {
            commands::compile::expand(config, &build, substitute, output).await?;
        }
        Commands::Validate { build } => {
            commands::validate::validate(config, &build).await?;
        }
    }

    Ok(())
}
