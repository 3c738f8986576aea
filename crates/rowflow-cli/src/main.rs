mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "rowflow",
    version,
    about = "Run typed extract, transform and load pipelines"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline definition
    Run {
        /// Path to pipeline YAML or JSON file
        pipeline: PathBuf,
        /// Run this many parallel workers, each extracting one shard
        #[arg(long, default_value_t = 1)]
        workers: u32,
        /// Print the run result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a pipeline definition without running it
    Check {
        /// Path to pipeline YAML or JSON file
        pipeline: PathBuf,
    },
    /// List the stage kinds a definition may use
    Stages,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            pipeline,
            workers,
            json,
        } => commands::run::execute(&pipeline, workers, json).await,
        Commands::Check { pipeline } => commands::check::execute(&pipeline),
        Commands::Stages => {
            commands::stages::execute();
            Ok(())
        }
    }
}
