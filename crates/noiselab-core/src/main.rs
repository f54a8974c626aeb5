use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use noiselab_core::{driver, summarize, ExperimentConfig};

/// noiselab: label-noise experiments for sequence tagging.
#[derive(Parser)]
#[command(name = "noiselab", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute the configured run matrix, then summarize the results.
    Run {
        /// Path to the experiment config JSON file.
        #[arg(short, long)]
        config: PathBuf,
        /// GPU id, recorded for parity with external trainers.
        #[arg(short, long, default_value_t = 0)]
        gpu: u32,
    },
    /// Summarize existing results without running anything.
    Summarize {
        /// Path to the experiment config JSON file.
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, gpu } => {
            let config = ExperimentConfig::load(&config)?;
            driver::run_experiment(&config, gpu)?;
            summarize::summarize(&config)?;
        }
        Command::Summarize { config } => {
            let config = ExperimentConfig::load(&config)?;
            summarize::summarize(&config)?;
        }
    }
    Ok(())
}
