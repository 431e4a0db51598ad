pub mod types;
pub mod config;
pub mod data;
pub mod fetch;
pub mod nodes;
pub mod tally;
pub mod report;
pub mod render;
pub mod pipeline;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count nodes per district, write the statistics and plot them
    Run {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Do not download nodes.json, use the cached copy
        #[arg(long)]
        offline: bool,
        /// Only write the statistics
        #[arg(long)]
        no_plot: bool,
    },
    /// Download nodes.json into the cache and exit
    Fetch {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { config, offline, no_plot } => {
            tracing::info!("Running with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let options = pipeline::RunOptions {
                offline: *offline,
                skip_plots: *no_plot,
            };
            pipeline::run(&app_config, options).await?;

            tracing::info!("Run complete!");
        }
        Commands::Fetch { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            fetch::refresh_cache(&app_config.nodes).await?;
        }
    }

    Ok(())
}
