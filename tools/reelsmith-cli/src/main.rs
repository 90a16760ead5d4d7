//! Reelsmith CLI — Command-line interface for short-clip rendering.
//!
//! Usage:
//!   reelsmith render <REQUEST>    Render a request JSON file ("-" for stdin)
//!   reelsmith plan <REQUEST>      Print the filtergraph and encoder arguments
//!   reelsmith check               Check encoder and storage setup
//!   reelsmith init-config         Write a default config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use reelsmith_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "reelsmith",
    about = "Render vertical short clips from declarative scenes",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the standard location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one request to an MP4
    Render {
        /// Request JSON file, or "-" for stdin
        request: PathBuf,

        /// Job id (defaults to a timestamp)
        #[arg(long)]
        job_id: Option<String>,

        /// Override the working directory
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Also write the outcome JSON to this file
        #[arg(long)]
        output_json: Option<PathBuf>,
    },

    /// Show the render plan without fetching or encoding anything
    Plan {
        /// Request JSON file, or "-" for stdin
        request: PathBuf,

        /// Job id used for file names in the plan
        #[arg(long, default_value = "plan")]
        job_id: String,
    },

    /// Check encoder and storage setup
    Check,

    /// Write the default config to the standard location
    InitConfig {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => Ok(AppConfig::load_from(path)?),
        None => Ok(AppConfig::load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    reelsmith_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Render {
            request,
            job_id,
            work_dir,
            output_json,
        } => commands::render::run(config, request, job_id, work_dir, output_json).await,
        Commands::Plan { request, job_id } => commands::plan::run(config, request, job_id),
        Commands::Check => commands::check::run(config).await,
        Commands::InitConfig { force } => commands::init::run(force),
    }
}
