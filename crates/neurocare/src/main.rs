//! neurocare - Therapy companion CLI
//!
//! Runs vibration therapy sessions against a simulated device and keeps
//! a local history used for progress and recommendations.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;
mod database;
mod error;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("neurocare=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load()?;
    let user = cli.user.as_deref();

    // Execute command
    match cli.command {
        Commands::Session(cmd) => commands::session::execute(cmd, user, &config).await,
        Commands::History(cmd) => commands::history::execute(cmd, user, &config).await,
        Commands::Recommend { json } => commands::recommend::execute(json, user, &config).await,
        Commands::Progress { json } => commands::progress::execute(json, user, &config).await,
        Commands::Config(cmd) => commands::config::execute(cmd, &config),
        Commands::Version => {
            println!("neurocare {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
