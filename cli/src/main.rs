use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;
mod runtime;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let app = runtime::App::connect(&cli.global).await?;

    match cli.command {
        Commands::Sync(args) => commands::sync::run(args, &app).await,
        Commands::Health(args) => commands::health::run(args, &app).await,
        Commands::Status(args) => commands::status::run(args, &app).await,
        Commands::PurgeLogs(args) => commands::purge::run(args, &app).await,
        Commands::Schedule(args) => commands::schedule::run(args, app).await,
    }
}
