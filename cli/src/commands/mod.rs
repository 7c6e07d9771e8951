pub mod health;
pub mod purge;
pub mod schedule;
pub mod status;
pub mod sync;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "colophon",
    author,
    version,
    about = "Colophon - multi-tenant OJS synchronization",
    long_about = "Keeps the local journal database aligned with each journal's remote OJS \
                  instance.\n\nThe database is addressed via --database-url or the DATABASE_URL \
                  environment variable; engine tunables come from an optional TOML file."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    #[arg(
        long,
        env = "DATABASE_URL",
        global = true,
        help = "PostgreSQL connection URL"
    )]
    pub database_url: Option<String>,

    #[arg(long, global = true, help = "Path to a TOML settings file")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run a sync pass, over all journals or one")]
    Sync(sync::SyncArgs),

    #[command(about = "Check connectivity, staleness and failure rate per journal")]
    Health(health::HealthArgs),

    #[command(about = "Show per-journal sync state and recent runs")]
    Status(status::StatusArgs),

    #[command(name = "purge-logs", about = "Delete sync run rows older than the retention window")]
    PurgeLogs(purge::PurgeArgs),

    #[command(about = "Run the scheduler daemon (hourly sync, daily health check, weekly purge)")]
    Schedule(schedule::ScheduleArgs),
}
