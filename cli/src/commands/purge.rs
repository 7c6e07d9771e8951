use crate::output;
use crate::runtime::App;
use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Args;
use ojs_core::traits::SyncLogStore;

#[derive(Args)]
pub struct PurgeArgs {
    #[arg(
        long,
        value_name = "N",
        help = "Delete runs older than N days (default: the configured retention window)"
    )]
    pub older_than_days: Option<i64>,
}

pub async fn run(args: PurgeArgs, app: &App) -> Result<()> {
    let days = args.older_than_days.unwrap_or(app.settings.retention_days);
    let cutoff = Utc::now() - Duration::days(days);
    let purged = app.store.purge_runs_before(cutoff).await?;
    output::success(&format!("Purged {purged} sync run(s) older than {days} days"));
    Ok(())
}
