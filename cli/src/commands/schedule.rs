use crate::output;
use crate::runtime::App;
use anyhow::Result;
use clap::Args;
use sync::SyncScheduler;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args)]
pub struct ScheduleArgs {
    #[arg(long, help = "Run a full sync pass immediately, then keep the schedule")]
    pub run_now: bool,
}

pub async fn run(args: ScheduleArgs, app: App) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut scheduler = SyncScheduler::new(app.store, app.settings, cancel).await?;
    scheduler.start().await?;
    output::success("Scheduler running; press Ctrl-C to stop");

    if args.run_now {
        let report = scheduler.run_now().await?;
        info!(
            attempted = report.journals_attempted(),
            failed = report.journals_failed(),
            "Initial sync pass finished"
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    scheduler.stop().await?;
    Ok(())
}
