use crate::output;
use crate::runtime::App;
use anyhow::{Result, bail};
use clap::Args;
use sync::HealthMonitor;

#[derive(Args)]
pub struct HealthArgs {
    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

pub async fn run(args: HealthArgs, app: &App) -> Result<()> {
    let monitor = HealthMonitor::new(app.store.clone(), app.settings.clone());
    let issues = monitor.check_health().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
    } else if issues.is_empty() {
        output::success("All journals healthy");
    } else {
        output::header("Health issues");
        for issue in &issues {
            println!("  {}: {}", issue.journal_code, issue.description);
        }
    }

    if !issues.is_empty() {
        bail!("{} health issue(s) found", issues.len());
    }
    Ok(())
}
