use crate::output;
use crate::runtime::App;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use ojs_core::traits::{JournalRegistry, MappingStore, SyncLogStore};
use ojs_core::types::{JournalSelector, JournalTenant, MappingStatus, SyncRun};

#[derive(Args)]
pub struct StatusArgs {
    #[arg(long, help = "Limit to one journal, by code or numeric id")]
    pub journal: Option<JournalSelector>,

    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

pub async fn run(args: StatusArgs, app: &App) -> Result<()> {
    let journals = match &args.journal {
        Some(JournalSelector::Id(id)) => app.store.journal_by_id(*id).await?.into_iter().collect(),
        Some(JournalSelector::Code(code)) => {
            app.store.journal_by_code(code).await?.into_iter().collect()
        }
        None => app.store.all_journals().await?,
    };
    if journals.is_empty() {
        output::warn("no matching journals registered");
        return Ok(());
    }

    let mut entries = Vec::new();
    for journal in journals {
        let mappings = app.store.mappings_for_journal(journal.id).await?;
        let last_run = app
            .store
            .recent_runs(Some(journal.id), 1)
            .await?
            .into_iter()
            .next();
        entries.push(StatusEntry {
            journal,
            total: mappings.len(),
            completed: count(&mappings, MappingStatus::Completed),
            failed: count(&mappings, MappingStatus::Failed),
            conflicts: count(&mappings, MappingStatus::Conflict),
            last_run,
        });
    }

    if args.json {
        let values: Vec<_> = entries.iter().map(StatusEntry::as_json).collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    output::header("Journal status");
    for entry in &entries {
        entry.print();
    }
    Ok(())
}

struct StatusEntry {
    journal: JournalTenant,
    total: usize,
    completed: usize,
    failed: usize,
    conflicts: usize,
    last_run: Option<SyncRun>,
}

impl StatusEntry {
    fn print(&self) {
        println!();
        output::subheader(&format!("{} ({})", self.journal.code, self.journal.name));
        let state = if !self.journal.active {
            "archived".dimmed()
        } else if self.journal.enabled {
            "enabled".green()
        } else {
            "disabled".yellow()
        };
        println!("  state:        {state}, direction {}", self.journal.sync_direction);
        match self.journal.last_synced_at {
            Some(at) => println!("  last synced:  {at}"),
            None => println!("  last synced:  {}", "never".dimmed()),
        }
        println!(
            "  mappings:     {} total, {} completed, {} failed, {} conflicts",
            self.total, self.completed, self.failed, self.conflicts
        );
        match &self.last_run {
            Some(run) => println!(
                "  last run:     {} {} ({}, processed {}, failed {})",
                run.kind, run.status, run.triggered_by, run.processed, run.failed
            ),
            None => println!("  last run:     {}", "none recorded".dimmed()),
        }
        if self.conflicts > 0 {
            output::warn(&format!(
                "{}: {} mapping(s) need manual conflict resolution",
                self.journal.code, self.conflicts
            ));
        }
    }

    fn as_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.journal.code,
            "name": self.journal.name,
            "enabled": self.journal.enabled,
            "active": self.journal.active,
            "direction": self.journal.sync_direction.to_string(),
            "last_synced_at": self.journal.last_synced_at,
            "mappings": {
                "total": self.total,
                "completed": self.completed,
                "failed": self.failed,
                "conflicts": self.conflicts,
            },
            "last_run": self.last_run.as_ref().map(|run| serde_json::json!({
                "id": run.id,
                "kind": run.kind,
                "status": run.status,
                "triggered_by": run.triggered_by,
                "started_at": run.started_at,
                "processed": run.processed,
                "failed": run.failed,
            })),
        })
    }
}

fn count(mappings: &[ojs_core::types::OjsMapping], status: MappingStatus) -> usize {
    mappings.iter().filter(|m| m.status == status).count()
}
