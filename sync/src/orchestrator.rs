//! Fan-out across journals.
//!
//! One orchestrated pass walks every enabled, active journal with a
//! bounded number of concurrent workers. Failure isolation is the whole
//! point: one journal's bad credentials, broken endpoint, or even a
//! panic inside its task must never touch another journal's pass.

use crate::error::{SyncError, SyncResult};
use crate::keyed_lock::KeyedLocks;
use crate::report::{OrchestratorReport, SyncSummary, TenantOutcome, TenantReport};
use crate::settings::SyncSettings;
use crate::worker::SyncWorker;
use chrono::Utc;
use ojs_core::SyncStore;
use ojs_core::types::{JournalSelector, JournalTenant, SyncKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct Orchestrator {
    store: Arc<dyn SyncStore>,
    settings: SyncSettings,
    /// Shared with every worker so author resolution is serialized per
    /// email across journals, not just within one.
    email_locks: Arc<KeyedLocks>,
    /// One guard per journal id; a manual trigger waits for an in-flight
    /// scheduled pass on the same journal instead of overlapping it.
    pass_guards: Arc<KeyedLocks>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn SyncStore>, settings: SyncSettings) -> Self {
        Self {
            store,
            settings,
            email_locks: Arc::new(KeyedLocks::new()),
            pass_guards: Arc::new(KeyedLocks::new()),
        }
    }

    /// Full pass over every enabled journal, at most
    /// `journal_concurrency` in flight at once. Always returns a report;
    /// per-journal problems land in it as `TenantOutcome::Failed`.
    pub async fn sync_all_journals(
        &self,
        triggered_by: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<OrchestratorReport> {
        let started_at = Utc::now();
        let journals = self.store.enabled_journals().await?;
        info!(journals = journals.len(), triggered_by, "Starting orchestrated sync pass");

        let semaphore = Arc::new(Semaphore::new(self.settings.journal_concurrency.max(1)));
        let mut tasks: JoinSet<TenantOutcome> = JoinSet::new();
        let mut codes: HashMap<tokio::task::Id, String> = HashMap::new();

        for journal in journals {
            let code = journal.code.clone();
            let store = self.store.clone();
            let settings = self.settings.clone();
            let email_locks = self.email_locks.clone();
            let pass_guards = self.pass_guards.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let triggered_by = triggered_by.to_string();

            let handle = tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TenantOutcome::Failed {
                        journal_code: journal.code,
                        reason: "orchestrator shut down before the pass started".to_string(),
                    };
                };
                let _guard = pass_guards.acquire(&pass_key(journal.id)).await;
                run_tenant(store, settings, email_locks, journal, &triggered_by, &cancel).await
            });
            codes.insert(handle.id(), code);
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    codes.remove(&id);
                    outcomes.push(outcome);
                }
                Err(join_err) => {
                    let journal_code = codes
                        .remove(&join_err.id())
                        .unwrap_or_else(|| "unknown".to_string());
                    error!(journal = %journal_code, error = %join_err, "Sync task aborted");
                    outcomes.push(TenantOutcome::Failed {
                        journal_code,
                        reason: format!("sync task aborted: {join_err}"),
                    });
                }
            }
        }
        outcomes.sort_by(|a, b| a.journal_code().cmp(b.journal_code()));

        let report = OrchestratorReport {
            started_at,
            completed_at: Utc::now(),
            outcomes,
        };
        info!(
            attempted = report.journals_attempted(),
            failed = report.journals_failed(),
            processed = report.total_processed(),
            "Orchestrated sync pass finished"
        );
        Ok(report)
    }

    /// Targeted pass over one journal, addressed by id or code. Unlike
    /// the full pass this propagates errors, so a CLI caller sees them.
    pub async fn sync_journal(
        &self,
        selector: &JournalSelector,
        kind: SyncKind,
        triggered_by: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<TenantReport> {
        let journal = match selector {
            JournalSelector::Id(id) => self.store.journal_by_id(*id).await?,
            JournalSelector::Code(code) => self.store.journal_by_code(code).await?,
        }
        .ok_or_else(|| SyncError::JournalNotFound(selector.to_string()))?;

        let _guard = self.pass_guards.acquire(&pass_key(journal.id)).await;
        let worker = SyncWorker::new(
            self.store.clone(),
            self.settings.clone(),
            self.email_locks.clone(),
            journal,
            triggered_by,
        )?;

        if kind == SyncKind::All {
            worker.sync_all(cancel).await
        } else {
            let journal = worker.journal();
            let mut report = TenantReport {
                journal_id: journal.id,
                journal_code: journal.code.clone(),
                summaries: Vec::new(),
            };
            let summary: SyncSummary = worker.sync_kind(kind, cancel).await?;
            report.summaries.push(summary);
            Ok(report)
        }
    }
}

fn pass_key(journal_id: i64) -> String {
    format!("journal:{journal_id}")
}

async fn run_tenant(
    store: Arc<dyn SyncStore>,
    settings: SyncSettings,
    email_locks: Arc<KeyedLocks>,
    journal: JournalTenant,
    triggered_by: &str,
    cancel: &CancellationToken,
) -> TenantOutcome {
    let code = journal.code.clone();
    let worker = match SyncWorker::new(store, settings, email_locks, journal, triggered_by) {
        Ok(worker) => worker,
        Err(err) => {
            return TenantOutcome::Failed {
                journal_code: code,
                reason: err.describe(),
            };
        }
    };
    match worker.sync_all(cancel).await {
        Ok(report) => TenantOutcome::Completed { report },
        Err(err) => TenantOutcome::Failed {
            journal_code: code,
            reason: err.describe(),
        },
    }
}
