//! Read-only health survey over the journal registry.
//!
//! Three checks per enabled journal: the remote endpoint answers an
//! authenticated probe, the last completed pass is not older than twice
//! the journal's sync interval, and the recent run history is not
//! dominated by failures. The monitor only reports; it never mutates
//! registry or mapping state.

use crate::error::SyncResult;
use crate::settings::SyncSettings;
use chrono::{Duration, Utc};
use ojs_client::create_client;
use ojs_core::SyncStore;
use ojs_core::types::{JournalTenant, RunStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthIssue {
    pub journal_id: i64,
    pub journal_code: String,
    pub description: String,
}

pub struct HealthMonitor {
    store: Arc<dyn SyncStore>,
    settings: SyncSettings,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn SyncStore>, settings: SyncSettings) -> Self {
        Self { store, settings }
    }

    /// Surveys every enabled journal and returns the issues found. An
    /// empty list means a clean bill of health. Probe failures become
    /// issues for that journal, never errors for the survey.
    pub async fn check_health(&self) -> SyncResult<Vec<HealthIssue>> {
        let journals = self.store.enabled_journals().await?;
        let mut issues = Vec::new();

        for journal in &journals {
            self.check_connectivity(journal, &mut issues).await;
            self.check_staleness(journal, &mut issues);
            self.check_failure_rate(journal, &mut issues).await?;
        }

        if issues.is_empty() {
            info!(journals = journals.len(), "Health check passed");
        } else {
            warn!(
                journals = journals.len(),
                issues = issues.len(),
                "Health check found issues"
            );
        }
        Ok(issues)
    }

    async fn check_connectivity(&self, journal: &JournalTenant, issues: &mut Vec<HealthIssue>) {
        let client = match create_client(
            &journal.base_url,
            &journal.api_key,
            self.settings.request_timeout(),
        ) {
            Ok(client) => client,
            Err(err) => {
                issues.push(issue(
                    journal,
                    format!("client configuration invalid: {err}"),
                ));
                return;
            }
        };
        if let Err(err) = client.probe().await {
            issues.push(issue(
                journal,
                format!("endpoint unreachable: {err} ({})", err.remediation()),
            ));
        } else {
            debug!(journal = %journal.code, "Probe succeeded");
        }
    }

    fn check_staleness(&self, journal: &JournalTenant, issues: &mut Vec<HealthIssue>) {
        let allowance = Duration::hours(i64::from(journal.sync_interval_hours) * 2);
        match journal.last_synced_at {
            None => issues.push(issue(
                journal,
                "no sync pass has ever completed".to_string(),
            )),
            Some(last) if Utc::now() - last > allowance => issues.push(issue(
                journal,
                format!(
                    "last completed pass was {} hours ago (interval {} h)",
                    (Utc::now() - last).num_hours(),
                    journal.sync_interval_hours
                ),
            )),
            Some(_) => {}
        }
    }

    /// Compares the failure share over the most recent runs against the
    /// configured threshold. A journal with no recorded runs is covered
    /// by the staleness check instead.
    async fn check_failure_rate(
        &self,
        journal: &JournalTenant,
        issues: &mut Vec<HealthIssue>,
    ) -> SyncResult<()> {
        let runs = self
            .store
            .recent_runs(Some(journal.id), self.settings.failure_window)
            .await?;
        if runs.is_empty() {
            return Ok(());
        }
        let failed = runs
            .iter()
            .filter(|r| r.status == RunStatus::Failed)
            .count();
        let rate = failed as f64 / runs.len() as f64;
        if rate > self.settings.failure_rate_threshold {
            issues.push(issue(
                journal,
                format!(
                    "{failed} of the last {} runs failed ({:.0}%)",
                    runs.len(),
                    rate * 100.0
                ),
            ));
        }
        Ok(())
    }
}

fn issue(journal: &JournalTenant, description: String) -> HealthIssue {
    HealthIssue {
        journal_id: journal.id,
        journal_code: journal.code.clone(),
        description,
    }
}
