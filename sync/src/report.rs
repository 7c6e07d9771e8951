//! Pass results returned to callers.
//!
//! Everything here is plain data: batch failures travel inside a summary
//! instead of being raised, so a scheduled run can never be crashed by
//! one journal's broken credentials.

use chrono::{DateTime, Utc};
use ojs_core::types::{SyncErrorDetail, SyncKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    Completed,
    /// The listing call itself failed; no items were attempted past that
    /// point. Distinct from per-item failures, which leave the pass
    /// `Completed` with a non-zero `failed` count.
    Failed,
    /// Sync is disabled for the journal; nothing was recorded.
    Skipped,
    Cancelled,
}

/// Result of one pass over one journal for one entity kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub kind: SyncKind,
    pub outcome: PassOutcome,
    pub processed: u32,
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub conflicts: u32,
    pub pushed: u32,
    /// Capped sample of failures; `failed` holds the full count.
    pub error_details: Vec<SyncErrorDetail>,
}

impl SyncSummary {
    pub fn skipped(kind: SyncKind) -> Self {
        Self {
            kind,
            outcome: PassOutcome::Skipped,
            processed: 0,
            created: 0,
            updated: 0,
            failed: 0,
            conflicts: 0,
            pushed: 0,
            error_details: Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == PassOutcome::Failed
    }
}

/// Results of one `sync_all` invocation for one journal, one summary per
/// entity kind attempted. After a batch failure the remaining kinds are
/// not attempted (the same credentials would fail again), so the list may
/// be shorter than the full kind set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantReport {
    pub journal_id: i64,
    pub journal_code: String,
    pub summaries: Vec<SyncSummary>,
}

impl TenantReport {
    pub fn has_failures(&self) -> bool {
        self.summaries.iter().any(SyncSummary::is_failure)
    }

    pub fn processed(&self) -> u32 {
        self.summaries.iter().map(|s| s.processed).sum()
    }

    pub fn failed(&self) -> u32 {
        self.summaries.iter().map(|s| s.failed).sum()
    }
}

/// How one journal fared within an orchestrated full pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TenantOutcome {
    Completed { report: TenantReport },
    /// The worker could not run at all: bad stored configuration, a
    /// storage failure opening the pass, or a panic in the task.
    Failed { journal_code: String, reason: String },
}

impl TenantOutcome {
    pub fn journal_code(&self) -> &str {
        match self {
            Self::Completed { report } => &report.journal_code,
            Self::Failed { journal_code, .. } => journal_code,
        }
    }

    pub fn succeeded(&self) -> bool {
        match self {
            Self::Completed { report } => !report.has_failures(),
            Self::Failed { .. } => false,
        }
    }
}

/// Aggregate of one orchestrated pass over every eligible journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcomes: Vec<TenantOutcome>,
}

impl OrchestratorReport {
    pub fn journals_attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn journals_failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }

    pub fn total_processed(&self) -> u32 {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                TenantOutcome::Completed { report } => Some(report.processed()),
                TenantOutcome::Failed { .. } => None,
            })
            .sum()
    }

    pub fn total_failed(&self) -> u32 {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                TenantOutcome::Completed { report } => Some(report.failed()),
                TenantOutcome::Failed { .. } => None,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(kind: SyncKind, outcome: PassOutcome, processed: u32, failed: u32) -> SyncSummary {
        SyncSummary {
            kind,
            outcome,
            processed,
            created: 0,
            updated: 0,
            failed,
            conflicts: 0,
            pushed: 0,
            error_details: Vec::new(),
        }
    }

    #[test]
    fn test_tenant_report_totals() {
        let report = TenantReport {
            journal_id: 1,
            journal_code: "jhe".to_string(),
            summaries: vec![
                summary(SyncKind::Submissions, PassOutcome::Completed, 10, 1),
                summary(SyncKind::Users, PassOutcome::Completed, 4, 0),
            ],
        };
        assert_eq!(report.processed(), 14);
        assert_eq!(report.failed(), 1);
        assert!(!report.has_failures());
    }

    #[test]
    fn test_orchestrator_report_counts_failed_tenants() {
        let ok = TenantOutcome::Completed {
            report: TenantReport {
                journal_id: 1,
                journal_code: "a".to_string(),
                summaries: vec![summary(SyncKind::Submissions, PassOutcome::Completed, 3, 0)],
            },
        };
        let bad = TenantOutcome::Failed {
            journal_code: "b".to_string(),
            reason: "authentication failed".to_string(),
        };
        let report = OrchestratorReport {
            started_at: Utc::now(),
            completed_at: Utc::now(),
            outcomes: vec![ok, bad],
        };
        assert_eq!(report.journals_attempted(), 2);
        assert_eq!(report.journals_failed(), 1);
        assert_eq!(report.total_processed(), 3);
    }

    #[test]
    fn test_batch_failure_marks_tenant_unsuccessful() {
        let outcome = TenantOutcome::Completed {
            report: TenantReport {
                journal_id: 1,
                journal_code: "a".to_string(),
                summaries: vec![summary(SyncKind::Submissions, PassOutcome::Failed, 0, 0)],
            },
        };
        assert!(!outcome.succeeded());
    }
}
