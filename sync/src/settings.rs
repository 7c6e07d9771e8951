use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of the sync engine, loaded from a TOML file or defaulted.
///
/// All of these are process-wide; per-journal knobs (credentials, the
/// sync interval) live on the journal row itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// End-to-end timeout applied to every remote call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Page size for remote list calls.
    #[serde(default = "default_page_size")]
    pub page_size: i64,

    /// How many journals sync concurrently during a full pass.
    #[serde(default = "default_journal_concurrency")]
    pub journal_concurrency: usize,

    /// How many submissions import concurrently within one pass.
    #[serde(default = "default_import_concurrency")]
    pub import_concurrency: usize,

    /// Cap on per-item error details kept in a run row; the `failed`
    /// counter still reflects every failure.
    #[serde(default = "default_max_reported_errors")]
    pub max_reported_errors: usize,

    /// Runs inspected by the health monitor when computing the recent
    /// failure rate.
    #[serde(default = "default_failure_window")]
    pub failure_window: i64,

    /// Fraction of failed runs within the window that raises an issue.
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,

    /// Sync run rows older than this are purged by the weekly job.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Hourly full sync over all enabled journals.
    #[serde(default = "default_full_sync_cron")]
    pub full_sync_cron: String,

    /// Daily health check.
    #[serde(default = "default_health_check_cron")]
    pub health_check_cron: String,

    /// Weekly run-log purge.
    #[serde(default = "default_purge_cron")]
    pub purge_cron: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            page_size: default_page_size(),
            journal_concurrency: default_journal_concurrency(),
            import_concurrency: default_import_concurrency(),
            max_reported_errors: default_max_reported_errors(),
            failure_window: default_failure_window(),
            failure_rate_threshold: default_failure_rate_threshold(),
            retention_days: default_retention_days(),
            full_sync_cron: default_full_sync_cron(),
            health_check_cron: default_health_check_cron(),
            purge_cron: default_purge_cron(),
        }
    }
}

impl SyncSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> i64 {
    50
}

fn default_journal_concurrency() -> usize {
    4
}

fn default_import_concurrency() -> usize {
    4
}

fn default_max_reported_errors() -> usize {
    10
}

fn default_failure_window() -> i64 {
    20
}

fn default_failure_rate_threshold() -> f64 {
    0.5
}

fn default_retention_days() -> i64 {
    90
}

fn default_full_sync_cron() -> String {
    // sec min hour day month weekday
    "0 0 * * * *".to_string()
}

fn default_health_check_cron() -> String {
    "0 0 6 * * *".to_string()
}

fn default_purge_cron() -> String {
    "0 0 3 * * Sun".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SyncSettings::default();
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.journal_concurrency, 4);
        assert_eq!(settings.retention_days, 90);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings = SyncSettings::from_toml_str(
            r#"
            page_size = 25
            journal_concurrency = 2
            "#,
        )
        .unwrap();
        assert_eq!(settings.page_size, 25);
        assert_eq!(settings.journal_concurrency, 2);
        assert_eq!(settings.max_reported_errors, 10);
        assert_eq!(settings.full_sync_cron, "0 0 * * * *");
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(SyncSettings::from_toml_str("page_size = \"lots\"").is_err());
    }
}
