//! Cron-driven background jobs.
//!
//! Three jobs: the hourly full sync over every enabled journal, the
//! daily health check, and the weekly purge of old run rows. The jobs
//! are thin wrappers over [`Orchestrator`] and [`HealthMonitor`]; all
//! sync semantics live there.

use crate::error::{SyncError, SyncResult};
use crate::health::HealthMonitor;
use crate::orchestrator::Orchestrator;
use crate::report::OrchestratorReport;
use crate::settings::SyncSettings;
use chrono::{Duration, Utc};
use ojs_core::SyncStore;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct SyncScheduler {
    scheduler: JobScheduler,
    orchestrator: Arc<Orchestrator>,
    last_report: Arc<RwLock<Option<OrchestratorReport>>>,
    cancel: CancellationToken,
}

impl SyncScheduler {
    pub async fn new(
        store: Arc<dyn SyncStore>,
        settings: SyncSettings,
        cancel: CancellationToken,
    ) -> SyncResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SyncError::Scheduler(e.to_string()))?;

        let orchestrator = Arc::new(Orchestrator::new(store.clone(), settings.clone()));
        let monitor = Arc::new(HealthMonitor::new(store.clone(), settings.clone()));
        let last_report = Arc::new(RwLock::new(None));

        let orchestrator_clone = orchestrator.clone();
        let report_clone = last_report.clone();
        let cancel_clone = cancel.clone();
        let sync_job = Job::new_async(settings.full_sync_cron.as_str(), move |_uuid, _lock| {
            let orchestrator = orchestrator_clone.clone();
            let report = report_clone.clone();
            let cancel = cancel_clone.clone();
            Box::pin(async move {
                info!("Starting scheduled sync pass");
                match orchestrator.sync_all_journals("schedule", &cancel).await {
                    Ok(pass_report) => {
                        info!(
                            attempted = pass_report.journals_attempted(),
                            failed = pass_report.journals_failed(),
                            "Scheduled sync pass completed"
                        );
                        let mut guard = report.write().await;
                        *guard = Some(pass_report);
                    }
                    Err(e) => {
                        error!(error = %e, "Scheduled sync pass failed");
                    }
                }
            })
        })
        .map_err(|e| SyncError::Scheduler(e.to_string()))?;

        let monitor_clone = monitor.clone();
        let health_job = Job::new_async(settings.health_check_cron.as_str(), move |_uuid, _lock| {
            let monitor = monitor_clone.clone();
            Box::pin(async move {
                match monitor.check_health().await {
                    Ok(issues) if issues.is_empty() => {
                        info!("Scheduled health check passed");
                    }
                    Ok(issues) => {
                        for issue in &issues {
                            warn!(
                                journal = %issue.journal_code,
                                "Health issue: {}",
                                issue.description
                            );
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Scheduled health check failed");
                    }
                }
            })
        })
        .map_err(|e| SyncError::Scheduler(e.to_string()))?;

        let retention_days = settings.retention_days;
        let store_clone = store.clone();
        let purge_job = Job::new_async(settings.purge_cron.as_str(), move |_uuid, _lock| {
            let store = store_clone.clone();
            Box::pin(async move {
                let cutoff = Utc::now() - Duration::days(retention_days);
                match store.purge_runs_before(cutoff).await {
                    Ok(purged) => info!(purged, "Purged old sync run rows"),
                    Err(e) => error!(error = %e, "Run log purge failed"),
                }
            })
        })
        .map_err(|e| SyncError::Scheduler(e.to_string()))?;

        for job in [sync_job, health_job, purge_job] {
            scheduler
                .add(job)
                .await
                .map_err(|e| SyncError::Scheduler(e.to_string()))?;
        }

        Ok(Self {
            scheduler,
            orchestrator,
            last_report,
            cancel,
        })
    }

    pub async fn start(&self) -> SyncResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| SyncError::Scheduler(e.to_string()))?;
        info!("Sync scheduler started");
        Ok(())
    }

    pub async fn stop(&mut self) -> SyncResult<()> {
        self.cancel.cancel();
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| SyncError::Scheduler(e.to_string()))?;
        info!("Sync scheduler stopped");
        Ok(())
    }

    /// Immediate full pass outside the cron cadence; the per-journal
    /// guards keep it from overlapping a scheduled pass already running.
    pub async fn run_now(&self) -> SyncResult<OrchestratorReport> {
        let report = self
            .orchestrator
            .sync_all_journals("cli", &self.cancel)
            .await?;
        let mut guard = self.last_report.write().await;
        *guard = Some(report.clone());
        Ok(report)
    }

    pub async fn last_report(&self) -> Option<OrchestratorReport> {
        self.last_report.read().await.clone()
    }
}
