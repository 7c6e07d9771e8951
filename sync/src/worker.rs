//! One sync pass over one journal.
//!
//! The worker owns the whole lifecycle of a pass: the run row, the
//! paging loop against the remote instance, delegation to the importer
//! and resolvers, the push step, and the final counters. Batch failures
//! (the listing call itself, credentials) finish the run as `Failed` and
//! come back as data in the summary; per-item failures only increment
//! the `failed` counter and the batch continues.

use crate::error::{SyncError, SyncResult};
use crate::fingerprint;
use crate::importer::{ImportOutcome, SubmissionImporter};
use crate::keyed_lock::KeyedLocks;
use crate::report::{PassOutcome, SyncSummary, TenantReport};
use crate::resolver::{RemoteIdentity, UserResolver};
use crate::settings::SyncSettings;
use chrono::Utc;
use futures_util::StreamExt;
use metrics::{counter, histogram};
use ojs_client::{ArticlePatch, OjsApi, create_client};
use ojs_core::SyncStore;
use ojs_core::types::{
    JournalTenant, MappingStatus, NewComment, NewIssue, NewReview, OjsMapping,
    ReviewRecommendation, RunStatus, SyncKind, SyncRun,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct SyncWorker {
    store: Arc<dyn SyncStore>,
    settings: SyncSettings,
    journal: JournalTenant,
    client: Arc<dyn OjsApi>,
    importer: SubmissionImporter,
    resolver: UserResolver,
    triggered_by: String,
}

impl SyncWorker {
    /// Builds a worker bound to one journal's credentials. The client is
    /// constructed from the registry row; no credential state is shared
    /// between journals.
    pub fn new(
        store: Arc<dyn SyncStore>,
        settings: SyncSettings,
        email_locks: Arc<KeyedLocks>,
        journal: JournalTenant,
        triggered_by: &str,
    ) -> SyncResult<Self> {
        let client = create_client(
            &journal.base_url,
            &journal.api_key,
            settings.request_timeout(),
        )?;
        Ok(Self {
            importer: SubmissionImporter::new(store.clone(), email_locks.clone()),
            resolver: UserResolver::new(store.clone(), email_locks),
            store,
            settings,
            journal,
            client,
            triggered_by: triggered_by.to_string(),
        })
    }

    pub fn journal(&self) -> &JournalTenant {
        &self.journal
    }

    /// Runs every entity kind in dependency order. A batch failure stops
    /// the remaining kinds, since the same credentials would fail again.
    pub async fn sync_all(&self, cancel: &CancellationToken) -> SyncResult<TenantReport> {
        let mut report = TenantReport {
            journal_id: self.journal.id,
            journal_code: self.journal.code.clone(),
            summaries: Vec::new(),
        };

        if !self.journal.enabled {
            debug!(journal = %self.journal.code, "Sync disabled, skipping journal");
            report.summaries.push(SyncSummary::skipped(SyncKind::All));
            return Ok(report);
        }

        for kind in [
            SyncKind::Submissions,
            SyncKind::Users,
            SyncKind::Issues,
            SyncKind::Reviews,
            SyncKind::Comments,
        ] {
            let summary = self.sync_kind(kind, cancel).await?;
            let stop = matches!(
                summary.outcome,
                PassOutcome::Failed | PassOutcome::Cancelled
            );
            report.summaries.push(summary);
            if stop {
                break;
            }
        }
        Ok(report)
    }

    pub async fn sync_kind(
        &self,
        kind: SyncKind,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncSummary> {
        match kind {
            SyncKind::Submissions => self.sync_submissions(cancel).await,
            SyncKind::Users => self.sync_users(cancel).await,
            SyncKind::Issues => self.sync_issues(cancel).await,
            SyncKind::Reviews => self.sync_reviews(cancel).await,
            SyncKind::Comments => self.sync_comments(cancel).await,
            SyncKind::All => Err(SyncError::Validation(
                "sync_kind expects a concrete entity kind; use sync_all".to_string(),
            )),
        }
    }

    pub async fn sync_submissions(&self, cancel: &CancellationToken) -> SyncResult<SyncSummary> {
        let Some(mut run) = self.begin(SyncKind::Submissions).await? else {
            return Ok(SyncSummary::skipped(SyncKind::Submissions));
        };
        let result = self.run_submissions(&mut run, cancel).await;
        self.finalize(run, result).await
    }

    pub async fn sync_users(&self, cancel: &CancellationToken) -> SyncResult<SyncSummary> {
        let Some(mut run) = self.begin(SyncKind::Users).await? else {
            return Ok(SyncSummary::skipped(SyncKind::Users));
        };
        let result = self.run_users(&mut run, cancel).await;
        self.finalize(run, result).await
    }

    pub async fn sync_issues(&self, cancel: &CancellationToken) -> SyncResult<SyncSummary> {
        let Some(mut run) = self.begin(SyncKind::Issues).await? else {
            return Ok(SyncSummary::skipped(SyncKind::Issues));
        };
        let result = self.run_issues(&mut run, cancel).await;
        self.finalize(run, result).await
    }

    pub async fn sync_reviews(&self, cancel: &CancellationToken) -> SyncResult<SyncSummary> {
        let Some(mut run) = self.begin(SyncKind::Reviews).await? else {
            return Ok(SyncSummary::skipped(SyncKind::Reviews));
        };
        let result = self.run_reviews(&mut run, cancel).await;
        self.finalize(run, result).await
    }

    pub async fn sync_comments(&self, cancel: &CancellationToken) -> SyncResult<SyncSummary> {
        let Some(mut run) = self.begin(SyncKind::Comments).await? else {
            return Ok(SyncSummary::skipped(SyncKind::Comments));
        };
        let result = self.run_comments(&mut run, cancel).await;
        self.finalize(run, result).await
    }

    /// Opens the run row, or returns `None` (skip, no row) when sync is
    /// disabled for the journal.
    async fn begin(&self, kind: SyncKind) -> SyncResult<Option<SyncRun>> {
        if !self.journal.enabled {
            debug!(journal = %self.journal.code, %kind, "Sync disabled, skipping pass");
            return Ok(None);
        }
        let mut run = SyncRun::begin(self.journal.id, kind, &self.triggered_by);
        self.store.open_run(&run).await?;
        run.status = RunStatus::InProgress;
        self.store.update_run(&run).await?;
        info!(journal = %self.journal.code, %kind, run_id = %run.id, "Sync pass started");
        Ok(Some(run))
    }

    /// Finalizes the run row and converts the pass result into a
    /// summary. Only a completed pass advances the journal's sync
    /// cursor, and the store keeps that cursor monotonic.
    async fn finalize(&self, mut run: SyncRun, result: SyncResult<()>) -> SyncResult<SyncSummary> {
        let outcome = match result {
            Ok(()) => {
                run.finish(RunStatus::Completed);
                self.store
                    .mark_journal_synced(self.journal.id, Utc::now())
                    .await?;
                PassOutcome::Completed
            }
            Err(SyncError::Cancelled) => {
                warn!(journal = %self.journal.code, kind = %run.kind, "Sync pass cancelled");
                run.finish(RunStatus::Cancelled);
                PassOutcome::Cancelled
            }
            Err(err) => {
                warn!(
                    journal = %self.journal.code,
                    kind = %run.kind,
                    error = %err,
                    "Sync pass failed"
                );
                let kind_label = run.kind.to_string();
                run.add_error("batch", &kind_label, err.describe());
                run.finish(RunStatus::Failed);
                PassOutcome::Failed
            }
        };
        self.store.update_run(&run).await?;

        let outcome_label = match outcome {
            PassOutcome::Completed => "completed",
            PassOutcome::Failed => "failed",
            PassOutcome::Skipped => "skipped",
            PassOutcome::Cancelled => "cancelled",
        };
        counter!(
            "sync.passes.total",
            "kind" => run.kind.to_string(),
            "outcome" => outcome_label
        )
        .increment(1);
        counter!("sync.items.processed", "kind" => run.kind.to_string())
            .increment(u64::from(run.processed));
        counter!("sync.items.failed", "kind" => run.kind.to_string())
            .increment(u64::from(run.failed));
        let elapsed_ms = (Utc::now() - run.started_at).num_milliseconds().max(0) as f64;
        histogram!("sync.pass.duration_ms", "kind" => run.kind.to_string()).record(elapsed_ms);

        info!(
            journal = %self.journal.code,
            kind = %run.kind,
            outcome = outcome_label,
            processed = run.processed,
            created = run.created,
            updated = run.updated,
            failed = run.failed,
            conflicts = run.conflicts,
            pushed = run.pushed,
            "Sync pass finished"
        );

        Ok(SyncSummary {
            kind: run.kind,
            outcome,
            processed: run.processed,
            created: run.created,
            updated: run.updated,
            failed: run.failed,
            conflicts: run.conflicts,
            pushed: run.pushed,
            error_details: run.error_details,
        })
    }

    /// Caps the stored sample of details; the counter keeps the full
    /// count.
    fn record_item_failure(
        &self,
        run: &mut SyncRun,
        entity_type: &str,
        entity_id: &str,
        err: &SyncError,
    ) {
        run.failed += 1;
        if run.error_details.len() < self.settings.max_reported_errors {
            run.add_error(entity_type, entity_id, err.describe());
        }
    }

    async fn run_submissions(
        &self,
        run: &mut SyncRun,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let mut offset = 0i64;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let page = self
                .client
                .list_submissions(self.journal.remote_journal_id, offset, self.settings.page_size)
                .await?;
            let fetched = page.items.len();
            if fetched == 0 {
                break;
            }

            // Imports within a page run concurrently; user resolution
            // stays race-free through the per-email locks. Cancellation
            // is honored between items, never mid-item.
            let imports = futures_util::stream::iter(page.items.into_iter().map(|item| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let result = self
                        .importer
                        .import(self.client.as_ref(), &self.journal, &item)
                        .await;
                    Some((item.id, result))
                }
            }))
            .buffered(self.settings.import_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

            for (remote_id, result) in imports.into_iter().flatten() {
                run.processed += 1;
                match result {
                    Ok(ImportOutcome::Created) => run.created += 1,
                    Ok(ImportOutcome::Updated) => run.updated += 1,
                    Ok(ImportOutcome::Unchanged) => {}
                    Ok(ImportOutcome::Conflict) => run.conflicts += 1,
                    Err(err) => {
                        self.record_item_failure(run, "submission", &remote_id.to_string(), &err);
                    }
                }
            }
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            if fetched < self.settings.page_size as usize {
                break;
            }
            offset += fetched as i64;
            if page.items_max > 0 && offset >= page.items_max {
                break;
            }
        }

        self.push_pending(run, cancel).await
    }

    /// Write-back step: mappings whose direction pushes and whose local
    /// side drifted from the recorded tag are sent to the remote
    /// instance. Metadata only, no file upload.
    async fn push_pending(&self, run: &mut SyncRun, cancel: &CancellationToken) -> SyncResult<()> {
        let mappings = self.store.mappings_for_journal(self.journal.id).await?;
        for mapping in mappings {
            if !mapping.direction.pushes() {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let submission_id = mapping.submission_id;
            let result = match mapping.status {
                MappingStatus::Completed => self.push_update(run, mapping).await,
                // Queued locally, never pushed: create the remote
                // article on first contact.
                MappingStatus::Pending => self.push_create(run, mapping).await,
                _ => continue,
            };
            if let Err(err) = result {
                if matches!(err, SyncError::Cancelled) {
                    return Err(err);
                }
                self.record_item_failure(run, "push", &submission_id.to_string(), &err);
            }
        }
        Ok(())
    }

    async fn push_update(&self, run: &mut SyncRun, mut mapping: OjsMapping) -> SyncResult<()> {
        let Some(submission) = self.store.submission_by_id(mapping.submission_id).await? else {
            return Err(SyncError::Validation(format!(
                "mapping {} points at missing local submission {}",
                mapping.id, mapping.submission_id
            )));
        };
        let local_now = fingerprint::local_submission(&submission);
        if mapping.local_version.as_deref() == Some(local_now.as_str()) {
            return Ok(());
        }

        let patch = ArticlePatch {
            title: submission.title.clone(),
            abstract_text: submission.abstract_text.clone(),
            section: submission.section.clone(),
            keywords: submission.keywords.clone(),
            status: submission.status.remote_code(),
        };
        let returned = self
            .client
            .update_article(mapping.remote_submission_id, &patch)
            .await?;

        mapping.local_version = Some(local_now);
        mapping.remote_version = Some(fingerprint::remote_submission(&returned));
        mapping.last_synced_at = Some(Utc::now());
        self.store.save_mapping(&mapping).await?;
        run.pushed += 1;
        debug!(
            journal = %self.journal.code,
            submission_id = submission.id,
            remote_id = mapping.remote_submission_id,
            "Pushed local edits to remote article"
        );
        Ok(())
    }

    async fn push_create(&self, run: &mut SyncRun, mut mapping: OjsMapping) -> SyncResult<()> {
        let Some(submission) = self.store.submission_by_id(mapping.submission_id).await? else {
            return Err(SyncError::Validation(format!(
                "mapping {} points at missing local submission {}",
                mapping.id, mapping.submission_id
            )));
        };

        let patch = ArticlePatch {
            title: submission.title.clone(),
            abstract_text: submission.abstract_text.clone(),
            section: submission.section.clone(),
            keywords: submission.keywords.clone(),
            status: submission.status.remote_code(),
        };
        let created = self
            .client
            .create_article(self.journal.remote_journal_id, &patch)
            .await?;

        mapping.remote_submission_id = created.id;
        mapping.local_version = Some(fingerprint::local_submission(&submission));
        mapping.remote_version = Some(fingerprint::remote_submission(&created));
        mapping.advance(MappingStatus::InProgress)?;
        mapping.advance(MappingStatus::Completed)?;
        mapping.last_synced_at = Some(Utc::now());
        self.store.save_mapping(&mapping).await?;
        run.pushed += 1;
        info!(
            journal = %self.journal.code,
            submission_id = submission.id,
            remote_id = created.id,
            "Created remote article for queued local submission"
        );
        Ok(())
    }

    async fn run_users(&self, run: &mut SyncRun, cancel: &CancellationToken) -> SyncResult<()> {
        let mut offset = 0i64;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let page = self
                .client
                .list_users(self.journal.remote_journal_id, offset, self.settings.page_size)
                .await?;
            let fetched = page.items.len();
            if fetched == 0 {
                break;
            }

            for user in &page.items {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                run.processed += 1;
                if user.disabled {
                    debug!(remote_id = user.id, "Skipping disabled remote user");
                    continue;
                }
                match RemoteIdentity::from_user(user) {
                    Ok(identity) => match self.resolver.resolve(&identity).await {
                        Ok((_, true)) => run.created += 1,
                        Ok((_, false)) => run.updated += 1,
                        Err(err) => {
                            self.record_item_failure(run, "user", &user.id.to_string(), &err);
                        }
                    },
                    Err(err) => {
                        self.record_item_failure(run, "user", &user.id.to_string(), &err);
                    }
                }
            }

            if fetched < self.settings.page_size as usize {
                break;
            }
            offset += fetched as i64;
            if page.items_max > 0 && offset >= page.items_max {
                break;
            }
        }
        Ok(())
    }

    async fn run_issues(&self, run: &mut SyncRun, cancel: &CancellationToken) -> SyncResult<()> {
        let mut offset = 0i64;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let page = self
                .client
                .list_issues(self.journal.remote_journal_id, offset, self.settings.page_size)
                .await?;
            let fetched = page.items.len();
            if fetched == 0 {
                break;
            }

            for issue in &page.items {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                run.processed += 1;
                let upsert = self
                    .store
                    .upsert_issue(NewIssue {
                        journal_id: self.journal.id,
                        remote_issue_id: issue.id,
                        volume: issue.volume,
                        number: issue.number.clone(),
                        year: issue.year,
                        title: issue.title.clone(),
                        published: issue.published,
                        published_at: issue.date_published,
                    })
                    .await;
                match upsert {
                    Ok((_, true)) => run.created += 1,
                    Ok((_, false)) => run.updated += 1,
                    Err(err) => self.record_item_failure(
                        run,
                        "issue",
                        &issue.id.to_string(),
                        &err.into(),
                    ),
                }
            }

            if fetched < self.settings.page_size as usize {
                break;
            }
            offset += fetched as i64;
            if page.items_max > 0 && offset >= page.items_max {
                break;
            }
        }
        Ok(())
    }

    /// Reviews hang off submissions on the remote side, so the pass
    /// walks the mapped submissions and lists each one's reviews.
    async fn run_reviews(&self, run: &mut SyncRun, cancel: &CancellationToken) -> SyncResult<()> {
        for mapping in self.mapped_submissions().await? {
            let mut offset = 0i64;
            loop {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                let page = self
                    .client
                    .list_reviews(mapping.remote_submission_id, offset, self.settings.page_size)
                    .await?;
                let fetched = page.items.len();
                if fetched == 0 {
                    break;
                }

                for review in &page.items {
                    run.processed += 1;
                    let reviewer = match &review.reviewer {
                        Some(p) => RemoteIdentity::from_participant(p, "reviewer"),
                        None => Err(SyncError::Validation(format!(
                            "review {} has no reviewer",
                            review.id
                        ))),
                    };
                    let result = match reviewer {
                        Ok(identity) => match self.resolver.resolve(&identity).await {
                            Ok((reviewer_account, _)) => self
                                .store
                                .upsert_review(NewReview {
                                    submission_id: mapping.submission_id,
                                    reviewer_id: reviewer_account.id,
                                    remote_review_id: review.id,
                                    round: review.round,
                                    recommendation: review
                                        .recommendation
                                        .and_then(ReviewRecommendation::from_remote_code),
                                    assigned_at: review.date_assigned,
                                    completed_at: review.date_completed,
                                })
                                .await
                                .map_err(SyncError::from),
                            Err(err) => Err(err),
                        },
                        Err(err) => Err(err),
                    };
                    match result {
                        Ok((_, true)) => run.created += 1,
                        Ok((_, false)) => run.updated += 1,
                        Err(err) => {
                            self.record_item_failure(run, "review", &review.id.to_string(), &err);
                        }
                    }
                }

                if fetched < self.settings.page_size as usize {
                    break;
                }
                offset += fetched as i64;
                if page.items_max > 0 && offset >= page.items_max {
                    break;
                }
            }
        }
        Ok(())
    }

    async fn run_comments(&self, run: &mut SyncRun, cancel: &CancellationToken) -> SyncResult<()> {
        for mapping in self.mapped_submissions().await? {
            let mut offset = 0i64;
            loop {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                let page = self
                    .client
                    .list_comments(mapping.remote_submission_id, offset, self.settings.page_size)
                    .await?;
                let fetched = page.items.len();
                if fetched == 0 {
                    break;
                }

                for comment in &page.items {
                    run.processed += 1;
                    let result = self.import_comment(mapping.submission_id, comment).await;
                    match result {
                        Ok(true) => run.created += 1,
                        Ok(false) => run.updated += 1,
                        Err(err) => {
                            self.record_item_failure(run, "comment", &comment.id.to_string(), &err);
                        }
                    }
                }

                if fetched < self.settings.page_size as usize {
                    break;
                }
                offset += fetched as i64;
                if page.items_max > 0 && offset >= page.items_max {
                    break;
                }
            }
        }
        Ok(())
    }

    async fn import_comment(
        &self,
        submission_id: i64,
        comment: &ojs_client::RemoteComment,
    ) -> SyncResult<bool> {
        let body = comment
            .body
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                SyncError::Validation(format!("comment {} has no body", comment.id))
            })?
            .to_string();

        // An unresolvable author keeps the note with no local account
        // attached rather than dropping the note.
        let author_id = match &comment.author {
            Some(p) if p.email.as_deref().is_some_and(|e| !e.trim().is_empty()) => {
                let identity = RemoteIdentity::from_participant(p, "comment author")?;
                let (account, _) = self.resolver.resolve(&identity).await?;
                Some(account.id)
            }
            _ => None,
        };

        let (_, created) = self
            .store
            .upsert_comment(NewComment {
                submission_id,
                author_id,
                remote_comment_id: comment.id,
                title: comment.title.clone(),
                body,
                posted_at: comment.date_posted.unwrap_or_else(Utc::now),
            })
            .await?;
        Ok(created)
    }

    /// Mappings that have an assigned remote counterpart.
    async fn mapped_submissions(&self) -> SyncResult<Vec<OjsMapping>> {
        Ok(self
            .store
            .mappings_for_journal(self.journal.id)
            .await?
            .into_iter()
            .filter(|m| m.remote_submission_id > 0)
            .collect())
    }
}
