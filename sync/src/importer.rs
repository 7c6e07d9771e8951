//! Converts one remote submission payload into local records.
//!
//! The importer is idempotent: running it twice over the same payload
//! yields exactly one local submission, one mapping, no duplicated
//! bylines and no duplicated file revisions. Failures inside one
//! submission (a bad author, an unreachable galley) are demoted to
//! warnings recorded on the mapping; only a malformed payload or a
//! submission-level write error fails the item as a whole.

use crate::error::{SyncError, SyncResult};
use crate::fingerprint;
use crate::keyed_lock::KeyedLocks;
use crate::resolver::{RemoteIdentity, UserResolver};
use chrono::Utc;
use ojs_client::{OjsApi, RemoteAuthor, RemoteSubmission};
use ojs_core::SyncStore;
use ojs_core::types::{
    AuthorContribution, JournalTenant, MappingStatus, NewDocumentVersion, NewMapping,
    NewSubmission, OjsMapping, Submission, SubmissionStatus,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one import attempt did to the local side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// First import: submission, byline, files and mapping all created.
    Created,
    /// Update pass: remote changes were applied.
    Updated,
    /// Nothing to apply: neither side changed, or the mapping's
    /// direction does not pull remote changes.
    Unchanged,
    /// Both sides changed since the last successful sync, or the mapping
    /// was already conflicted. Nothing was overwritten.
    Conflict,
}

pub struct SubmissionImporter {
    store: Arc<dyn SyncStore>,
    resolver: UserResolver,
}

impl SubmissionImporter {
    pub fn new(store: Arc<dyn SyncStore>, email_locks: Arc<KeyedLocks>) -> Self {
        let resolver = UserResolver::new(store.clone(), email_locks);
        Self { store, resolver }
    }

    /// Imports one remote submission, creating or updating local records
    /// and upserting the mapping row.
    pub async fn import(
        &self,
        client: &dyn OjsApi,
        journal: &JournalTenant,
        remote: &RemoteSubmission,
    ) -> SyncResult<ImportOutcome> {
        // Required-field validation happens before any local write so a
        // malformed payload leaves no partial state behind.
        let title = remote
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                SyncError::Validation(format!("submission {} is missing a title", remote.id))
            })?
            .to_string();

        match self
            .store
            .mapping_for_remote(journal.id, remote.id)
            .await?
        {
            Some(mapping) if mapping.status == MappingStatus::Conflict => {
                // Idempotent no-op until an operator resolves it.
                debug!(
                    journal = %journal.code,
                    remote_id = remote.id,
                    "Skipping conflicted mapping"
                );
                Ok(ImportOutcome::Conflict)
            }
            Some(mapping) if mapping.status == MappingStatus::Completed => {
                self.update_pass(client, journal, remote, mapping).await
            }
            Some(mapping) => {
                // Pending / Failed / stranded InProgress: re-apply the
                // full field set rather than diffing.
                self.reimport_pass(client, journal, remote, title, mapping)
                    .await
            }
            None => self.fresh_import(client, journal, remote, title).await,
        }
    }

    async fn fresh_import(
        &self,
        client: &dyn OjsApi,
        journal: &JournalTenant,
        remote: &RemoteSubmission,
        title: String,
    ) -> SyncResult<ImportOutcome> {
        if !journal.sync_direction.pulls() {
            // A push-only journal never materializes remote submissions
            // locally.
            return Ok(ImportOutcome::Unchanged);
        }

        let mut warnings = Vec::new();
        let contributions = self
            .resolve_byline(0, &remote.authors, &mut warnings)
            .await;

        let submission = self
            .store
            .insert_submission(NewSubmission {
                journal_id: journal.id,
                title,
                abstract_text: remote.abstract_text.clone(),
                section: remote.section.clone(),
                keywords: remote.keywords.clone(),
                status: SubmissionStatus::from_remote_code(remote.status),
                submitted_at: remote.date_submitted,
            })
            .await?;

        // The mapping goes in right behind the submission row: an import
        // interrupted during the byline or galley writes leaves a Pending
        // mapping, and the retry resumes into the same local submission
        // instead of inserting a second one.
        let mut mapping = self
            .store
            .insert_mapping(NewMapping {
                journal_id: journal.id,
                submission_id: submission.id,
                remote_submission_id: remote.id,
                direction: journal.sync_direction,
                status: MappingStatus::Pending,
                local_version: None,
                remote_version: None,
                last_error: None,
                metadata: json!({}),
                last_synced_at: None,
            })
            .await?;

        let contributions: Vec<AuthorContribution> = contributions
            .into_iter()
            .map(|mut c| {
                c.submission_id = submission.id;
                c
            })
            .collect();
        self.store
            .replace_contributions(submission.id, &contributions)
            .await?;

        self.transfer_galleys(client, remote, submission.id, &mut warnings)
            .await;

        mapping.local_version = Some(fingerprint::local_submission(&submission));
        mapping.remote_version = Some(fingerprint::remote_submission(remote));
        mapping.metadata = metadata_for(&warnings);
        mapping.advance(MappingStatus::InProgress)?;
        mapping.advance(MappingStatus::Completed)?;
        mapping.last_synced_at = Some(Utc::now());
        self.store.save_mapping(&mapping).await?;

        info!(
            journal = %journal.code,
            remote_id = remote.id,
            submission_id = submission.id,
            warnings = warnings.len(),
            "Imported remote submission"
        );
        Ok(ImportOutcome::Created)
    }

    /// Update pass over a previously completed mapping: detect which
    /// sides changed since the last successful sync and act accordingly.
    async fn update_pass(
        &self,
        client: &dyn OjsApi,
        journal: &JournalTenant,
        remote: &RemoteSubmission,
        mut mapping: OjsMapping,
    ) -> SyncResult<ImportOutcome> {
        let submission = self
            .store
            .submission_by_id(mapping.submission_id)
            .await?
            .ok_or_else(|| {
                SyncError::Validation(format!(
                    "mapping {} points at missing local submission {}",
                    mapping.id, mapping.submission_id
                ))
            })?;

        let local_now = fingerprint::local_submission(&submission);
        let remote_now = fingerprint::remote_submission(remote);
        let local_changed = mapping.local_version.as_deref() != Some(local_now.as_str());
        let remote_changed = mapping.remote_version.as_deref() != Some(remote_now.as_str());

        match (local_changed, remote_changed) {
            (false, false) => {
                mapping.last_synced_at = Some(Utc::now());
                self.store.save_mapping(&mapping).await?;
                Ok(ImportOutcome::Unchanged)
            }
            (true, false) => {
                // Local-only edits are the push step's concern; never
                // overwritten here.
                Ok(ImportOutcome::Unchanged)
            }
            (false, true) => {
                if !mapping.direction.pulls() {
                    return Ok(ImportOutcome::Unchanged);
                }
                mapping.advance(MappingStatus::InProgress)?;
                self.store.save_mapping(&mapping).await?;

                match self
                    .apply_remote_fields(client, remote, submission)
                    .await
                {
                    Ok((updated, warnings)) => {
                        mapping.local_version = Some(fingerprint::local_submission(&updated));
                        mapping.remote_version = Some(remote_now);
                        mapping.last_error = None;
                        mapping.metadata = metadata_for(&warnings);
                        mapping.advance(MappingStatus::Completed)?;
                        mapping.last_synced_at = Some(Utc::now());
                        self.store.save_mapping(&mapping).await?;
                        Ok(ImportOutcome::Updated)
                    }
                    Err(err) => {
                        mapping.last_error = Some(err.describe());
                        mapping.advance(MappingStatus::Failed)?;
                        self.store.save_mapping(&mapping).await?;
                        Err(err)
                    }
                }
            }
            (true, true) => {
                mapping.advance(MappingStatus::InProgress)?;
                mapping.advance(MappingStatus::Conflict)?;
                mapping.metadata = json!({
                    "conflict": {
                        "detected_at": Utc::now(),
                        "stored_local_version": mapping.local_version,
                        "observed_local_version": local_now,
                        "stored_remote_version": mapping.remote_version,
                        "observed_remote_version": remote_now,
                    }
                });
                self.store.save_mapping(&mapping).await?;
                warn!(
                    journal = %journal.code,
                    remote_id = remote.id,
                    submission_id = mapping.submission_id,
                    "Both sides changed since the last sync; mapping parked as conflict"
                );
                Ok(ImportOutcome::Conflict)
            }
        }
    }

    /// Retry of a mapping that never completed: overwrite the full field
    /// set instead of diffing.
    async fn reimport_pass(
        &self,
        client: &dyn OjsApi,
        journal: &JournalTenant,
        remote: &RemoteSubmission,
        title: String,
        mut mapping: OjsMapping,
    ) -> SyncResult<ImportOutcome> {
        let submission = self
            .store
            .submission_by_id(mapping.submission_id)
            .await?
            .ok_or_else(|| {
                SyncError::Validation(format!(
                    "mapping {} points at missing local submission {}",
                    mapping.id, mapping.submission_id
                ))
            })?;

        if mapping.status != MappingStatus::InProgress {
            mapping.advance(MappingStatus::InProgress)?;
            self.store.save_mapping(&mapping).await?;
        }

        let result = self
            .apply_remote_fields(client, remote, Submission { title, ..submission })
            .await;
        match result {
            Ok((updated, warnings)) => {
                mapping.local_version = Some(fingerprint::local_submission(&updated));
                mapping.remote_version = Some(fingerprint::remote_submission(remote));
                mapping.last_error = None;
                mapping.metadata = metadata_for(&warnings);
                mapping.advance(MappingStatus::Completed)?;
                mapping.last_synced_at = Some(Utc::now());
                self.store.save_mapping(&mapping).await?;
                info!(
                    journal = %journal.code,
                    remote_id = remote.id,
                    submission_id = mapping.submission_id,
                    "Re-imported previously failed submission"
                );
                Ok(ImportOutcome::Updated)
            }
            Err(err) => {
                mapping.last_error = Some(err.describe());
                mapping.advance(MappingStatus::Failed)?;
                self.store.save_mapping(&mapping).await?;
                Err(err)
            }
        }
    }

    /// Writes the payload's fields onto the local submission, reconciles
    /// the byline and transfers galleys. Returns the stored submission
    /// and accumulated warnings.
    async fn apply_remote_fields(
        &self,
        client: &dyn OjsApi,
        remote: &RemoteSubmission,
        mut submission: Submission,
    ) -> SyncResult<(Submission, Vec<String>)> {
        let mut warnings = Vec::new();

        if let Some(title) = remote.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            submission.title = title.to_string();
        }
        submission.abstract_text = remote.abstract_text.clone();
        submission.section = remote.section.clone();
        submission.keywords = remote.keywords.clone();
        submission.status = SubmissionStatus::from_remote_code(remote.status);
        if remote.date_submitted.is_some() {
            submission.submitted_at = remote.date_submitted;
        }
        self.store.update_submission(&submission).await?;

        self.reconcile_byline(submission.id, &remote.authors, &mut warnings)
            .await?;
        self.transfer_galleys(client, remote, submission.id, &mut warnings)
            .await;

        Ok((submission, warnings))
    }

    /// Resolves each author to a local account. Authors that cannot be
    /// resolved become warnings, not failures.
    async fn resolve_byline(
        &self,
        submission_id: i64,
        authors: &[RemoteAuthor],
        warnings: &mut Vec<String>,
    ) -> Vec<AuthorContribution> {
        let mut contributions = Vec::new();
        for (index, author) in authors.iter().enumerate() {
            match self.resolve_author(author).await {
                Ok(user_id) => contributions.push(AuthorContribution {
                    submission_id,
                    user_id,
                    seq: if author.seq != 0 { author.seq } else { index as i32 },
                    role: "author".to_string(),
                    primary_contact: author.primary_contact,
                }),
                Err(err) => warnings.push(format!(
                    "author {} {}: {}",
                    author.given_name, author.family_name, err
                )),
            }
        }
        contributions
    }

    async fn resolve_author(&self, author: &RemoteAuthor) -> SyncResult<i64> {
        let email = author
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| SyncError::Validation("no email address".to_string()))?;
        let identity = RemoteIdentity {
            email: email.to_string(),
            given_name: author.given_name.clone(),
            family_name: author.family_name.clone(),
            affiliation: author.affiliation.clone(),
            orcid: author.orcid.clone(),
            country: author.country.clone(),
        };
        let (account, _) = self.resolver.resolve(&identity).await?;
        Ok(account.id)
    }

    /// Merges the remote byline into the existing one: remote authors
    /// update or extend the list, existing contributors are never
    /// duplicated and never dropped.
    async fn reconcile_byline(
        &self,
        submission_id: i64,
        authors: &[RemoteAuthor],
        warnings: &mut Vec<String>,
    ) -> SyncResult<()> {
        let resolved = self.resolve_byline(submission_id, authors, warnings).await;
        let mut merged = self.store.contributions_for_submission(submission_id).await?;

        for contribution in resolved {
            match merged.iter_mut().find(|c| c.user_id == contribution.user_id) {
                Some(existing) => {
                    existing.seq = contribution.seq;
                    existing.primary_contact = contribution.primary_contact;
                }
                None => merged.push(contribution),
            }
        }
        merged.sort_by_key(|c| c.seq);

        self.store
            .replace_contributions(submission_id, &merged)
            .await?;
        Ok(())
    }

    /// Downloads each galley and stores it content-addressed. An already
    /// stored (filename, hash) pair is skipped by the store, so re-runs
    /// transfer nothing. Per-galley failures become warnings.
    async fn transfer_galleys(
        &self,
        client: &dyn OjsApi,
        remote: &RemoteSubmission,
        submission_id: i64,
        warnings: &mut Vec<String>,
    ) {
        for galley in &remote.galleys {
            let label = galley
                .label
                .clone()
                .unwrap_or_else(|| format!("galley-{}", galley.id));
            if let Err(err) = self
                .transfer_one_galley(client, submission_id, &label, galley)
                .await
            {
                warnings.push(format!("galley {}: {}", label, err.describe()));
            }
        }
    }

    async fn transfer_one_galley(
        &self,
        client: &dyn OjsApi,
        submission_id: i64,
        label: &str,
        galley: &ojs_client::RemoteGalley,
    ) -> SyncResult<()> {
        let url = galley
            .url
            .as_deref()
            .ok_or_else(|| SyncError::Validation("no download url".to_string()))?;
        let file_name = galley
            .file_name
            .clone()
            .unwrap_or_else(|| format!("galley-{}.bin", galley.id));

        let content = client.download_file(url).await?;
        let sha256 = fingerprint::file_sha256(&content);

        let document = self
            .store
            .find_or_create_document(submission_id, label)
            .await?;
        let (_, created) = self
            .store
            .attach_version(NewDocumentVersion {
                document_id: document.id,
                file_name,
                content_type: galley
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                sha256,
                content,
            })
            .await?;
        if !created {
            debug!(submission_id, label, "Galley content unchanged, revision reused");
        }
        Ok(())
    }
}

fn metadata_for(warnings: &[String]) -> serde_json::Value {
    if warnings.is_empty() {
        json!({})
    } else {
        json!({ "warnings": warnings })
    }
}
