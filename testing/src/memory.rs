use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ojs_core::error::{StoreError, StoreResult};
use ojs_core::traits::{
    CommentStore, DocumentStore, IssueStore, JournalRegistry, MappingStore, ReviewStore,
    SubmissionStore, SyncLogStore, UserDirectory,
};
use ojs_core::types::{
    AuthorContribution, Comment, Document, DocumentVersion, Issue, JournalTenant, MappingStatus,
    NewComment, NewDocumentVersion, NewIssue, NewJournalTenant, NewMapping, NewReview,
    NewSubmission, NewUser, OjsMapping, Review, Submission, SyncRun, UserAccount, UserProfile,
    normalize_email,
};
use parking_lot::Mutex;

#[derive(Default)]
struct Tables {
    journals: Vec<JournalTenant>,
    users: Vec<UserAccount>,
    profiles: HashMap<i64, UserProfile>,
    submissions: Vec<Submission>,
    contributions: HashMap<i64, Vec<AuthorContribution>>,
    documents: Vec<Document>,
    versions: Vec<DocumentVersion>,
    contents: HashMap<i64, Vec<u8>>,
    mappings: Vec<OjsMapping>,
    runs: Vec<SyncRun>,
    issues: Vec<Issue>,
    reviews: Vec<Review>,
    comments: Vec<Comment>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory implementation of every store trait, with the same key
/// constraints the PostgreSQL schema enforces. Not persistent, only for
/// tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JournalRegistry for MemoryStore {
    async fn register_journal(&self, new: NewJournalTenant) -> StoreResult<JournalTenant> {
        let mut t = self.tables.lock();
        if t.journals.iter().any(|j| j.code == new.code) {
            return Err(StoreError::Constraint(format!(
                "duplicate journal code: {}",
                new.code
            )));
        }
        let now = Utc::now();
        let journal = JournalTenant {
            id: t.next_id(),
            code: new.code,
            name: new.name,
            base_url: new.base_url,
            api_key: new.api_key,
            remote_journal_id: new.remote_journal_id,
            enabled: true,
            active: true,
            sync_direction: new.sync_direction,
            sync_interval_hours: new.sync_interval_hours,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        };
        t.journals.push(journal.clone());
        Ok(journal)
    }

    async fn journal_by_id(&self, id: i64) -> StoreResult<Option<JournalTenant>> {
        Ok(self.tables.lock().journals.iter().find(|j| j.id == id).cloned())
    }

    async fn journal_by_code(&self, code: &str) -> StoreResult<Option<JournalTenant>> {
        Ok(self
            .tables
            .lock()
            .journals
            .iter()
            .find(|j| j.code == code)
            .cloned())
    }

    async fn all_journals(&self) -> StoreResult<Vec<JournalTenant>> {
        let mut journals = self.tables.lock().journals.clone();
        journals.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(journals)
    }

    async fn enabled_journals(&self) -> StoreResult<Vec<JournalTenant>> {
        let mut journals: Vec<_> = self
            .tables
            .lock()
            .journals
            .iter()
            .filter(|j| j.enabled && j.active)
            .cloned()
            .collect();
        journals.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(journals)
    }

    async fn set_journal_enabled(&self, id: i64, enabled: bool) -> StoreResult<()> {
        let mut t = self.tables.lock();
        let journal = t
            .journals
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| StoreError::not_found("journal", id))?;
        journal.enabled = enabled;
        journal.updated_at = Utc::now();
        Ok(())
    }

    async fn set_journal_active(&self, id: i64, active: bool) -> StoreResult<()> {
        let mut t = self.tables.lock();
        let journal = t
            .journals
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| StoreError::not_found("journal", id))?;
        journal.active = active;
        journal.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_journal_synced(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        let mut t = self.tables.lock();
        let journal = t
            .journals
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| StoreError::not_found("journal", id))?;
        journal.last_synced_at = Some(match journal.last_synced_at {
            Some(prev) if prev > at => prev,
            _ => at,
        });
        journal.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn insert_mapping(&self, new: NewMapping) -> StoreResult<OjsMapping> {
        let mut t = self.tables.lock();
        if t.mappings.iter().any(|m| {
            m.journal_id == new.journal_id && m.remote_submission_id == new.remote_submission_id
        }) {
            return Err(StoreError::Constraint(format!(
                "duplicate mapping for remote submission {}",
                new.remote_submission_id
            )));
        }
        if t.mappings.iter().any(|m| m.submission_id == new.submission_id) {
            return Err(StoreError::Constraint(format!(
                "submission {} is already mapped",
                new.submission_id
            )));
        }
        let now = Utc::now();
        let mapping = OjsMapping {
            id: t.next_id(),
            journal_id: new.journal_id,
            submission_id: new.submission_id,
            remote_submission_id: new.remote_submission_id,
            direction: new.direction,
            status: new.status,
            local_version: new.local_version,
            remote_version: new.remote_version,
            last_error: new.last_error,
            metadata: new.metadata,
            last_synced_at: new.last_synced_at,
            created_at: now,
            updated_at: now,
        };
        t.mappings.push(mapping.clone());
        Ok(mapping)
    }

    async fn save_mapping(&self, mapping: &OjsMapping) -> StoreResult<()> {
        let mut t = self.tables.lock();
        let stored = t
            .mappings
            .iter_mut()
            .find(|m| m.id == mapping.id)
            .ok_or_else(|| StoreError::not_found("mapping", mapping.id))?;
        *stored = mapping.clone();
        Ok(())
    }

    async fn mapping_for_remote(
        &self,
        journal_id: i64,
        remote_submission_id: i64,
    ) -> StoreResult<Option<OjsMapping>> {
        Ok(self
            .tables
            .lock()
            .mappings
            .iter()
            .find(|m| {
                m.journal_id == journal_id && m.remote_submission_id == remote_submission_id
            })
            .cloned())
    }

    async fn mapping_for_submission(&self, submission_id: i64) -> StoreResult<Option<OjsMapping>> {
        Ok(self
            .tables
            .lock()
            .mappings
            .iter()
            .find(|m| m.submission_id == submission_id)
            .cloned())
    }

    async fn mappings_for_journal(&self, journal_id: i64) -> StoreResult<Vec<OjsMapping>> {
        Ok(self
            .tables
            .lock()
            .mappings
            .iter()
            .filter(|m| m.journal_id == journal_id)
            .cloned()
            .collect())
    }

    async fn mappings_with_status(
        &self,
        journal_id: i64,
        status: MappingStatus,
    ) -> StoreResult<Vec<OjsMapping>> {
        Ok(self
            .tables
            .lock()
            .mappings
            .iter()
            .filter(|m| m.journal_id == journal_id && m.status == status)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_or_create_user(&self, new: &NewUser) -> StoreResult<(UserAccount, bool)> {
        let email = normalize_email(&new.email);
        let mut t = self.tables.lock();
        if let Some(user) = t.users.iter().find(|u| u.email == email) {
            return Ok((user.clone(), false));
        }
        let now = Utc::now();
        let user = UserAccount {
            id: t.next_id(),
            email,
            username: new.username.clone(),
            created_at: now,
            updated_at: now,
        };
        t.users.push(user.clone());
        Ok((user, true))
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<UserAccount>> {
        let email = normalize_email(email);
        Ok(self
            .tables
            .lock()
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<UserAccount>> {
        Ok(self.tables.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> StoreResult<()> {
        self.tables
            .lock()
            .profiles
            .insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn profile_for_user(&self, user_id: i64) -> StoreResult<Option<UserProfile>> {
        Ok(self.tables.lock().profiles.get(&user_id).cloned())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert_submission(&self, new: NewSubmission) -> StoreResult<Submission> {
        let mut t = self.tables.lock();
        let now = Utc::now();
        let submission = Submission {
            id: t.next_id(),
            journal_id: new.journal_id,
            title: new.title,
            abstract_text: new.abstract_text,
            section: new.section,
            keywords: new.keywords,
            status: new.status,
            submitted_at: new.submitted_at,
            created_at: now,
            updated_at: now,
        };
        t.submissions.push(submission.clone());
        Ok(submission)
    }

    async fn update_submission(&self, submission: &Submission) -> StoreResult<()> {
        let mut t = self.tables.lock();
        let stored = t
            .submissions
            .iter_mut()
            .find(|s| s.id == submission.id)
            .ok_or_else(|| StoreError::not_found("submission", submission.id))?;
        *stored = submission.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn submission_by_id(&self, id: i64) -> StoreResult<Option<Submission>> {
        Ok(self
            .tables
            .lock()
            .submissions
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn submissions_for_journal(&self, journal_id: i64) -> StoreResult<Vec<Submission>> {
        Ok(self
            .tables
            .lock()
            .submissions
            .iter()
            .filter(|s| s.journal_id == journal_id)
            .cloned()
            .collect())
    }

    async fn replace_contributions(
        &self,
        submission_id: i64,
        contributions: &[AuthorContribution],
    ) -> StoreResult<()> {
        self.tables
            .lock()
            .contributions
            .insert(submission_id, contributions.to_vec());
        Ok(())
    }

    async fn contributions_for_submission(
        &self,
        submission_id: i64,
    ) -> StoreResult<Vec<AuthorContribution>> {
        let mut contributions = self
            .tables
            .lock()
            .contributions
            .get(&submission_id)
            .cloned()
            .unwrap_or_default();
        contributions.sort_by_key(|c| c.seq);
        Ok(contributions)
    }

    async fn delete_submission(&self, id: i64) -> StoreResult<()> {
        let mut t = self.tables.lock();
        let before = t.submissions.len();
        t.submissions.retain(|s| s.id != id);
        if t.submissions.len() == before {
            return Err(StoreError::not_found("submission", id));
        }
        t.contributions.remove(&id);
        t.mappings.retain(|m| m.submission_id != id);
        t.reviews.retain(|r| r.submission_id != id);
        t.comments.retain(|c| c.submission_id != id);
        let doomed: Vec<i64> = t
            .documents
            .iter()
            .filter(|d| d.submission_id == id)
            .map(|d| d.id)
            .collect();
        t.documents.retain(|d| d.submission_id != id);
        for document_id in doomed {
            let gone: Vec<i64> = t
                .versions
                .iter()
                .filter(|v| v.document_id == document_id)
                .map(|v| v.id)
                .collect();
            t.versions.retain(|v| v.document_id != document_id);
            for version_id in gone {
                t.contents.remove(&version_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_or_create_document(
        &self,
        submission_id: i64,
        label: &str,
    ) -> StoreResult<Document> {
        let mut t = self.tables.lock();
        if let Some(document) = t
            .documents
            .iter()
            .find(|d| d.submission_id == submission_id && d.label == label)
        {
            return Ok(document.clone());
        }
        let document = Document {
            id: t.next_id(),
            submission_id,
            label: label.to_string(),
            created_at: Utc::now(),
        };
        t.documents.push(document.clone());
        Ok(document)
    }

    async fn attach_version(
        &self,
        new: NewDocumentVersion,
    ) -> StoreResult<(DocumentVersion, bool)> {
        let mut t = self.tables.lock();
        if let Some(version) = t.versions.iter().find(|v| {
            v.document_id == new.document_id
                && v.file_name == new.file_name
                && v.sha256 == new.sha256
        }) {
            return Ok((version.clone(), false));
        }
        let version = DocumentVersion {
            id: t.next_id(),
            document_id: new.document_id,
            file_name: new.file_name,
            content_type: new.content_type,
            size_bytes: new.content.len() as i64,
            sha256: new.sha256,
            created_at: Utc::now(),
        };
        t.contents.insert(version.id, new.content);
        t.versions.push(version.clone());
        Ok((version, true))
    }

    async fn documents_for_submission(&self, submission_id: i64) -> StoreResult<Vec<Document>> {
        Ok(self
            .tables
            .lock()
            .documents
            .iter()
            .filter(|d| d.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn versions_for_document(&self, document_id: i64) -> StoreResult<Vec<DocumentVersion>> {
        Ok(self
            .tables
            .lock()
            .versions
            .iter()
            .filter(|v| v.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn version_content(&self, version_id: i64) -> StoreResult<Vec<u8>> {
        self.tables
            .lock()
            .contents
            .get(&version_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("document version", version_id))
    }
}

#[async_trait]
impl SyncLogStore for MemoryStore {
    async fn open_run(&self, run: &SyncRun) -> StoreResult<()> {
        self.tables.lock().runs.push(run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &SyncRun) -> StoreResult<()> {
        let mut t = self.tables.lock();
        let stored = t
            .runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or_else(|| StoreError::not_found("sync run", run.id))?;
        *stored = run.clone();
        Ok(())
    }

    async fn recent_runs(&self, journal_id: Option<i64>, limit: i64) -> StoreResult<Vec<SyncRun>> {
        let mut runs: Vec<_> = self
            .tables
            .lock()
            .runs
            .iter()
            .filter(|r| journal_id.is_none_or(|id| r.journal_id == id))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }

    async fn purge_runs_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut t = self.tables.lock();
        let before = t.runs.len();
        t.runs.retain(|r| r.started_at >= cutoff);
        Ok((before - t.runs.len()) as u64)
    }
}

#[async_trait]
impl IssueStore for MemoryStore {
    async fn upsert_issue(&self, new: NewIssue) -> StoreResult<(Issue, bool)> {
        let mut t = self.tables.lock();
        if let Some(issue) = t
            .issues
            .iter_mut()
            .find(|i| i.journal_id == new.journal_id && i.remote_issue_id == new.remote_issue_id)
        {
            issue.volume = new.volume;
            issue.number = new.number;
            issue.year = new.year;
            issue.title = new.title;
            issue.published = new.published;
            issue.published_at = new.published_at;
            issue.updated_at = Utc::now();
            return Ok((issue.clone(), false));
        }
        let now = Utc::now();
        let issue = Issue {
            id: t.next_id(),
            journal_id: new.journal_id,
            remote_issue_id: new.remote_issue_id,
            volume: new.volume,
            number: new.number,
            year: new.year,
            title: new.title,
            published: new.published,
            published_at: new.published_at,
            created_at: now,
            updated_at: now,
        };
        t.issues.push(issue.clone());
        Ok((issue, true))
    }

    async fn issues_for_journal(&self, journal_id: i64) -> StoreResult<Vec<Issue>> {
        Ok(self
            .tables
            .lock()
            .issues
            .iter()
            .filter(|i| i.journal_id == journal_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn upsert_review(&self, new: NewReview) -> StoreResult<(Review, bool)> {
        let mut t = self.tables.lock();
        if let Some(review) = t.reviews.iter_mut().find(|r| {
            r.submission_id == new.submission_id && r.remote_review_id == new.remote_review_id
        }) {
            review.reviewer_id = new.reviewer_id;
            review.round = new.round;
            review.recommendation = new.recommendation;
            review.assigned_at = new.assigned_at;
            review.completed_at = new.completed_at;
            review.updated_at = Utc::now();
            return Ok((review.clone(), false));
        }
        let now = Utc::now();
        let review = Review {
            id: t.next_id(),
            submission_id: new.submission_id,
            reviewer_id: new.reviewer_id,
            remote_review_id: new.remote_review_id,
            round: new.round,
            recommendation: new.recommendation,
            assigned_at: new.assigned_at,
            completed_at: new.completed_at,
            created_at: now,
            updated_at: now,
        };
        t.reviews.push(review.clone());
        Ok((review, true))
    }

    async fn reviews_for_submission(&self, submission_id: i64) -> StoreResult<Vec<Review>> {
        let mut reviews: Vec<_> = self
            .tables
            .lock()
            .reviews
            .iter()
            .filter(|r| r.submission_id == submission_id)
            .cloned()
            .collect();
        reviews.sort_by_key(|r| (r.round, r.id));
        Ok(reviews)
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn upsert_comment(&self, new: NewComment) -> StoreResult<(Comment, bool)> {
        let mut t = self.tables.lock();
        if let Some(comment) = t.comments.iter_mut().find(|c| {
            c.submission_id == new.submission_id && c.remote_comment_id == new.remote_comment_id
        }) {
            comment.author_id = new.author_id;
            comment.title = new.title;
            comment.body = new.body;
            comment.posted_at = new.posted_at;
            return Ok((comment.clone(), false));
        }
        let comment = Comment {
            id: t.next_id(),
            submission_id: new.submission_id,
            author_id: new.author_id,
            remote_comment_id: new.remote_comment_id,
            title: new.title,
            body: new.body,
            posted_at: new.posted_at,
            created_at: Utc::now(),
        };
        t.comments.push(comment.clone());
        Ok((comment, true))
    }

    async fn comments_for_submission(&self, submission_id: i64) -> StoreResult<Vec<Comment>> {
        let mut comments: Vec<_> = self
            .tables
            .lock()
            .comments
            .iter()
            .filter(|c| c.submission_id == submission_id)
            .cloned()
            .collect();
        comments.sort_by_key(|c| (c.posted_at, c.id));
        Ok(comments)
    }
}
