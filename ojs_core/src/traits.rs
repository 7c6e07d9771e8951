//! Store traits implemented by the persistence layer.
//!
//! The sync engine only ever talks to storage through these traits, so
//! tests can substitute an in-memory implementation without touching
//! PostgreSQL.

use crate::error::StoreResult;
use crate::types::{
    AuthorContribution, Comment, Document, DocumentVersion, Issue, JournalTenant, MappingStatus,
    NewComment, NewDocumentVersion, NewIssue, NewJournalTenant, NewMapping, NewReview,
    NewSubmission, NewUser, OjsMapping, Review, Submission, SyncRun, UserAccount, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Registry of journals configured for synchronization.
#[async_trait]
pub trait JournalRegistry: Send + Sync {
    async fn register_journal(&self, new: NewJournalTenant) -> StoreResult<JournalTenant>;

    async fn journal_by_id(&self, id: i64) -> StoreResult<Option<JournalTenant>>;

    async fn journal_by_code(&self, code: &str) -> StoreResult<Option<JournalTenant>>;

    async fn all_journals(&self) -> StoreResult<Vec<JournalTenant>>;

    /// Journals eligible for a pass: sync enabled and still active.
    async fn enabled_journals(&self) -> StoreResult<Vec<JournalTenant>>;

    async fn set_journal_enabled(&self, id: i64, enabled: bool) -> StoreResult<()>;

    async fn set_journal_active(&self, id: i64, active: bool) -> StoreResult<()>;

    /// Records a successful pass. Implementations must keep the cursor
    /// monotonic: an older timestamp never overwrites a newer one.
    async fn mark_journal_synced(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Submission mappings between the local database and remote instances.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn insert_mapping(&self, new: NewMapping) -> StoreResult<OjsMapping>;

    /// Persists the current state of an existing mapping row.
    async fn save_mapping(&self, mapping: &OjsMapping) -> StoreResult<()>;

    async fn mapping_for_remote(
        &self,
        journal_id: i64,
        remote_submission_id: i64,
    ) -> StoreResult<Option<OjsMapping>>;

    async fn mapping_for_submission(&self, submission_id: i64) -> StoreResult<Option<OjsMapping>>;

    async fn mappings_for_journal(&self, journal_id: i64) -> StoreResult<Vec<OjsMapping>>;

    async fn mappings_with_status(
        &self,
        journal_id: i64,
        status: MappingStatus,
    ) -> StoreResult<Vec<OjsMapping>>;
}

/// User accounts and their profiles, keyed by normalized email.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds the account for `new.email` or atomically creates it.
    /// Returns the account and whether it was created by this call.
    async fn find_or_create_user(&self, new: &NewUser) -> StoreResult<(UserAccount, bool)>;

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<UserAccount>>;

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<UserAccount>>;

    async fn upsert_profile(&self, profile: &UserProfile) -> StoreResult<()>;

    async fn profile_for_user(&self, user_id: i64) -> StoreResult<Option<UserProfile>>;
}

/// Manuscript records and their bylines.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert_submission(&self, new: NewSubmission) -> StoreResult<Submission>;

    async fn update_submission(&self, submission: &Submission) -> StoreResult<()>;

    async fn submission_by_id(&self, id: i64) -> StoreResult<Option<Submission>>;

    async fn submissions_for_journal(&self, journal_id: i64) -> StoreResult<Vec<Submission>>;

    /// Replaces the whole byline in one step, keeping order authoritative.
    async fn replace_contributions(
        &self,
        submission_id: i64,
        contributions: &[AuthorContribution],
    ) -> StoreResult<()>;

    async fn contributions_for_submission(
        &self,
        submission_id: i64,
    ) -> StoreResult<Vec<AuthorContribution>>;

    async fn delete_submission(&self, id: i64) -> StoreResult<()>;
}

/// Submission files and their content-addressed revisions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_or_create_document(
        &self,
        submission_id: i64,
        label: &str,
    ) -> StoreResult<Document>;

    /// Stores a revision unless an identical one already exists.
    /// Returns the revision and whether it was created by this call.
    async fn attach_version(&self, new: NewDocumentVersion)
    -> StoreResult<(DocumentVersion, bool)>;

    async fn documents_for_submission(&self, submission_id: i64) -> StoreResult<Vec<Document>>;

    async fn versions_for_document(&self, document_id: i64) -> StoreResult<Vec<DocumentVersion>>;

    /// Raw bytes of one stored revision.
    async fn version_content(&self, version_id: i64) -> StoreResult<Vec<u8>>;
}

/// History of sync passes, used for reporting and health checks.
#[async_trait]
pub trait SyncLogStore: Send + Sync {
    /// Inserts a freshly started run row.
    async fn open_run(&self, run: &SyncRun) -> StoreResult<()>;

    /// Rewrites the mutable part of a run row: status, counters, error
    /// details, completion time. Called when the run advances and once
    /// more when it reaches a terminal status.
    async fn update_run(&self, run: &SyncRun) -> StoreResult<()>;

    /// Most recent runs, newest first, optionally limited to one journal.
    async fn recent_runs(&self, journal_id: Option<i64>, limit: i64) -> StoreResult<Vec<SyncRun>>;

    /// Deletes runs started before `cutoff`, returning how many went.
    async fn purge_runs_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Journal issues, keyed per journal by remote identifier.
#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn upsert_issue(&self, new: NewIssue) -> StoreResult<(Issue, bool)>;

    async fn issues_for_journal(&self, journal_id: i64) -> StoreResult<Vec<Issue>>;
}

/// Review assignments, keyed by remote identifier.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn upsert_review(&self, new: NewReview) -> StoreResult<(Review, bool)>;

    async fn reviews_for_submission(&self, submission_id: i64) -> StoreResult<Vec<Review>>;
}

/// Editorial discussion notes, keyed by remote identifier.
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn upsert_comment(&self, new: NewComment) -> StoreResult<(Comment, bool)>;

    async fn comments_for_submission(&self, submission_id: i64) -> StoreResult<Vec<Comment>>;
}

/// Everything the sync engine needs from a storage backend, as one
/// object-safe bound so engines can hold an `Arc<dyn SyncStore>`.
pub trait SyncStore:
    JournalRegistry
    + MappingStore
    + UserDirectory
    + SubmissionStore
    + DocumentStore
    + SyncLogStore
    + IssueStore
    + ReviewStore
    + CommentStore
{
}

impl<T> SyncStore for T where
    T: JournalRegistry
        + MappingStore
        + UserDirectory
        + SubmissionStore
        + DocumentStore
        + SyncLogStore
        + IssueStore
        + ReviewStore
        + CommentStore
{
}
