use crate::error::InvalidTransition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// A journal registered for synchronization with a remote OJS instance.
///
/// Each journal is an isolated tenant: it carries its own connection
/// details and its own sync cursor, and a failure while syncing one
/// journal never affects another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalTenant {
    pub id: i64,
    /// Short unique code used to address the journal from the CLI, e.g. `jhe`.
    pub code: String,
    pub name: String,
    /// Base URL of the remote OJS instance, without a trailing slash.
    pub base_url: String,
    pub api_key: String,
    /// Identifier of the journal on its remote instance.
    pub remote_journal_id: i64,
    /// Sync toggle. Disabled journals are skipped, never failed.
    pub enabled: bool,
    /// Whether the journal itself is still live. Archived journals are
    /// excluded from scheduled passes even when `enabled` is set.
    pub active: bool,
    /// Default direction stamped on mappings created for this journal.
    pub sync_direction: SyncDirection,
    /// Expected cadence of scheduled passes; a journal is considered
    /// stale after twice this interval.
    pub sync_interval_hours: i32,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Connection details for registering a new journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJournalTenant {
    pub code: String,
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub remote_journal_id: i64,
    pub sync_direction: SyncDirection,
    pub sync_interval_hours: i32,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SyncDirection {
    FromRemote,
    ToRemote,
    Bidirectional,
}

impl SyncDirection {
    /// Whether local edits are pushed back to the remote instance.
    pub fn pushes(self) -> bool {
        matches!(self, Self::ToRemote | Self::Bidirectional)
    }

    /// Whether remote changes are applied to the local database.
    pub fn pulls(self) -> bool {
        matches!(self, Self::FromRemote | Self::Bidirectional)
    }
}

/// Lifecycle of a submission mapping.
///
/// ```text
/// pending -> in_progress -> completed | failed | conflict
///            completed   -> in_progress   (re-sync)
///            failed      -> in_progress   (retry)
/// ```
///
/// `Conflict` is terminal for the engine: conflicted mappings are skipped
/// on every pass until an operator resolves the divergence and resets the
/// mapping out of band.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MappingStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Conflict,
}

impl MappingStatus {
    pub fn can_transition_to(self, next: MappingStatus) -> bool {
        use MappingStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Conflict)
                | (Completed, InProgress)
                | (Failed, InProgress)
        )
    }
}

/// Links a local submission to its counterpart on a remote OJS instance.
///
/// The pair (`journal_id`, `remote_submission_id`) is unique, as is
/// `submission_id`: a submission maps to at most one remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OjsMapping {
    pub id: i64,
    pub journal_id: i64,
    pub submission_id: i64,
    pub remote_submission_id: i64,
    pub direction: SyncDirection,
    pub status: MappingStatus,
    /// Version tag of the local record captured when the two sides last
    /// agreed. Tags are opaque and compared only for equality.
    pub local_version: Option<String>,
    /// Version tag of the remote record captured at the same point.
    pub remote_version: Option<String>,
    pub last_error: Option<String>,
    /// Free-form details recorded during import, e.g. skipped galleys.
    pub metadata: serde_json::Value,
    /// When the two sides last finished a successful pass for this row.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OjsMapping {
    /// Moves the mapping to `next`, rejecting transitions outside the
    /// state machine.
    pub fn advance(&mut self, next: MappingStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Fields required to insert a new mapping row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMapping {
    pub journal_id: i64,
    pub submission_id: i64,
    pub remote_submission_id: i64,
    pub direction: SyncDirection,
    pub status: MappingStatus,
    pub local_version: Option<String>,
    pub remote_version: Option<String>,
    pub last_error: Option<String>,
    pub metadata: serde_json::Value,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SyncKind {
    All,
    Submissions,
    Users,
    Issues,
    Reviews,
    Comments,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RunStatus {
    Started,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Whether the run has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One per-item failure recorded during a sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncErrorDetail {
    pub entity_type: String,
    pub entity_id: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Persisted record of one sync pass over one journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub journal_id: i64,
    pub kind: SyncKind,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processed: u32,
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub conflicts: u32,
    pub pushed: u32,
    /// Capped sample of per-item failures; `failed` holds the full count.
    pub error_details: Vec<SyncErrorDetail>,
    /// What started the pass: `cli` or `schedule`.
    pub triggered_by: String,
}

impl SyncRun {
    pub fn begin(journal_id: i64, kind: SyncKind, triggered_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            journal_id,
            kind,
            status: RunStatus::Started,
            started_at: Utc::now(),
            completed_at: None,
            processed: 0,
            created: 0,
            updated: 0,
            failed: 0,
            conflicts: 0,
            pushed: 0,
            error_details: Vec::new(),
            triggered_by: triggered_by.to_string(),
        }
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    pub fn add_error(&mut self, entity_type: &str, entity_id: &str, error: impl ToString) {
        self.error_details.push(SyncErrorDetail {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.error_details.is_empty()
    }
}

/// A local user account, keyed by normalized email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    /// Always stored lowercase; see [`normalize_email`].
    pub email: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile details attached to a user account, refreshed on every import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub given_name: String,
    pub family_name: String,
    pub affiliation: Option<String>,
    pub orcid: Option<String>,
    pub country: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub given_name: String,
    pub family_name: String,
    pub affiliation: Option<String>,
    pub orcid: Option<String>,
    pub country: Option<String>,
}

impl NewUser {
    /// Returns a copy with the email in canonical form, so that identity
    /// resolution never depends on remote casing or stray whitespace.
    pub fn normalized(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self
    }
}

/// Canonical form of an email address used for identity resolution:
/// trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SubmissionStatus {
    Queued,
    Published,
    Declined,
    Scheduled,
}

impl SubmissionStatus {
    /// Maps the numeric status codes used by the OJS API. Unknown codes
    /// fall back to `Queued` rather than failing the whole item.
    pub fn from_remote_code(code: i64) -> Self {
        match code {
            3 => Self::Published,
            4 => Self::Declined,
            5 => Self::Scheduled,
            _ => Self::Queued,
        }
    }

    pub fn remote_code(self) -> i64 {
        match self {
            Self::Queued => 1,
            Self::Published => 3,
            Self::Declined => 4,
            Self::Scheduled => 5,
        }
    }
}

/// A manuscript tracked by the local journal-management database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub journal_id: i64,
    pub title: String,
    pub abstract_text: Option<String>,
    pub section: Option<String>,
    pub keywords: Vec<String>,
    pub status: SubmissionStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub journal_id: i64,
    pub title: String,
    pub abstract_text: Option<String>,
    pub section: Option<String>,
    pub keywords: Vec<String>,
    pub status: SubmissionStatus,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// One author's position on a submission's byline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorContribution {
    pub submission_id: i64,
    pub user_id: i64,
    /// Byline order, starting at 0.
    pub seq: i32,
    pub role: String,
    pub primary_contact: bool,
}

/// A named file slot on a submission, e.g. the `PDF` galley.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub submission_id: i64,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// One stored revision of a document. Revisions are content-addressed:
/// (`document_id`, `file_name`, `sha256`) is unique, so re-importing an
/// unchanged file is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: i64,
    pub document_id: i64,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocumentVersion {
    pub document_id: i64,
    pub file_name: String,
    pub content_type: String,
    pub sha256: String,
    /// Raw file bytes, stored inline by the backend.
    pub content: Vec<u8>,
}

/// A published (or planned) issue of a journal, keyed per journal by its
/// remote identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub journal_id: i64,
    pub remote_issue_id: i64,
    pub volume: Option<i32>,
    pub number: Option<String>,
    pub year: Option<i32>,
    pub title: Option<String>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    pub journal_id: i64,
    pub remote_issue_id: i64,
    pub volume: Option<i32>,
    pub number: Option<String>,
    pub year: Option<i32>,
    pub title: Option<String>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ReviewRecommendation {
    Accept,
    PendingRevisions,
    ResubmitHere,
    ResubmitElsewhere,
    Decline,
    SeeComments,
}

impl ReviewRecommendation {
    /// Maps the numeric recommendation codes used by the OJS API.
    pub fn from_remote_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Accept),
            2 => Some(Self::PendingRevisions),
            3 => Some(Self::ResubmitHere),
            4 => Some(Self::ResubmitElsewhere),
            5 => Some(Self::Decline),
            6 => Some(Self::SeeComments),
            _ => None,
        }
    }
}

/// A review assignment on a submission, keyed by its remote identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub submission_id: i64,
    pub reviewer_id: i64,
    pub remote_review_id: i64,
    pub round: i32,
    pub recommendation: Option<ReviewRecommendation>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub submission_id: i64,
    pub reviewer_id: i64,
    pub remote_review_id: i64,
    pub round: i32,
    pub recommendation: Option<ReviewRecommendation>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// An editorial discussion note on a submission, keyed by its remote
/// identifier. `author_id` is `None` when the remote participant could
/// not be resolved to a local account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub submission_id: i64,
    pub author_id: Option<i64>,
    pub remote_comment_id: i64,
    pub title: Option<String>,
    pub body: String,
    pub posted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComment {
    pub submission_id: i64,
    pub author_id: Option<i64>,
    pub remote_comment_id: i64,
    pub title: Option<String>,
    pub body: String,
    pub posted_at: DateTime<Utc>,
}

/// How a journal is addressed from the CLI: by numeric id or by code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JournalSelector {
    Code(String),
    Id(i64),
}

impl std::str::FromStr for JournalSelector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("journal selector must not be empty"));
        }
        match s.parse::<i64>() {
            Ok(id) => Ok(Self::Id(id)),
            Err(_) => Ok(Self::Code(s.to_string())),
        }
    }
}

impl std::fmt::Display for JournalSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{}", code),
            Self::Id(id) => write!(f, "#{}", id),
        }
    }
}
