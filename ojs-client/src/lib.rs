//! HTTP client for the OJS (Open Journal Systems) REST API.
//!
//! Each [`OjsClient`] carries the credentials of exactly one remote
//! instance; there is no process-wide connection or key state. All
//! non-2xx responses are mapped to a typed [`OjsError`] whose
//! [`remediation`](OjsError::remediation) text tells an operator what to
//! check.

pub mod client;
pub mod error;
pub mod types;

pub use client::{OjsApi, OjsClient, create_client};
pub use error::{OjsError, OjsResult};
pub use types::{
    ArticlePatch, Page, RemoteAuthor, RemoteComment, RemoteGalley, RemoteIssue, RemoteJournal,
    RemoteParticipant, RemoteReview, RemoteSubmission, RemoteUser,
};
