//! Version tags for conflict detection.
//!
//! A tag is a SHA-256 hex digest over the synced field set of one side.
//! Tags are opaque: the engine only ever compares a freshly computed tag
//! against the stored one for equality, never orders them. A submission
//! has changed on a side exactly when that side's tag no longer matches
//! the tag captured at the last successful sync.

use ojs_client::RemoteSubmission;
use ojs_core::types::Submission;
use sha2::{Digest, Sha256};

/// Tag of a remote submission payload.
pub fn remote_submission(sub: &RemoteSubmission) -> String {
    digest(&[
        sub.title.as_deref().unwrap_or(""),
        sub.abstract_text.as_deref().unwrap_or(""),
        sub.section.as_deref().unwrap_or(""),
        &sub.keywords.join("\u{1f}"),
        &sub.status.to_string(),
    ])
}

/// Tag of a local submission as last written.
pub fn local_submission(sub: &Submission) -> String {
    digest(&[
        &sub.title,
        sub.abstract_text.as_deref().unwrap_or(""),
        sub.section.as_deref().unwrap_or(""),
        &sub.keywords.join("\u{1f}"),
        &sub.status.remote_code().to_string(),
    ])
}

/// Content hash of one galley file.
pub fn file_sha256(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

// Fields are length-prefixed so that ("ab", "c") and ("a", "bc") never
// collide.
fn digest(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}
