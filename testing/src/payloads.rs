//! Builders for OJS API payloads used with mock servers.
//!
//! Each builder returns a minimal valid record; tests mutate the fields
//! they care about.

use ojs_client::{
    RemoteAuthor, RemoteComment, RemoteGalley, RemoteIssue, RemoteParticipant, RemoteReview,
    RemoteSubmission, RemoteUser,
};
use serde::Serialize;
use serde_json::{Value, json};

pub fn submission_payload(id: i64, title: &str) -> RemoteSubmission {
    RemoteSubmission {
        id,
        title: Some(title.to_string()),
        abstract_text: None,
        section: None,
        keywords: Vec::new(),
        status: 1,
        date_submitted: None,
        authors: Vec::new(),
        galleys: Vec::new(),
    }
}

pub fn author_payload(email: &str, given: &str, family: &str, seq: i32) -> RemoteAuthor {
    RemoteAuthor {
        email: Some(email.to_string()),
        given_name: given.to_string(),
        family_name: family.to_string(),
        affiliation: None,
        orcid: None,
        country: None,
        seq,
        primary_contact: seq == 0,
    }
}

pub fn galley_payload(id: i64, label: &str, file_name: &str, url: &str) -> RemoteGalley {
    RemoteGalley {
        id,
        label: Some(label.to_string()),
        file_name: Some(file_name.to_string()),
        mime_type: Some("application/pdf".to_string()),
        url: Some(url.to_string()),
    }
}

pub fn user_payload(id: i64, email: &str) -> RemoteUser {
    RemoteUser {
        id,
        email: Some(email.to_string()),
        user_name: Some(email.split('@').next().unwrap_or("user").to_string()),
        given_name: "Test".to_string(),
        family_name: "User".to_string(),
        affiliation: None,
        orcid: None,
        country: None,
        disabled: false,
    }
}

pub fn issue_payload(id: i64, volume: i32, year: i32) -> RemoteIssue {
    RemoteIssue {
        id,
        volume: Some(volume),
        number: Some("1".to_string()),
        year: Some(year),
        title: None,
        published: true,
        date_published: None,
    }
}

pub fn participant_payload(email: &str, given: &str, family: &str) -> RemoteParticipant {
    RemoteParticipant {
        email: Some(email.to_string()),
        given_name: given.to_string(),
        family_name: family.to_string(),
    }
}

pub fn review_payload(id: i64, reviewer_email: &str) -> RemoteReview {
    RemoteReview {
        id,
        round: 1,
        recommendation: None,
        date_assigned: None,
        date_completed: None,
        reviewer: Some(participant_payload(reviewer_email, "Rita", "Reviewer")),
    }
}

pub fn comment_payload(id: i64, body: &str) -> RemoteComment {
    RemoteComment {
        id,
        title: None,
        body: Some(body.to_string()),
        author: None,
        date_posted: Some(chrono::Utc::now()),
    }
}

/// Wraps records in the `{items, itemsMax}` envelope the API returns.
pub fn page_body<T: Serialize>(items: &[T]) -> Value {
    json!({
        "items": items,
        "itemsMax": items.len(),
    })
}

/// An envelope claiming `total` matching records, for paging tests.
pub fn page_body_with_total<T: Serialize>(items: &[T], total: i64) -> Value {
    json!({
        "items": items,
        "itemsMax": total,
    })
}

pub fn empty_page() -> Value {
    json!({ "items": [], "itemsMax": 0 })
}
