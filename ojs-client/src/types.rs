//! Wire types of the OJS REST API.
//!
//! Fields that remote installations have been observed to omit are
//! optional or defaulted, so that one sparse record never fails a whole
//! page of results. Validation of required fields happens in the
//! importer, per item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Paged list envelope: `{ "items": [...], "itemsMax": 123 }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Total number of matching records on the remote side.
    #[serde(default)]
    pub items_max: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJournal {
    pub id: i64,
    #[serde(default)]
    pub url_path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSubmission {
    pub id: i64,
    /// Absent on malformed records; the importer skips those.
    pub title: Option<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Numeric OJS status code; see the importer for the mapping.
    #[serde(default = "default_status_code")]
    pub status: i64,
    #[serde(default)]
    pub date_submitted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authors: Vec<RemoteAuthor>,
    #[serde(default)]
    pub galleys: Vec<RemoteGalley>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAuthor {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub orcid: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Byline order on the remote side.
    #[serde(default)]
    pub seq: i32,
    #[serde(default)]
    pub primary_contact: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGalley {
    pub id: i64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Absolute download URL for the galley file.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUser {
    pub id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub orcid: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIssue {
    pub id: i64,
    #[serde(default)]
    pub volume: Option<i32>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub date_published: Option<DateTime<Utc>>,
}

/// A person referenced from a review or discussion note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteParticipant {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReview {
    pub id: i64,
    #[serde(default = "default_round")]
    pub round: i32,
    /// Numeric OJS recommendation code, once the review is submitted.
    #[serde(default)]
    pub recommendation: Option<i64>,
    #[serde(default)]
    pub date_assigned: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_completed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reviewer: Option<RemoteParticipant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteComment {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    /// Absent on malformed records; the resolver skips those.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<RemoteParticipant>,
    #[serde(default)]
    pub date_posted: Option<DateTime<Utc>>,
}

/// Metadata body for article create/update calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePatch {
    pub title: String,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub keywords: Vec<String>,
    pub status: i64,
}

fn default_true() -> bool {
    true
}

fn default_status_code() -> i64 {
    1
}

fn default_round() -> i32 {
    1
}
