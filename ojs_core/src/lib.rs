//! # Colophon Core
//!
//! Shared types and traits for the Colophon synchronization engine, which
//! keeps a local journal-management database aligned with per-journal
//! remote OJS (Open Journal Systems) instances.
//!
//! This crate provides:
//! - Domain records (journals, submissions, users, documents, reviews)
//! - The submission mapping record and its status state machine
//! - Store traits implemented by the persistence layer and by test doubles
//! - Error types shared across storage backends

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{InvalidTransition, StoreError, StoreResult};
pub use traits::{
    CommentStore, DocumentStore, IssueStore, JournalRegistry, MappingStore, ReviewStore,
    SubmissionStore, SyncLogStore, SyncStore, UserDirectory,
};
pub use types::{
    JournalSelector, JournalTenant, MappingStatus, OjsMapping, RunStatus, SyncDirection, SyncKind,
    SyncRun,
};
