//! # Sync Engine
//!
//! Keeps the local journal-management database aligned with per-journal
//! remote OJS instances. The engine is a set of plain async operations
//! (import one submission, run one pass, fan out over all journals, check
//! health) with scheduling layered on top as a thin wrapper, so every
//! operation stays callable and testable without a scheduler.
//!
//! Failure isolation is the organizing principle: one bad record never
//! aborts its batch, and one broken journal never prevents the others
//! from syncing. Batch failures are returned as data in summaries, not
//! raised.

pub mod error;
pub mod fingerprint;
pub mod health;
pub mod importer;
pub mod keyed_lock;
pub mod orchestrator;
pub mod report;
pub mod resolver;
pub mod scheduler;
pub mod settings;
pub mod worker;

pub use error::{SyncError, SyncResult};
pub use health::{HealthIssue, HealthMonitor};
pub use importer::{ImportOutcome, SubmissionImporter};
pub use keyed_lock::KeyedLocks;
pub use orchestrator::Orchestrator;
pub use report::{OrchestratorReport, PassOutcome, SyncSummary, TenantOutcome, TenantReport};
pub use resolver::UserResolver;
pub use scheduler::SyncScheduler;
pub use settings::SyncSettings;
pub use worker::SyncWorker;
