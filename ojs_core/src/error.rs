use crate::types::MappingStatus;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by store implementations.
///
/// Backend-specific failures (connection loss, SQL errors) are reduced to
/// `Backend` so that callers never depend on a particular driver.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Rejected move in the mapping state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid mapping transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: MappingStatus,
    pub to: MappingStatus,
}
