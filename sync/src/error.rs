use ojs_client::OjsError;
use ojs_core::error::{InvalidTransition, StoreError};
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote API error: {0}")]
    Remote(#[from] OjsError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A remote payload that cannot be imported, e.g. a submission
    /// without a title. Always an item-level failure.
    #[error("invalid payload: {0}")]
    Validation(String),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("journal not found: {0}")]
    JournalNotFound(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("sync pass cancelled")]
    Cancelled,
}

impl SyncError {
    /// Failure text recorded in run logs and printed to operators; for
    /// remote failures this includes the remediation hint.
    pub fn describe(&self) -> String {
        match self {
            Self::Remote(err) => format!("{} ({})", err, err.remediation()),
            other => other.to_string(),
        }
    }

    /// Whether the error aborts a whole tenant pass. Remote listing and
    /// credential failures do; everything item-scoped does not.
    pub fn is_batch_failure(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_describe_includes_remediation() {
        let err = SyncError::Remote(OjsError::Authentication(
            "the remote instance rejected the API key".to_string(),
        ));
        let text = err.describe();
        assert!(text.contains("authentication"));
        assert!(text.contains("API key"));
    }

    #[test]
    fn test_batch_failure_classification() {
        assert!(SyncError::Remote(OjsError::NotFound("/journals".to_string())).is_batch_failure());
        assert!(SyncError::Cancelled.is_batch_failure());
        assert!(!SyncError::Validation("missing title".to_string()).is_batch_failure());
        assert!(
            !SyncError::Store(StoreError::Constraint("duplicate".to_string())).is_batch_failure()
        );
    }
}
