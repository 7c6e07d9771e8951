use thiserror::Error;

pub type OjsResult<T> = Result<T, OjsError>;

/// Typed failures of one remote API call.
///
/// The variants follow the failure modes actually seen in front of OJS
/// installations: bad keys, under-privileged keys, wrong base paths, and
/// intermediary appliances answering instead of the API.
#[derive(Debug, Error)]
pub enum OjsError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("remote resource not found: {0}")]
    NotFound(String),

    #[error("remote refused the request: {0}")]
    NotAcceptable(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode remote payload: {0}")]
    Decode(String),
}

impl OjsError {
    /// Operator-facing hint printed alongside the error.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "verify the journal's API key",
            Self::Authorization(_) => {
                "the API key is valid but under-privileged; check the remote account's roles"
            }
            Self::NotFound(_) => "check the journal's base URL and the remote API version",
            Self::NotAcceptable(_) => {
                "check for a firewall or proxy answering in front of the remote instance"
            }
            Self::Transport(_) => "check network connectivity to the journal's base URL",
            Self::Api { .. } => "inspect the remote error body; the remote instance may be down",
            Self::Decode(_) => {
                "the response was not the expected JSON; check API version compatibility"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_message_names_authentication() {
        let err = OjsError::Authentication("the remote rejected the API key".to_string());
        assert!(err.to_string().contains("authentication"));
    }

    #[test]
    fn test_remediation_covers_every_variant() {
        let api = OjsError::Api {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(!api.remediation().is_empty());
        assert!(
            OjsError::Authentication(String::new())
                .remediation()
                .contains("API key")
        );
        assert!(
            OjsError::NotAcceptable(String::new())
                .remediation()
                .contains("firewall")
        );
    }
}
