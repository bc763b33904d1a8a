//! Error types for the Artifactory provider.

use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors that can occur while executing a provider operation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote object does not exist (HTTP 404).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Pre-flight validation failed before any network call was made.
    #[error("Validation error: {}", summaries(.0))]
    Validation(Vec<Diagnostic>),

    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote system answered with a structured error body.
    #[error("{message}")]
    Remote {
        /// HTTP status code of the response.
        status: u16,
        /// Error message decoded from the body, surfaced verbatim.
        message: String,
    },

    /// Non-2xx response without a structured error body.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code of the response.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation is not supported by this resource type.
    #[error("{0}")]
    Unimplemented(String),

    /// A persisted state could not be upgraded to the current schema version.
    #[error("State upgrade error: {0}")]
    Upgrade(String),
}

impl ProviderError {
    /// Build a validation error from a single summary.
    pub fn validation(summary: impl Into<String>) -> Self {
        Self::Validation(vec![Diagnostic::error(summary)])
    }

    /// Whether this error is the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Remote { status, .. } | Self::Http { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// HTTP status carried by the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            _ => None,
        }
    }

    /// Convert the error into diagnostics for the host.
    ///
    /// Validation errors keep their individual diagnostics; everything else
    /// becomes a single error diagnostic.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        match self {
            Self::Validation(diagnostics) => diagnostics,
            Self::Remote { status, message } => {
                vec![Diagnostic::error(message).with_detail(format!("HTTP status {}", status))]
            }
            other => vec![Diagnostic::error(other.to_string())],
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {}", err))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

fn summaries(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.summary.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("token-123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: token-123");

        let err = ProviderError::UnknownResource("artifactory_nope".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: artifactory_nope");

        let err = ProviderError::Http {
            status: 502,
            body: "Bad Gateway".to_string(),
        };
        assert_eq!(format!("{}", err), "HTTP 502: Bad Gateway");
    }

    #[test]
    fn test_validation_display_joins_errors_only() {
        let err = ProviderError::Validation(vec![
            Diagnostic::error("first"),
            Diagnostic::warning("ignored"),
            Diagnostic::error("second"),
        ]);
        assert_eq!(format!("{}", err), "Validation error: first; second");
    }

    #[test]
    fn test_remote_error_surfaces_message_verbatim() {
        let err = ProviderError::Remote {
            status: 400,
            message: "Repository key already exists".to_string(),
        };
        assert_eq!(format!("{}", err), "Repository key already exists");

        let diags = err.into_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Repository key already exists");
        assert_eq!(diags[0].detail.as_deref(), Some("HTTP status 400"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(ProviderError::NotFound("x".into()).is_not_found());
        assert!(ProviderError::Http {
            status: 404,
            body: String::new()
        }
        .is_not_found());
        assert!(!ProviderError::Transport("refused".into()).is_not_found());
        assert_eq!(ProviderError::Configuration("x".into()).status(), None);
    }

    #[test]
    fn test_validation_into_diagnostics_keeps_all() {
        let err = ProviderError::Validation(vec![
            Diagnostic::error("a").with_attribute("scopes"),
            Diagnostic::error("b").with_attribute("audiences"),
        ]);
        let diags = err.into_diagnostics();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[1].attribute.as_deref(), Some("audiences"));
    }
}
