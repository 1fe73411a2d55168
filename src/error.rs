//! Error types for engagement lookups
//!
//! Errors are classified by how the caller should react:
//! - Retryable: rate limits, upstream failures
//! - NonRetryable: missing credentials, bad input
//!
//! Sub-step failures inside the pipeline (one kind, one record) never reach
//! this type; they degrade to empty results where they happen.

use thiserror::Error;

use crate::hubspot::client::HubSpotError;

/// Request-level failure of an engagement lookup.
#[derive(Debug, Clone, Error)]
pub enum EngagementError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upstream rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Upstream error (status {status:?}): {message}")]
    Upstream { status: Option<u16>, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl EngagementError {
    /// Returns true if the same request may succeed later without user action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngagementError::RateLimited { .. } | EngagementError::Upstream { .. }
        )
    }

    /// HTTP-equivalent status for the consumer-facing boundary
    pub fn status_code(&self) -> u16 {
        match self {
            EngagementError::Configuration(_) => 503,
            EngagementError::RateLimited { .. } => 429,
            EngagementError::Upstream { .. } => 500,
            EngagementError::InvalidRequest(_) => 400,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngagementError::Configuration(_) => ErrorKind::ConfigurationUnavailable,
            EngagementError::RateLimited { .. } => ErrorKind::RateLimited,
            EngagementError::Upstream { .. } => ErrorKind::UpstreamFailure,
            EngagementError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EngagementError::Configuration(_) => {
                "Set HUBSPOT_ACCESS_TOKEN or add hubspot.accessToken to ~/.prospector/config.json"
            }
            EngagementError::RateLimited { .. } => "Wait a moment and try again.",
            EngagementError::Upstream { .. } => "Couldn't load engagement history. Try again.",
            EngagementError::InvalidRequest(_) => "Check the contact or company id.",
        }
    }
}

impl From<HubSpotError> for EngagementError {
    fn from(err: HubSpotError) -> Self {
        match err {
            HubSpotError::NoAccessToken => {
                EngagementError::Configuration("HubSpot not configured".to_string())
            }
            HubSpotError::RateLimited { retry_after_secs } => {
                EngagementError::RateLimited { retry_after_secs }
            }
            HubSpotError::MissingScopes(message) => EngagementError::Upstream {
                status: Some(403),
                message,
            },
            HubSpotError::Api { status, message } => EngagementError::Upstream {
                status: Some(status),
                message,
            },
            other => EngagementError::Upstream {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

/// Serializable error representation for consumers of the pipeline
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error: String,
    pub error_type: ErrorKind,
    pub status: u16,
    pub can_retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationUnavailable,
    RateLimited,
    UpstreamFailure,
    InvalidRequest,
}

impl From<&EngagementError> for ErrorPayload {
    fn from(err: &EngagementError) -> Self {
        let retry_after_secs = match err {
            EngagementError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        };
        // Upstream detail stays in the logs; consumers get the generic message.
        let error = match err {
            EngagementError::Upstream { .. } => err.recovery_suggestion().to_string(),
            _ => err.to_string(),
        };

        ErrorPayload {
            error,
            error_type: err.kind(),
            status: err.status_code(),
            can_retry: err.is_retryable(),
            retry_after_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            EngagementError::Configuration("x".into()).status_code(),
            503
        );
        assert_eq!(
            EngagementError::RateLimited {
                retry_after_secs: None
            }
            .status_code(),
            429
        );
        assert_eq!(
            EngagementError::Upstream {
                status: Some(502),
                message: "bad gateway".into()
            }
            .status_code(),
            500
        );
    }

    #[test]
    fn test_rate_limit_payload_carries_retry_hint() {
        let err = EngagementError::from(HubSpotError::RateLimited {
            retry_after_secs: Some(10),
        });
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.error_type, ErrorKind::RateLimited);
        assert_eq!(payload.retry_after_secs, Some(10));
        assert!(payload.can_retry);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["retryAfterSecs"], 10);
        assert_eq!(json["errorType"], "rate_limited");
    }

    #[test]
    fn test_missing_token_is_configuration_error() {
        let err = EngagementError::from(HubSpotError::NoAccessToken);
        assert_eq!(err.kind(), ErrorKind::ConfigurationUnavailable);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_upstream_payload_hides_detail() {
        let err = EngagementError::Upstream {
            status: Some(500),
            message: "stack trace from upstream".into(),
        };
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.error, "Couldn't load engagement history. Try again.");
        assert!(payload.retry_after_secs.is_none());
    }
}
