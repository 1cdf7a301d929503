//! Error types for the Atlas provider.
//!
//! [`ProviderError`] is what every resource, data source and client call
//! returns. The server turns it into an error diagnostic on the response.

use serde::Deserialize;
use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors raised while serving provider requests.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote object does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Configuration or state failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider block could not be turned into a working client.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A resource or data source operation ran before `Configure`.
    #[error("Provider not configured: call Configure before managing {0}")]
    NotConfigured(String),

    /// The host asked for a type this provider does not serve.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request never produced a response.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The management API answered with an error document.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// A waiter ran out of time.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The remote object is in a state the operation cannot continue from.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The operation is not supported for this type.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// The request itself is malformed, e.g. an unparsable import id.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Anything else that went wrong inside the provider.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// The bare message, without the variant prefix added by `Display`.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::NotConfigured(msg)
            | Self::UnknownResource(msg)
            | Self::DeadlineExceeded(msg)
            | Self::FailedPrecondition(msg)
            | Self::Unimplemented(msg)
            | Self::InvalidRequest(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::Serialization(err) => err.to_string(),
            Self::Http(err) => err.to_string(),
            Self::Api(err) => err.detail.clone(),
        }
    }

    /// The API error document, if this error came from one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// The platform error code (`GROUP_NOT_FOUND`, `CONTAINERS_IN_USE`, ...).
    pub fn error_code(&self) -> Option<&str> {
        self.api_error().map(|e| e.error_code.as_str())
    }

    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        self.api_error().map(|e| e.status)
    }

    /// True for a missing remote object, whichever way the API reported it.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Api(err) => err.status == 404 || err.error_code.ends_with("NOT_FOUND"),
            _ => false,
        }
    }

    /// Transient failures that the waiters and the HTTP client may retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api(err) => {
                matches!(err.status, 429 | 500 | 502 | 503 | 504)
                    || err.error_code == "UNEXPECTED_ERROR"
            }
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    /// The error as an error diagnostic for the host.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let summary = match self {
            Self::NotFound(_) => "Resource not found",
            Self::Validation(_) => "Invalid configuration",
            Self::Configuration(_) | Self::NotConfigured(_) => "Provider not configured",
            Self::UnknownResource(_) => "Unknown resource type",
            Self::Serialization(_) => "Invalid state document",
            Self::Http(_) => "Could not reach the Atlas API",
            Self::Api(_) => "Atlas API request failed",
            Self::DeadlineExceeded(_) => "Timed out waiting for Atlas",
            Self::FailedPrecondition(_) => "Operation not possible",
            Self::Unimplemented(_) => "Operation not supported",
            Self::InvalidRequest(_) => "Invalid request",
            Self::Internal(_) => "Internal provider error",
        };
        let detail = match self {
            Self::Api(err) => err.to_string(),
            other => other.message(),
        };
        Diagnostic::error(summary).with_detail(detail)
    }
}

/// An error document returned by the management API.
///
/// The API answers failures with a body such as
/// `{"error": 404, "errorCode": "GROUP_NOT_FOUND", "detail": "...", "reason": "Not Found"}`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP {status} ({error_code}): {detail}")]
pub struct ApiError {
    /// HTTP status code of the response.
    pub status: u16,
    /// Platform error code, empty when the body carried none.
    pub error_code: String,
    /// Human readable detail.
    pub detail: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl ApiError {
    /// Create an API error.
    pub fn new(status: u16, error_code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status,
            error_code: error_code.into(),
            detail: detail.into(),
        }
    }

    /// Build an error from a non-success response body.
    ///
    /// Bodies that are not an error document keep their raw text as detail.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => Self {
                status,
                error_code: parsed.error_code.unwrap_or_default(),
                detail: parsed
                    .detail
                    .or(parsed.reason)
                    .unwrap_or_else(|| body.to_string()),
            },
            Err(_) => Self::new(status, "", body),
        }
    }
}
