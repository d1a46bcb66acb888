//! Error types for payment provider calls.

use reportgate_types::{ErrorCode, TypesError};
use thiserror::Error;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur while talking to a payment provider.
///
/// A provider saying a *payment* failed is not an error; it is reported as
/// [`VerificationStatus::Failed`](reportgate_types::VerificationStatus).
/// These variants cover requests the provider could not or would not
/// process.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Connection-level failure (retryable).
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded its deadline (retryable).
    #[error("provider request timed out: {0}")]
    Timeout(String),

    /// Provider is overloaded or failing (retryable).
    #[error("provider unavailable ({status}): {body}")]
    Unavailable {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// Credentials were refused.
    #[error("provider refused credentials: {0}")]
    Unauthorized(String),

    /// Provider rejected the request.
    #[error("provider rejected request: {message}")]
    Rejected {
        /// Provider's message
        message: String,
        /// Raw response body
        raw: String,
    },

    /// Response could not be understood.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// Amount could not be expressed in minor units.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Provider is not configured.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Create a new Network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new Timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new Rejected error.
    pub fn rejected(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Create a new Malformed error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Create a new Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::Unavailable { .. }
        )
    }

    /// Whether the provider may have received the request.
    ///
    /// Network errors are ambiguous: the request may have reached the
    /// provider before the connection broke.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Raw provider body, when the provider answered.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::Rejected { raw, .. } => Some(raw),
            Self::Unavailable { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Stable error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Network(_) | Self::Unavailable { .. } => ErrorCode::GatewayUnavailable,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Unauthorized(_) => ErrorCode::GatewayUnauthorized,
            Self::Rejected { .. } | Self::InvalidAmount(_) => ErrorCode::GatewayRejected,
            Self::Malformed(_) => ErrorCode::GatewayMalformed,
            Self::Config(_) => ErrorCode::Config,
        }
    }

    /// Returns a user-friendly suggestion for recovering from this error.
    pub fn suggestion(&self) -> &'static str {
        self.error_code()
            .suggestion()
            .unwrap_or("Try again later")
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<TypesError> for GatewayError {
    fn from(e: TypesError) -> Self {
        match e {
            TypesError::AmountOverflow(_) | TypesError::FractionalAmount(_) => {
                Self::InvalidAmount(e.to_string())
            }
            other => Self::Malformed(other.to_string()),
        }
    }
}
