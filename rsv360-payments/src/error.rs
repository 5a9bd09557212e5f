//! Error types for payment processing

use crate::types::Gateway;
use thiserror::Error;

/// Normalized payment error.
///
/// Every variant renders as `"{CODE}: {detail}"` so callers can match on the
/// machine-readable prefix regardless of which provider produced it.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Amount below the provider minimum
    #[error("INSUFFICIENT_AMOUNT: {0}")]
    InsufficientAmount(String),

    /// Malformed request
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),

    /// Card or payment declined by the provider
    #[error("CARD_DECLINED: {0}")]
    CardDeclined(String),

    /// Rate limited by the provider
    #[error("RATE_LIMIT: {0}")]
    RateLimited(String),

    /// Credentials rejected by the provider
    #[error("{}: {message}", .gateway.auth_error_code())]
    Authentication { gateway: Gateway, message: String },

    /// Provider-side failure (5xx or `api_error`)
    #[error("PROVIDER_API_ERROR: {0}")]
    ProviderApi(String),

    /// Transport failure before a response was received
    #[error("PROVIDER_CONNECTION_ERROR: {0}")]
    Connection(String),

    /// Refund requested against a payment that cannot be refunded
    #[error("REFUND_UNAVAILABLE: {0}")]
    RefundUnavailable(String),

    /// Gateway name not recognized by the factory
    #[error(
        "UNSUPPORTED_GATEWAY: '{name}' is not supported, available gateways: {}",
        .available.join(", ")
    )]
    UnsupportedGateway {
        name: String,
        available: Vec<&'static str>,
    },

    /// Invalid webhook signature
    #[error("INVALID_WEBHOOK_SIGNATURE: {0}")]
    InvalidWebhookSignature(String),

    /// Configuration error
    #[error("CONFIG_ERROR: {0}")]
    Config(String),

    /// Unexpected provider payload
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// Unclassified provider error
    #[error("PROVIDER_ERROR: {0}")]
    Provider(String),
}

/// Coarse classification used to decide how callers react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected locally or by the provider as malformed. Never retried.
    Validation,
    /// Declined by the provider. Terminal.
    Declined,
    /// Caller may retry with backoff.
    RateLimited,
    /// Misconfigured credentials. Operators should be alerted.
    Auth,
    /// Upstream or connection failure. Reads may be retried.
    Transient,
    /// Static misconfiguration (unknown gateway, bad settings).
    Configuration,
    /// The requested operation is not available for the payment's state.
    Unavailable,
    /// Anything else.
    Other,
}

impl PaymentError {
    /// Machine-readable error code (the message prefix).
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientAmount(_) => "INSUFFICIENT_AMOUNT",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::CardDeclined(_) => "CARD_DECLINED",
            Self::RateLimited(_) => "RATE_LIMIT",
            Self::Authentication { gateway, .. } => gateway.auth_error_code(),
            Self::ProviderApi(_) => "PROVIDER_API_ERROR",
            Self::Connection(_) => "PROVIDER_CONNECTION_ERROR",
            Self::RefundUnavailable(_) => "REFUND_UNAVAILABLE",
            Self::UnsupportedGateway { .. } => "UNSUPPORTED_GATEWAY",
            Self::InvalidWebhookSignature(_) => "INVALID_WEBHOOK_SIGNATURE",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Provider(_) => "PROVIDER_ERROR",
        }
    }

    /// Error classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientAmount(_) | Self::InvalidRequest(_) => ErrorKind::Validation,
            Self::InvalidWebhookSignature(_) => ErrorKind::Validation,
            Self::CardDeclined(_) => ErrorKind::Declined,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Authentication { .. } => ErrorKind::Auth,
            Self::ProviderApi(_) | Self::Connection(_) => ErrorKind::Transient,
            Self::UnsupportedGateway { .. } | Self::Config(_) => ErrorKind::Configuration,
            Self::RefundUnavailable(_) => ErrorKind::Unavailable,
            Self::Serialization(_) | Self::Provider(_) => ErrorKind::Other,
        }
    }

    /// Whether a caller may retry the failed operation.
    ///
    /// Only reads are safe to retry without an idempotency key.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::RateLimited | ErrorKind::Transient)
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::Serialization(err.to_string())
    }
}

/// Result type for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;
