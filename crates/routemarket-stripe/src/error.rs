//! Stripe error types.

/// Errors raised while verifying webhooks or talking to the Stripe API.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("No signature")]
    MissingSignature,

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Webhook timestamp is outside the tolerance window")]
    TimestampOutsideTolerance,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Missing metadata field `{0}`")]
    MissingMetadata(&'static str),

    #[error("Stripe API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl StripeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSignature => "MISSING_SIGNATURE",
            Self::InvalidSignature => "WEBHOOK_SIGNATURE_INVALID",
            Self::TimestampOutsideTolerance => "WEBHOOK_TIMESTAMP_OUT_OF_TOLERANCE",
            Self::InvalidPayload(_) => "INVALID_WEBHOOK_PAYLOAD",
            Self::MissingMetadata(_) => "MISSING_PAYMENT_METADATA",
            Self::Api { .. } => "STRIPE_API_ERROR",
            Self::Http(_) => "STRIPE_HTTP_ERROR",
        }
    }

    /// Whether the error means the webhook could not be authenticated.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature | Self::InvalidSignature | Self::TimestampOutsideTolerance
        )
    }
}

impl From<reqwest::Error> for StripeError {
    fn from(err: reqwest::Error) -> Self {
        StripeError::Http(err.to_string())
    }
}
