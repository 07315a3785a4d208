// Error taxonomy shared by every RouteMarket crate.
//
// `StoreError` is what storage adapters return. `MarketError` is what the
// marketplace operations return; each variant carries a stable `ErrorCode`
// and maps onto one HTTP status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RouteNotFound,
    UserNotFound,
    SubscriptionNotFound,
    DownloadTokenNotFound,
    DownloadLinkExpired,
    RouteNotFree,
    RouteIsFree,
    AlreadyPurchased,
    DuplicatePayment,
    DuplicateRecord,
    UserAlreadyExists,
    InvalidEmail,
    InvalidEmailOrPassword,
    PasswordTooShort,
    PasswordTooLong,
    InvalidRouteData,
    InvalidPagination,
    MissingPaymentMetadata,
    MissingSubscriptionUser,
    MissingSignature,
    InvalidWebhookSignature,
    InvalidWebhookPayload,
    InvalidSession,
    Unauthorized,
    Forbidden,
    PaymentProviderFailed,
    StorageFailed,
    InternalServerError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::RouteNotFound => "Route not found",
            Self::UserNotFound => "User not found",
            Self::SubscriptionNotFound => "Subscription not found",
            Self::DownloadTokenNotFound => "Invalid or expired download link",
            Self::DownloadLinkExpired => "Download link has expired",
            Self::RouteNotFree => "This route is not free",
            Self::RouteIsFree => "This route is free",
            Self::AlreadyPurchased => "Already purchased",
            Self::DuplicatePayment => "Route already paid for under a different transaction",
            Self::DuplicateRecord => "Record already exists",
            Self::UserAlreadyExists => "User already exists",
            Self::InvalidEmail => "Invalid email",
            Self::InvalidEmailOrPassword => "Invalid email or password",
            Self::PasswordTooShort => "Password too short",
            Self::PasswordTooLong => "Password too long",
            Self::InvalidRouteData => "Invalid route data",
            Self::InvalidPagination => "Invalid pagination parameters",
            Self::MissingPaymentMetadata => "Payment is missing user or route metadata",
            Self::MissingSubscriptionUser => "Subscription is missing user metadata",
            Self::MissingSignature => "No signature",
            Self::InvalidWebhookSignature => "Webhook signature verification failed",
            Self::InvalidWebhookPayload => "Webhook payload could not be parsed",
            Self::InvalidSession => "Invalid session",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::PaymentProviderFailed => "Failed to create payment",
            Self::StorageFailed => "Storage failure",
            Self::InternalServerError => "Internal server error",
        };
        write!(f, "{msg}")
    }
}

/// HTTP status codes used by the API error system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpStatus {
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    Conflict = 409,
    Gone = 410,
    InternalServerError = 500,
    BadGateway = 502,
}

impl HttpStatus {
    pub fn status_code(&self) -> u16 {
        *self as u16
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_code())
    }
}

/// Errors raised by storage adapters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("unique constraint violated on {model}({})", .fields.join(", "))]
    UniqueViolation { model: String, fields: Vec<String> },

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transaction error: {0}")]
    Transaction(String),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Error returned by marketplace operations.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("{0}")]
    NotFound(ErrorCode),

    #[error("{0}")]
    Conflict(ErrorCode),

    #[error("{0}")]
    Expired(ErrorCode),

    #[error("{message}")]
    InvalidRequest { code: ErrorCode, message: String },

    #[error("{0}")]
    Unauthorized(ErrorCode),

    #[error("{0}")]
    Forbidden(ErrorCode),

    #[error(transparent)]
    Store(StoreError),

    #[error("{code}: {message}")]
    Provider { code: ErrorCode, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MarketError {
    pub fn invalid(code: ErrorCode) -> Self {
        Self::InvalidRequest {
            code,
            message: code.to_string(),
        }
    }

    pub fn invalid_with(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            code,
            message: message.into(),
        }
    }

    pub fn provider(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Provider {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(code)
            | Self::Conflict(code)
            | Self::Expired(code)
            | Self::Unauthorized(code)
            | Self::Forbidden(code) => *code,
            Self::InvalidRequest { code, .. } | Self::Provider { code, .. } => *code,
            Self::Store(_) => ErrorCode::StorageFailed,
            Self::Config(_) => ErrorCode::InternalServerError,
        }
    }

    pub fn status(&self) -> HttpStatus {
        match self {
            Self::NotFound(_) => HttpStatus::NotFound,
            Self::Conflict(_) => HttpStatus::Conflict,
            Self::Expired(_) => HttpStatus::Gone,
            Self::InvalidRequest { .. } => HttpStatus::BadRequest,
            Self::Unauthorized(_) => HttpStatus::Unauthorized,
            Self::Forbidden(_) => HttpStatus::Forbidden,
            Self::Provider { .. } => HttpStatus::BadGateway,
            Self::Store(_) | Self::Config(_) => HttpStatus::InternalServerError,
        }
    }

    /// Message safe to show to API callers. Internal failures are not echoed.
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(_) | Self::Config(_) => ErrorCode::InternalServerError.to_string(),
            Self::Provider { code, .. } => code.to_string(),
            other => other.to_string(),
        }
    }

    /// Build a JSON body for the error response.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code(),
            "message": self.public_message(),
        })
    }
}

/// Unique violations surface as `Conflict`; everything else stays a store failure.
impl From<StoreError> for MarketError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation { .. } => Self::Conflict(ErrorCode::DuplicateRecord),
            other => Self::Store(other),
        }
    }
}

/// Unified result type for marketplace operations.
pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(MarketError::NotFound(ErrorCode::RouteNotFound).status(), HttpStatus::NotFound);
        assert_eq!(MarketError::Conflict(ErrorCode::DuplicatePayment).status(), HttpStatus::Conflict);
        assert_eq!(MarketError::Expired(ErrorCode::DownloadLinkExpired).status(), HttpStatus::Gone);
        assert_eq!(MarketError::invalid(ErrorCode::RouteNotFree).status(), HttpStatus::BadRequest);
        assert_eq!(
            MarketError::Unauthorized(ErrorCode::InvalidWebhookSignature).status(),
            HttpStatus::Unauthorized
        );
    }

    #[test]
    fn test_unique_violation_becomes_conflict() {
        let err: MarketError = StoreError::UniqueViolation {
            model: "purchase".into(),
            fields: vec!["transactionId".into()],
        }
        .into();
        assert!(matches!(err, MarketError::Conflict(ErrorCode::DuplicateRecord)));
    }

    #[test]
    fn test_store_error_message_is_hidden() {
        let err: MarketError = StoreError::Database("connection refused".into()).into();
        assert_eq!(err.status(), HttpStatus::InternalServerError);
        assert!(!err.public_message().contains("connection refused"));
    }

    #[test]
    fn test_to_json_uses_screaming_snake_code() {
        let body = MarketError::NotFound(ErrorCode::DownloadTokenNotFound).to_json();
        assert_eq!(body["code"], "DOWNLOAD_TOKEN_NOT_FOUND");
        assert_eq!(body["message"], "Invalid or expired download link");
    }
}
