// MarketplaceOptions: the main configuration struct.
//
// Deserializable from JSON/TOML-shaped config (camelCase keys) or assembled
// from environment variables with `MarketplaceOptions::from_env`.

use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::MarketError;

/// Minimum secret length accepted in production.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Top-level configuration for a RouteMarket deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceOptions {
    /// Secret used to sign session tokens.
    pub secret: String,

    /// Public base URL of the application (used in email links).
    #[serde(default = "default_app_url")]
    pub app_url: String,

    /// Display name used in email subjects.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Database connection string. `None` selects the in-memory store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Payment configuration.
    #[serde(default)]
    pub payments: PaymentOptions,

    /// Free-tier download token configuration.
    #[serde(default)]
    pub downloads: DownloadOptions,

    /// Session token configuration.
    #[serde(default)]
    pub session: SessionOptions,

    /// Transactional email configuration.
    #[serde(default)]
    pub email: EmailOptions,

    /// Object storage configuration.
    #[serde(default)]
    pub storage: StorageOptions,
}

/// Payment-provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOptions {
    /// Stripe secret key. `None` disables outbound payment creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_secret_key: Option<String>,
    /// Stripe webhook signing secret.
    #[serde(default)]
    pub webhook_secret: String,
    /// Accepted clock skew for webhook timestamps, in seconds. `None` disables the check.
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: Option<i64>,
    /// ISO currency code for one-time purchases.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Plan assigned when a subscription event carries no known price id.
    #[serde(default = "default_plan")]
    pub default_plan: String,
}

impl Default for PaymentOptions {
    fn default() -> Self {
        Self {
            stripe_secret_key: None,
            webhook_secret: String::new(),
            webhook_tolerance_secs: default_webhook_tolerance(),
            currency: default_currency(),
            default_plan: default_plan(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    /// Lifetime of an email download token, in seconds (default: 24h).
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
    /// Source label recorded on email subscribers created by the gate.
    #[serde(default = "default_subscriber_source")]
    pub subscriber_source: String,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl(),
            subscriber_source: default_subscriber_source(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// Session token lifetime in seconds (default: 7 days).
    #[serde(default = "default_session_ttl")]
    pub expires_in_secs: u64,
    #[serde(default = "default_min_password")]
    pub min_password_length: usize,
    #[serde(default = "default_max_password")]
    pub max_password_length: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            expires_in_secs: default_session_ttl(),
            min_password_length: default_min_password(),
            max_password_length: default_max_password(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailOptions {
    /// Resend API key. `None` logs emails instead of sending them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resend_api_key: Option<String>,
    /// Sender address.
    #[serde(default)]
    pub from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageOptions {
    /// Directory that uploaded files are written to.
    #[serde(default = "default_storage_dir")]
    pub directory: String,
    /// Public URL prefix under which `directory` is served.
    #[serde(default = "default_storage_url")]
    pub public_url: String,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            directory: default_storage_dir(),
            public_url: default_storage_url(),
        }
    }
}

fn default_app_url() -> String { "http://localhost:3000".to_string() }
fn default_app_name() -> String { "RouteMarket".to_string() }
fn default_webhook_tolerance() -> Option<i64> { Some(300) }
fn default_currency() -> String { "usd".to_string() }
fn default_plan() -> String { "monthly".to_string() }
fn default_token_ttl() -> i64 { 24 * 60 * 60 }
fn default_subscriber_source() -> String { "route_download".to_string() }
fn default_session_ttl() -> u64 { 7 * 24 * 60 * 60 }
fn default_min_password() -> usize { 8 }
fn default_max_password() -> usize { 128 }
fn default_storage_dir() -> String { "./uploads".to_string() }
fn default_storage_url() -> String { "http://localhost:3000/uploads".to_string() }

impl MarketplaceOptions {
    /// Create options with the given secret and defaults for everything else.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            app_url: default_app_url(),
            app_name: default_app_name(),
            database_url: None,
            payments: PaymentOptions::default(),
            downloads: DownloadOptions::default(),
            session: SessionOptions::default(),
            email: EmailOptions::default(),
            storage: StorageOptions::default(),
        }
    }

    /// Assemble options from environment variables.
    pub fn from_env() -> Result<Self, MarketError> {
        let secret = env::var("ROUTEMARKET_SECRET")
            .ok_or_else(|| MarketError::Config("ROUTEMARKET_SECRET is not set".into()))?;

        let mut options = Self::new(secret);
        if let Some(url) = env::var("APP_URL") {
            options.app_url = url;
        }
        options.database_url = env::var("DATABASE_URL");
        options.payments.stripe_secret_key = env::var("STRIPE_SECRET_KEY");
        if let Some(secret) = env::var("STRIPE_WEBHOOK_SECRET") {
            options.payments.webhook_secret = secret;
        }
        options.email.resend_api_key = env::var("RESEND_API_KEY");
        if let Some(from) = env::var("EMAIL_FROM") {
            options.email.from = from;
        }
        if let Some(dir) = env::var("STORAGE_DIR") {
            options.storage.directory = dir;
        }
        if let Some(url) = env::var("STORAGE_PUBLIC_URL") {
            options.storage.public_url = url;
        }

        options.validate()?;
        Ok(options)
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.secret.is_empty() {
            return Err(MarketError::Config("secret must not be empty".into()));
        }
        if env::is_production() && self.secret.len() < MIN_SECRET_LENGTH {
            return Err(MarketError::Config(format!(
                "secret must be at least {MIN_SECRET_LENGTH} characters in production"
            )));
        }
        if self.downloads.token_ttl_secs <= 0 {
            return Err(MarketError::Config("download token lifetime must be positive".into()));
        }
        if self.session.min_password_length > self.session.max_password_length {
            return Err(MarketError::Config("min password length exceeds max".into()));
        }
        Ok(())
    }

    /// Builder-style setter for the webhook signing secret.
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.payments.webhook_secret = secret.into();
        self
    }

    /// Builder-style setter for the application URL.
    pub fn with_app_url(mut self, url: impl Into<String>) -> Self {
        self.app_url = url.into();
        self
    }
}
