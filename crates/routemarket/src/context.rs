// Marketplace context: configuration, storage and collaborators shared by
// every operation. Handlers receive it as `Arc<MarketContext>`.

use std::sync::Arc;

use routemarket_core::db::adapter::{Adapter, SchemaOptions, SchemaStatus};
use routemarket_core::db::schema::MarketSchema;
use routemarket_core::error::{MarketError, Result};
use routemarket_core::options::MarketplaceOptions;
use routemarket_stripe::{Plan, StripeConfig};

use crate::email::{EmailSender, LogEmailSender, ResendEmailSender};
use crate::payments::{DisabledPaymentProvider, PaymentProvider, StripePaymentProvider};
use crate::storage::{FsObjectStorage, ObjectStorage};
use crate::store::MarketStore;

/// The fully-initialized marketplace, shared across request handlers.
pub struct MarketContext {
    pub options: MarketplaceOptions,
    pub store: MarketStore,
    /// Webhook secret, tolerance and the price → plan table.
    pub stripe: StripeConfig,
    pub payments: Arc<dyn PaymentProvider>,
    pub storage: Arc<dyn ObjectStorage>,
    pub email: Arc<dyn EmailSender>,
}

impl std::fmt::Debug for MarketContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketContext")
            .field("app_name", &self.options.app_name)
            .field("app_url", &self.options.app_url)
            .field("secret", &"[REDACTED]")
            .field("store", &self.store)
            .field("payments", &self.payments)
            .field("storage", &self.storage)
            .field("email", &self.email)
            .finish()
    }
}

fn stripe_config(options: &MarketplaceOptions) -> StripeConfig {
    let payments = &options.payments;
    let mut config = StripeConfig::new(
        payments.stripe_secret_key.clone().unwrap_or_default(),
        payments.webhook_secret.clone(),
    );
    config.tolerance_secs = payments.webhook_tolerance_secs;
    config.default_plan = payments.default_plan.clone();
    config
}

impl MarketContext {
    /// Build a context, choosing collaborators from the options: Stripe when a
    /// secret key is set, Resend when an API key is set, otherwise log-only
    /// email, and filesystem storage.
    pub fn new(options: MarketplaceOptions, adapter: Arc<dyn Adapter>) -> Self {
        let stripe = stripe_config(&options);

        let payments: Arc<dyn PaymentProvider> = if stripe.secret_key.is_empty() {
            tracing::warn!("STRIPE_SECRET_KEY not set; payment initiation is disabled");
            Arc::new(DisabledPaymentProvider)
        } else {
            Arc::new(StripePaymentProvider::new(&stripe))
        };

        let email: Arc<dyn EmailSender> = match &options.email.resend_api_key {
            Some(key) => Arc::new(ResendEmailSender::new(key.clone(), options.email.from.clone())),
            None => Arc::new(LogEmailSender),
        };

        let storage: Arc<dyn ObjectStorage> = Arc::new(FsObjectStorage::new(
            options.storage.directory.clone(),
            options.storage.public_url.clone(),
        ));

        Self {
            options,
            store: MarketStore::new(adapter),
            stripe,
            payments,
            storage,
            email,
        }
    }

    /// Validate options, create missing tables and wrap the context for sharing.
    pub async fn init(options: MarketplaceOptions, adapter: Arc<dyn Adapter>) -> Result<Arc<Self>> {
        options.validate()?;
        let ctx = Self::new(options, adapter);
        ctx.ensure_schema().await?;
        tracing::info!(app = %ctx.options.app_name, "marketplace initialized");
        Ok(Arc::new(ctx))
    }

    /// Create any missing marketplace tables.
    pub async fn ensure_schema(&self) -> Result<()> {
        let status = self
            .store
            .adapter()
            .create_schema(&MarketSchema::marketplace(), &SchemaOptions { auto_migrate: true })
            .await?;
        match status {
            SchemaStatus::UpToDate => Ok(()),
            SchemaStatus::NeedsMigration { statements } => Err(MarketError::Config(format!(
                "{} schema statements were not applied",
                statements.len()
            ))),
        }
    }

    pub fn with_payment_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.payments = provider;
        self
    }

    pub fn with_object_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_email_sender(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = sender;
        self
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.stripe.plans.push(plan);
        self
    }

    fn app_url(&self) -> &str {
        self.options.app_url.trim_end_matches('/')
    }

    /// Public link that redeems a free-tier download token.
    pub fn download_url(&self, token: &str) -> String {
        format!("{}/api/routes/download/{}", self.app_url(), token)
    }

    /// Dashboard page of a purchased route.
    pub fn route_dashboard_url(&self, route_id: &str) -> String {
        format!("{}/dashboard/routes/{}", self.app_url(), route_id)
    }
}
