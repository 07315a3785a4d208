// Payment initiation and the payment-provider seam.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use routemarket_core::db::models::AccessType;
use routemarket_core::error::{ErrorCode, MarketError, Result};
use routemarket_stripe::{CreatePaymentIntent, PaymentIntent, StripeClient, StripeConfig};

use crate::accounts::UserRef;
use crate::context::MarketContext;

/// Metadata attached to every intent; echoed back by `payment_intent.succeeded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMetadata {
    pub user_id: String,
    pub route_id: String,
    pub route_title: String,
}

impl PaymentMetadata {
    fn pairs(&self) -> Vec<(String, String)> {
        vec![
            ("routeId".to_string(), self.route_id.clone()),
            ("userId".to_string(), self.user_id.clone()),
            ("routeTitle".to_string(), self.route_title.clone()),
        ]
    }
}

/// Creates payment intents with an external processor.
#[async_trait]
pub trait PaymentProvider: Send + Sync + std::fmt::Debug {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &PaymentMetadata,
    ) -> Result<PaymentIntent>;
}

/// Stripe-backed provider.
#[derive(Debug, Clone)]
pub struct StripePaymentProvider {
    client: StripeClient,
}

impl StripePaymentProvider {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: StripeClient::new(config),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripePaymentProvider {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &PaymentMetadata,
    ) -> Result<PaymentIntent> {
        let params = CreatePaymentIntent {
            amount: amount_minor,
            currency: currency.to_string(),
            metadata: metadata.pairs(),
        };
        self.client
            .create_payment_intent(&params)
            .await
            .map_err(|e| MarketError::provider(ErrorCode::PaymentProviderFailed, e.to_string()))
    }
}

/// Used when no Stripe key is configured; every call fails.
#[derive(Debug, Clone, Default)]
pub struct DisabledPaymentProvider;

#[async_trait]
impl PaymentProvider for DisabledPaymentProvider {
    async fn create_payment_intent(&self, _: i64, _: &str, _: &PaymentMetadata) -> Result<PaymentIntent> {
        Err(MarketError::provider(
            ErrorCode::PaymentProviderFailed,
            "no payment provider is configured",
        ))
    }
}

/// A request seen by [`RecordingPaymentProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedIntent {
    pub amount_minor: i64,
    pub currency: String,
    pub metadata: PaymentMetadata,
}

/// In-process provider that records requests and returns `pi_<n>` intents.
#[derive(Debug, Clone, Default)]
pub struct RecordingPaymentProvider {
    requests: Arc<Mutex<Vec<RecordedIntent>>>,
}

impl RecordingPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<RecordedIntent> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentProvider for RecordingPaymentProvider {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &PaymentMetadata,
    ) -> Result<PaymentIntent> {
        let mut requests = self
            .requests
            .lock()
            .map_err(|_| MarketError::provider(ErrorCode::PaymentProviderFailed, "recorder poisoned"))?;
        requests.push(RecordedIntent {
            amount_minor,
            currency: currency.to_string(),
            metadata: metadata.clone(),
        });
        let id = format!("pi_{}", requests.len());
        Ok(PaymentIntent {
            client_secret: format!("{id}_secret"),
            id,
        })
    }
}

/// What the client needs to confirm the payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
    pub client_secret: String,
    /// Display-currency units.
    pub amount: f64,
}

/// Start a one-time purchase of `route_id`.
pub async fn initiate_payment(ctx: &MarketContext, user: &UserRef, route_id: &str) -> Result<PaymentInitiation> {
    let repo = ctx.store.repo();
    let route = repo
        .find_route(route_id)
        .await?
        .filter(|r| r.is_published)
        .ok_or(MarketError::NotFound(ErrorCode::RouteNotFound))?;

    let (price, amount_minor) = match (route.access_type, route.price, route.price_minor()) {
        (AccessType::Free, _, _) => return Err(MarketError::invalid(ErrorCode::RouteIsFree)),
        (_, Some(price), Some(minor)) if minor > 0 => (price, minor),
        _ => return Err(MarketError::invalid(ErrorCode::RouteIsFree)),
    };

    if repo.find_purchase(&user.id, &route.id).await?.is_some() {
        return Err(MarketError::Conflict(ErrorCode::AlreadyPurchased));
    }

    let metadata = PaymentMetadata {
        user_id: user.id.clone(),
        route_id: route.id.clone(),
        route_title: route.title.clone(),
    };
    let intent = ctx
        .payments
        .create_payment_intent(amount_minor, &ctx.options.payments.currency, &metadata)
        .await?;

    tracing::info!(user_id = %user.id, route_id = %route.id, payment_intent = %intent.id, amount_minor, "payment initiated");
    Ok(PaymentInitiation {
        client_secret: intent.client_secret,
        amount: price,
    })
}
