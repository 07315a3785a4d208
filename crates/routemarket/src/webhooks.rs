// Stripe webhook handling: verify, decode, dispatch to the ledger or the
// subscription state machine.

use serde::Serialize;

use routemarket_core::error::{ErrorCode, MarketError, Result};
use routemarket_stripe::{construct_event, StripeError, StripeEvent};

use crate::context::MarketContext;
use crate::ledger::{record_confirmed_payment, ConfirmedPayment};
use crate::subscriptions::{subscription_created_or_updated, subscription_deleted, SubscriptionChange};

/// What a verified webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookOutcome {
    PurchaseRecorded { purchase_id: String, created: bool },
    SubscriptionSynced { subscription_id: String },
    SubscriptionCancelled { subscription_id: String },
    /// Deletion for a subscription we never stored.
    UnknownSubscription { subscription_id: String },
    Ignored { event_type: String },
}

fn map_stripe_error(err: StripeError) -> MarketError {
    match err {
        StripeError::MissingSignature => MarketError::Unauthorized(ErrorCode::MissingSignature),
        StripeError::InvalidSignature | StripeError::TimestampOutsideTolerance => {
            MarketError::Unauthorized(ErrorCode::InvalidWebhookSignature)
        }
        StripeError::InvalidPayload(message) => MarketError::invalid_with(ErrorCode::InvalidWebhookPayload, message),
        StripeError::MissingMetadata(field) => {
            MarketError::invalid_with(ErrorCode::MissingPaymentMetadata, format!("Missing metadata field `{field}`"))
        }
        other @ (StripeError::Api { .. } | StripeError::Http(_)) => {
            MarketError::provider(ErrorCode::PaymentProviderFailed, other.to_string())
        }
    }
}

/// Verify and apply one webhook delivery. Nothing is mutated unless the
/// signature checks out.
pub async fn handle_stripe_webhook(ctx: &MarketContext, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
    let event = construct_event(payload, signature, &ctx.stripe.webhook_secret, ctx.stripe.tolerance_secs)
        .map_err(|err| {
            tracing::warn!(code = err.code(), error = %err, "rejected stripe webhook");
            map_stripe_error(err)
        })?;

    match event {
        StripeEvent::PaymentSucceeded(payment) => {
            let record = record_confirmed_payment(
                ctx,
                ConfirmedPayment {
                    user_id: payment.user_id,
                    route_id: payment.route_id,
                    amount_minor: payment.amount_minor,
                    currency: payment.currency,
                    transaction_id: payment.payment_intent_id,
                },
            )
            .await?;
            Ok(WebhookOutcome::PurchaseRecorded {
                purchase_id: record.purchase.id,
                created: record.created,
            })
        }
        StripeEvent::SubscriptionUpserted(update) => {
            let subscription = subscription_created_or_updated(
                ctx,
                SubscriptionChange {
                    external_id: update.subscription_id,
                    user_id: update.user_id,
                    price_id: update.price_id,
                    period_start: update.period_start,
                    period_end: update.period_end,
                    is_active: update.status.is_active(),
                },
            )
            .await?;
            Ok(WebhookOutcome::SubscriptionSynced {
                subscription_id: subscription.stripe_subscription_id,
            })
        }
        StripeEvent::SubscriptionDeleted { subscription_id } => match subscription_deleted(ctx, &subscription_id).await {
            Ok(subscription) => Ok(WebhookOutcome::SubscriptionCancelled {
                subscription_id: subscription.stripe_subscription_id,
            }),
            Err(MarketError::NotFound(ErrorCode::SubscriptionNotFound)) => {
                tracing::warn!(%subscription_id, "deletion for unknown subscription acknowledged");
                Ok(WebhookOutcome::UnknownSubscription { subscription_id })
            }
            Err(other) => Err(other),
        },
        StripeEvent::Ignored { event_type } => {
            tracing::debug!(%event_type, "ignoring stripe event");
            Ok(WebhookOutcome::Ignored { event_type })
        }
    }
}
