// Purchase ledger. Purchases are created only from confirmed payment events
// and are never mutated; the provider transaction id makes recording idempotent.

use chrono::Utc;

use routemarket_core::db::models::{PaymentProviderKind, Purchase, PurchaseStatus};
use routemarket_core::error::{ErrorCode, MarketError, Result, StoreError};
use routemarket_core::utils::generate_id;

use crate::context::MarketContext;
use crate::email::{purchase_confirmation_email, send_best_effort};
use crate::store::MarketStore;

/// A successful payment as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedPayment {
    pub user_id: String,
    pub route_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub transaction_id: String,
}

/// Result of recording a payment. `created` is false for a replayed event.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub purchase: Purchase,
    pub created: bool,
}

fn replay(purchase: Purchase) -> PaymentRecord {
    tracing::debug!(transaction_id = %purchase.transaction_id, "payment already recorded");
    PaymentRecord { purchase, created: false }
}

/// Record a confirmed payment exactly once per transaction id.
pub async fn record_confirmed_payment(ctx: &MarketContext, payment: ConfirmedPayment) -> Result<PaymentRecord> {
    let repo = ctx.store.repo();

    if let Some(existing) = repo.find_purchase_by_transaction(&payment.transaction_id).await? {
        return Ok(replay(existing));
    }
    if repo.find_purchase(&payment.user_id, &payment.route_id).await?.is_some() {
        tracing::warn!(
            user_id = %payment.user_id,
            route_id = %payment.route_id,
            transaction_id = %payment.transaction_id,
            "route already purchased under another transaction"
        );
        return Err(MarketError::Conflict(ErrorCode::DuplicatePayment));
    }

    let user = repo
        .find_user(&payment.user_id)
        .await?
        .ok_or(MarketError::NotFound(ErrorCode::UserNotFound))?;
    let route = repo
        .find_route(&payment.route_id)
        .await?
        .ok_or(MarketError::NotFound(ErrorCode::RouteNotFound))?;

    let purchase = Purchase {
        id: generate_id(),
        user_id: user.id.clone(),
        route_id: route.id.clone(),
        amount: payment.amount_minor as f64 / 100.0,
        currency: payment.currency.to_lowercase(),
        payment_provider: PaymentProviderKind::Stripe,
        transaction_id: payment.transaction_id.clone(),
        status: PurchaseStatus::Completed,
        created_at: Utc::now(),
    };

    let purchase = match repo.insert_purchase(&purchase).await {
        Ok(purchase) => purchase,
        // Lost a race with a concurrent delivery: either the same transaction
        // won (a replay) or another transaction took the (user, route) pair.
        Err(StoreError::UniqueViolation { .. }) => {
            return match repo.find_purchase_by_transaction(&payment.transaction_id).await? {
                Some(existing) => Ok(replay(existing)),
                None => Err(MarketError::Conflict(ErrorCode::DuplicatePayment)),
            };
        }
        Err(other) => return Err(other.into()),
    };

    tracing::info!(
        purchase_id = %purchase.id,
        user_id = %purchase.user_id,
        route_id = %purchase.route_id,
        amount = purchase.amount,
        transaction_id = %purchase.transaction_id,
        "purchase recorded"
    );

    let message = purchase_confirmation_email(&user.email, &route.title, &ctx.route_dashboard_url(&route.id));
    send_best_effort(ctx.email.as_ref(), message).await;

    Ok(PaymentRecord { purchase, created: true })
}

/// A user's purchases, newest first.
pub async fn purchases_for_user(store: &MarketStore, user_id: &str) -> Result<Vec<Purchase>> {
    Ok(store.repo().purchases_for_user(user_id).await?)
}
