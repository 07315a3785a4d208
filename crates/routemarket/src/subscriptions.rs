// Subscription state machine.
//
// Each change upserts the subscription row and copies its status onto the
// owning user's cached `subscriptionStatus` inside one storage transaction.

use chrono::{DateTime, Utc};
use serde_json::json;

use routemarket_core::db::adapter::Adapter;
use routemarket_core::db::models::{timestamp, Subscription, SubscriptionStatus};
use routemarket_core::error::{ErrorCode, MarketError, Result};
use routemarket_core::utils::generate_id;

use crate::context::MarketContext;
use crate::store::{finish_transaction, MarketStore, Repo};

/// A subscription creation or update reported by the billing provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionChange {
    pub external_id: String,
    /// Required when the subscription is not known yet.
    pub user_id: Option<String>,
    pub price_id: Option<String>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub is_active: bool,
}

// The cache mirrors the row just written, which is the user's most recently
// updated one. Entitlement reads the active row instead.
async fn propagate<A: Adapter + ?Sized>(repo: &Repo<'_, A>, subscription: &Subscription, now: DateTime<Utc>) -> Result<()> {
    repo.set_user_subscription_status(&subscription.user_id, subscription.status.into(), now)
        .await?
        .ok_or(MarketError::NotFound(ErrorCode::UserNotFound))?;
    Ok(())
}

async fn upsert<A: Adapter + ?Sized>(
    ctx: &MarketContext,
    repo: &Repo<'_, A>,
    change: &SubscriptionChange,
    now: DateTime<Utc>,
) -> Result<Subscription> {
    let status = SubscriptionStatus::from_active(change.is_active);

    let subscription = match repo.find_subscription_by_external_id(&change.external_id).await? {
        Some(existing) => {
            let patch = json!({
                "status": status,
                "startDate": timestamp::format(&change.period_start),
                "endDate": timestamp::format(&change.period_end),
                "updatedAt": timestamp::format(&now),
            });
            repo.update_subscription(&existing.id, patch).await?
        }
        None => {
            let user_id = change
                .user_id
                .as_deref()
                .ok_or_else(|| MarketError::invalid(ErrorCode::MissingSubscriptionUser))?;
            let user = repo
                .find_user(user_id)
                .await?
                .ok_or(MarketError::NotFound(ErrorCode::UserNotFound))?;

            let subscription = Subscription {
                id: generate_id(),
                user_id: user.id,
                stripe_subscription_id: change.external_id.clone(),
                plan_id: ctx.stripe.plan_for_price(change.price_id.as_deref()).to_string(),
                status,
                start_date: change.period_start,
                end_date: change.period_end,
                created_at: now,
                updated_at: now,
            };
            repo.insert_subscription(&subscription).await?
        }
    };

    propagate(repo, &subscription, now).await?;
    Ok(subscription)
}

/// Apply a `customer.subscription.created` / `.updated` event.
pub async fn subscription_created_or_updated(ctx: &MarketContext, change: SubscriptionChange) -> Result<Subscription> {
    let now = Utc::now();
    let tx = ctx.store.begin().await?;
    let outcome = {
        let repo = Repo::new(&*tx);
        upsert(ctx, &repo, &change, now).await
    };
    let subscription = finish_transaction(tx, outcome).await?;

    tracing::info!(
        subscription_id = %subscription.stripe_subscription_id,
        user_id = %subscription.user_id,
        status = ?subscription.status,
        "subscription upserted"
    );
    Ok(subscription)
}

async fn cancel<A: Adapter + ?Sized>(repo: &Repo<'_, A>, external_id: &str, now: DateTime<Utc>) -> Result<Subscription> {
    let existing = repo
        .find_subscription_by_external_id(external_id)
        .await?
        .ok_or(MarketError::NotFound(ErrorCode::SubscriptionNotFound))?;
    let patch = json!({
        "status": SubscriptionStatus::Cancelled,
        "updatedAt": timestamp::format(&now),
    });
    let subscription = repo.update_subscription(&existing.id, patch).await?;
    propagate(repo, &subscription, now).await?;
    Ok(subscription)
}

/// Apply a `customer.subscription.deleted` event.
pub async fn subscription_deleted(ctx: &MarketContext, external_id: &str) -> Result<Subscription> {
    let now = Utc::now();
    let tx = ctx.store.begin().await?;
    let outcome = {
        let repo = Repo::new(&*tx);
        cancel(&repo, external_id, now).await
    };
    let subscription = finish_transaction(tx, outcome).await?;

    tracing::info!(
        subscription_id = %subscription.stripe_subscription_id,
        user_id = %subscription.user_id,
        "subscription cancelled"
    );
    Ok(subscription)
}

/// The user's most recently updated active subscription.
pub async fn active_subscription_for_user(store: &MarketStore, user_id: &str) -> Result<Option<Subscription>> {
    Ok(store.repo().latest_active_subscription_for_user(user_id).await?)
}
