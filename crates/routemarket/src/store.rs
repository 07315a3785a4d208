// Typed storage layer over the JSON-value `Adapter`.
//
// `Repo` wraps any adapter (the shared one or an open transaction) and turns
// model structs into rows and back. `MarketStore` owns the shared adapter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use routemarket_core::db::adapter::{
    Adapter, AdapterResult, FindManyQuery, Operator, SortBy, TransactionAdapter, WhereClause,
};
use routemarket_core::db::models::{
    tables, timestamp, EmailDownloadToken, EmailSubscriber, Purchase, Route, Subscription,
    SubscriptionStatus, User, UserSubscriptionStatus,
};
use routemarket_core::error::{Result, StoreError};

fn to_row<T: Serialize>(model: &T) -> AdapterResult<Value> {
    Ok(serde_json::to_value(model)?)
}

fn from_row<T: DeserializeOwned>(row: Value) -> AdapterResult<T> {
    Ok(serde_json::from_value(row)?)
}

fn from_rows<T: DeserializeOwned>(rows: Vec<Value>) -> AdapterResult<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}

/// Typed table operations on top of an adapter.
pub struct Repo<'a, A: Adapter + ?Sized> {
    adapter: &'a A,
}

impl<'a, A: Adapter + ?Sized> Repo<'a, A> {
    pub fn new(adapter: &'a A) -> Self {
        Self { adapter }
    }

    async fn find<T: DeserializeOwned>(&self, model: &str, clauses: &[WhereClause]) -> AdapterResult<Option<T>> {
        self.adapter
            .find_one(model, clauses)
            .await?
            .map(from_row)
            .transpose()
    }

    async fn insert<T: Serialize + DeserializeOwned>(&self, model: &str, value: &T) -> AdapterResult<T> {
        let row = self.adapter.create(model, to_row(value)?).await?;
        from_row(row)
    }

    // ─── Routes ──────────────────────────────────────────────────

    pub async fn find_route(&self, id: &str) -> AdapterResult<Option<Route>> {
        self.find(tables::ROUTE, &[WhereClause::eq("id", id)]).await
    }

    /// Published routes, newest first.
    pub async fn list_published_routes(&self, limit: i64, offset: i64) -> AdapterResult<Vec<Route>> {
        let query = FindManyQuery::filtered(vec![WhereClause::eq("isPublished", true)])
            .sorted(SortBy::desc("createdAt"))
            .page(limit, offset);
        from_rows(self.adapter.find_many(tables::ROUTE, query).await?)
    }

    pub async fn count_published_routes(&self) -> AdapterResult<i64> {
        self.adapter
            .count(tables::ROUTE, &[WhereClause::eq("isPublished", true)])
            .await
    }

    pub async fn count_routes(&self) -> AdapterResult<i64> {
        self.adapter.count(tables::ROUTE, &[]).await
    }

    /// Most recently created routes, published or not.
    pub async fn recent_routes(&self, limit: i64) -> AdapterResult<Vec<Route>> {
        let query = FindManyQuery::default().sorted(SortBy::desc("createdAt")).page(limit, 0);
        from_rows(self.adapter.find_many(tables::ROUTE, query).await?)
    }

    pub async fn routes_by_ids(&self, ids: &[String]) -> AdapterResult<Vec<Route>> {
        let clause = WhereClause::with_operator("id", Operator::In, json!(ids));
        from_rows(
            self.adapter
                .find_many(tables::ROUTE, FindManyQuery::filtered(vec![clause]))
                .await?,
        )
    }

    pub async fn insert_route(&self, route: &Route) -> AdapterResult<Route> {
        self.insert(tables::ROUTE, route).await
    }

    // ─── Users ───────────────────────────────────────────────────

    pub async fn find_user(&self, id: &str) -> AdapterResult<Option<User>> {
        self.find(tables::USER, &[WhereClause::eq("id", id)]).await
    }

    pub async fn find_user_by_email(&self, email: &str) -> AdapterResult<Option<User>> {
        self.find(tables::USER, &[WhereClause::eq("email", email)]).await
    }

    pub async fn insert_user(&self, user: &User) -> AdapterResult<User> {
        self.insert(tables::USER, user).await
    }

    pub async fn count_users(&self) -> AdapterResult<i64> {
        self.adapter.count(tables::USER, &[]).await
    }

    /// Overwrite the cached subscription status on a user row.
    pub async fn set_user_subscription_status(
        &self,
        user_id: &str,
        status: UserSubscriptionStatus,
        now: DateTime<Utc>,
    ) -> AdapterResult<Option<User>> {
        let data = json!({
            "subscriptionStatus": status,
            "updatedAt": timestamp::format(&now),
        });
        self.adapter
            .update(tables::USER, &[WhereClause::eq("id", user_id)], data)
            .await?
            .map(from_row)
            .transpose()
    }

    // ─── Purchases ───────────────────────────────────────────────

    pub async fn find_purchase_by_transaction(&self, transaction_id: &str) -> AdapterResult<Option<Purchase>> {
        self.find(tables::PURCHASE, &[WhereClause::eq("transactionId", transaction_id)])
            .await
    }

    pub async fn find_purchase(&self, user_id: &str, route_id: &str) -> AdapterResult<Option<Purchase>> {
        self.find(
            tables::PURCHASE,
            &[WhereClause::eq("userId", user_id).and(), WhereClause::eq("routeId", route_id)],
        )
        .await
    }

    pub async fn insert_purchase(&self, purchase: &Purchase) -> AdapterResult<Purchase> {
        self.insert(tables::PURCHASE, purchase).await
    }

    /// A user's purchases, newest first.
    pub async fn purchases_for_user(&self, user_id: &str) -> AdapterResult<Vec<Purchase>> {
        let query = FindManyQuery::filtered(vec![WhereClause::eq("userId", user_id)])
            .sorted(SortBy::desc("createdAt"));
        from_rows(self.adapter.find_many(tables::PURCHASE, query).await?)
    }

    pub async fn all_purchases(&self) -> AdapterResult<Vec<Purchase>> {
        from_rows(
            self.adapter
                .find_many(tables::PURCHASE, FindManyQuery::default())
                .await?,
        )
    }

    // ─── Subscriptions ───────────────────────────────────────────

    pub async fn find_subscription_by_external_id(&self, external_id: &str) -> AdapterResult<Option<Subscription>> {
        self.find(
            tables::SUBSCRIPTION,
            &[WhereClause::eq("stripeSubscriptionId", external_id)],
        )
        .await
    }

    pub async fn insert_subscription(&self, subscription: &Subscription) -> AdapterResult<Subscription> {
        self.insert(tables::SUBSCRIPTION, subscription).await
    }

    /// Patch a subscription row by id and return the updated row.
    pub async fn update_subscription(&self, id: &str, patch: Value) -> AdapterResult<Subscription> {
        let row = self
            .adapter
            .update(tables::SUBSCRIPTION, &[WhereClause::eq("id", id)], patch)
            .await?
            .ok_or_else(|| StoreError::Database(format!("subscription {id} vanished during update")))?;
        from_row(row)
    }

    /// The user's most recently updated ACTIVE subscription row. Cancelled
    /// rows never shadow an active one.
    pub async fn latest_active_subscription_for_user(&self, user_id: &str) -> AdapterResult<Option<Subscription>> {
        let query = FindManyQuery::filtered(vec![
            WhereClause::eq("userId", user_id),
            WhereClause::eq("status", json!(SubscriptionStatus::Active)),
        ])
        .sorted(SortBy::desc("updatedAt"))
            .page(1, 0);
        let rows = self.adapter.find_many(tables::SUBSCRIPTION, query).await?;
        rows.into_iter().next().map(from_row).transpose()
    }

    // ─── Email capture ───────────────────────────────────────────

    pub async fn find_subscriber(&self, email: &str) -> AdapterResult<Option<EmailSubscriber>> {
        self.find(tables::EMAIL_SUBSCRIBER, &[WhereClause::eq("email", email)])
            .await
    }

    pub async fn insert_subscriber(&self, subscriber: &EmailSubscriber) -> AdapterResult<EmailSubscriber> {
        self.insert(tables::EMAIL_SUBSCRIBER, subscriber).await
    }

    pub async fn insert_download_token(&self, token: &EmailDownloadToken) -> AdapterResult<EmailDownloadToken> {
        self.insert(tables::EMAIL_DOWNLOAD, token).await
    }

    pub async fn find_download_token(&self, token: &str) -> AdapterResult<Option<EmailDownloadToken>> {
        self.find(tables::EMAIL_DOWNLOAD, &[WhereClause::eq("token", token)])
            .await
    }

    /// Stamp `downloadedAt` if it has not been set yet.
    pub async fn mark_downloaded(&self, id: &str, now: DateTime<Utc>) -> AdapterResult<bool> {
        let clauses = [
            WhereClause::eq("id", id).and(),
            WhereClause::eq("downloadedAt", Value::Null),
        ];
        let updated = self
            .adapter
            .update(
                tables::EMAIL_DOWNLOAD,
                &clauses,
                json!({ "downloadedAt": timestamp::format(&now) }),
            )
            .await?;
        Ok(updated.is_some())
    }

    pub async fn delete_tokens_expired_by(&self, now: DateTime<Utc>) -> AdapterResult<i64> {
        let clause = WhereClause::with_operator("expiresAt", Operator::Lte, timestamp::format(&now));
        self.adapter.delete_many(tables::EMAIL_DOWNLOAD, &[clause]).await
    }
}

/// The shared storage handle.
#[derive(Debug, Clone)]
pub struct MarketStore {
    adapter: Arc<dyn Adapter>,
}

impl MarketStore {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Typed access outside any transaction.
    pub fn repo(&self) -> Repo<'_, dyn Adapter> {
        Repo::new(self.adapter.as_ref())
    }

    pub async fn begin(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        self.adapter.begin_transaction().await
    }
}

/// Commit `tx` if `outcome` succeeded, otherwise roll it back and return the error.
pub async fn finish_transaction<T>(tx: Box<dyn TransactionAdapter>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::error!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}
