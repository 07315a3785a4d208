// User dashboard and admin statistics.

use std::collections::HashMap;

use serde::Serialize;

use routemarket_core::db::models::{Purchase, Route, Subscription, UserProfile};
use routemarket_core::error::{ErrorCode, MarketError, Result};

use crate::accounts::{require_admin, UserRef};
use crate::store::MarketStore;
use crate::subscriptions::active_subscription_for_user;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasedRoute {
    #[serde(flatten)]
    pub purchase: Purchase,
    /// `None` if the route has since been removed.
    pub route_title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub user: UserProfile,
    pub purchases: Vec<PurchasedRoute>,
    pub subscription: Option<Subscription>,
}

/// The caller's purchases (newest first, with route titles) and active subscription.
pub async fn dashboard(store: &MarketStore, user: &UserRef) -> Result<Dashboard> {
    let repo = store.repo();
    let profile = repo
        .find_user(&user.id)
        .await?
        .ok_or(MarketError::NotFound(ErrorCode::UserNotFound))?
        .profile();

    let purchases = repo.purchases_for_user(&user.id).await?;
    let route_ids: Vec<String> = purchases.iter().map(|p| p.route_id.clone()).collect();
    let titles: HashMap<String, String> = repo
        .routes_by_ids(&route_ids)
        .await?
        .into_iter()
        .map(|r| (r.id, r.title))
        .collect();

    let purchases = purchases
        .into_iter()
        .map(|purchase| PurchasedRoute {
            route_title: titles.get(&purchase.route_id).cloned(),
            purchase,
        })
        .collect();

    Ok(Dashboard {
        user: profile,
        purchases,
        subscription: active_subscription_for_user(store, &user.id).await?,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_routes: i64,
    pub total_users: i64,
    pub total_purchases: i64,
    /// Sum of purchase amounts in display units.
    pub total_revenue: f64,
    pub recent_routes: Vec<Route>,
}

const RECENT_ROUTES: i64 = 5;

/// Marketplace totals. Admin only.
pub async fn admin_stats(store: &MarketStore, admin: &UserRef) -> Result<AdminStats> {
    require_admin(admin)?;
    let repo = store.repo();

    let purchases = repo.all_purchases().await?;
    // Sum in minor units to avoid accumulating float error.
    let revenue_minor: i64 = purchases.iter().map(|p| (p.amount * 100.0).round() as i64).sum();

    Ok(AdminStats {
        total_routes: repo.count_routes().await?,
        total_users: repo.count_users().await?,
        total_purchases: purchases.len() as i64,
        total_revenue: revenue_minor as f64 / 100.0,
        recent_routes: repo.recent_routes(RECENT_ROUTES).await?,
    })
}
