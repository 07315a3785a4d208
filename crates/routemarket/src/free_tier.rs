// Free-tier token gate: email capture issues a 24-hour download token for a
// published FREE route; redemption resolves it to the route's GPX location.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use routemarket_core::db::models::{AccessType, EmailDownloadToken, EmailSubscriber};
use routemarket_core::error::{ErrorCode, MarketError, Result, StoreError};
use routemarket_core::utils::{generate_id, is_valid_email, normalize_email};

use crate::context::MarketContext;
use crate::crypto::generate_token_hex;
use crate::email::{free_route_email, send_best_effort};
use crate::store::MarketStore;

/// 32 bytes, 64 hex characters.
const TOKEN_BYTES: usize = 32;

/// A freshly issued download token.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedToken {
    pub token: String,
    pub email: String,
    pub route_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Where a redeemed token's content lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteContentLocation {
    pub route_id: String,
    pub title: String,
    pub gpx_file_url: String,
}

/// Capture `email` and issue a download token for the free route `route_id`.
///
/// Every call issues a new token; earlier tokens stay valid until they expire.
pub async fn issue_token(ctx: &MarketContext, email: &str, route_id: &str) -> Result<IssuedToken> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(MarketError::invalid(ErrorCode::InvalidEmail));
    }

    let repo = ctx.store.repo();
    let route = repo
        .find_route(route_id)
        .await?
        .filter(|r| r.is_published)
        .ok_or(MarketError::NotFound(ErrorCode::RouteNotFound))?;
    if route.access_type != AccessType::Free {
        return Err(MarketError::invalid(ErrorCode::RouteNotFree));
    }

    let now = Utc::now();
    if repo.find_subscriber(&email).await?.is_none() {
        let subscriber = EmailSubscriber {
            id: generate_id(),
            email: email.clone(),
            source: ctx.options.downloads.subscriber_source.clone(),
            created_at: now,
        };
        match repo.insert_subscriber(&subscriber).await {
            Ok(_) | Err(StoreError::UniqueViolation { .. }) => {}
            Err(other) => return Err(other.into()),
        }
    }

    let token = EmailDownloadToken {
        id: generate_id(),
        token: generate_token_hex(TOKEN_BYTES),
        email: email.clone(),
        route_id: route.id.clone(),
        expires_at: now + Duration::seconds(ctx.options.downloads.token_ttl_secs),
        downloaded_at: None,
        created_at: now,
    };
    let token = repo.insert_download_token(&token).await?;
    tracing::info!(route_id = %route.id, expires_at = %token.expires_at, "download token issued");

    let message = free_route_email(&email, &route.title, &ctx.download_url(&token.token));
    send_best_effort(ctx.email.as_ref(), message).await;

    Ok(IssuedToken {
        token: token.token,
        email,
        route_id: route.id,
        expires_at: token.expires_at,
    })
}

/// Redeem a token against the current time.
pub async fn redeem(store: &MarketStore, token: &str) -> Result<RouteContentLocation> {
    redeem_at(store, token, Utc::now()).await
}

/// Redeem a token as of `now`. Succeeds only while `now < expiresAt`; the
/// first success records `downloadedAt`.
pub async fn redeem_at(store: &MarketStore, token: &str, now: DateTime<Utc>) -> Result<RouteContentLocation> {
    let repo = store.repo();
    let record = repo
        .find_download_token(token)
        .await?
        .ok_or(MarketError::NotFound(ErrorCode::DownloadTokenNotFound))?;

    if record.is_expired_at(now) {
        return Err(MarketError::Expired(ErrorCode::DownloadLinkExpired));
    }

    let route = repo
        .find_route(&record.route_id)
        .await?
        .ok_or(MarketError::NotFound(ErrorCode::RouteNotFound))?;

    if record.downloaded_at.is_none() {
        repo.mark_downloaded(&record.id, now).await?;
    }

    Ok(RouteContentLocation {
        route_id: route.id,
        title: route.title,
        gpx_file_url: route.gpx_file_url,
    })
}

/// Delete tokens whose expiry is at or before `now`. Returns how many were removed.
pub async fn purge_expired_tokens(store: &MarketStore, now: DateTime<Utc>) -> Result<i64> {
    let removed = store.repo().delete_tokens_expired_by(now).await?;
    if removed > 0 {
        tracing::info!(removed, "purged expired download tokens");
    }
    Ok(removed)
}
