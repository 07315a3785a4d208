//! End-to-end tests of the marketplace operations over the in-memory adapter,
//! with the purchase and subscription flows repeated against SQLite.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use routemarket::accounts::{authenticate, sign_in, sign_up, SignUp, UserRef};
use routemarket::catalog::{create_route, get_published, list_published, NewRoute, Upload};
use routemarket::dashboard::{admin_stats, dashboard};
use routemarket::email::RecordingEmailSender;
use routemarket::entitlement::{evaluate, Entitlement, GrantReason};
use routemarket::free_tier::{issue_token, redeem_at};
use routemarket::ledger::{record_confirmed_payment, ConfirmedPayment};
use routemarket::payments::{initiate_payment, RecordingPaymentProvider};
use routemarket::storage::MemoryObjectStorage;
use routemarket::subscriptions::{
    active_subscription_for_user, subscription_created_or_updated, subscription_deleted, SubscriptionChange,
};
use routemarket::webhooks::{handle_stripe_webhook, WebhookOutcome};
use routemarket::MarketContext;
use routemarket_core::db::adapter::Adapter;
use routemarket_core::db::models::{
    timestamp, AccessType, Difficulty, Role, Route, SubscriptionStatus, User, UserSubscriptionStatus,
};
use routemarket_core::error::{ErrorCode, MarketError};
use routemarket_core::options::MarketplaceOptions;
use routemarket_memory::MemoryAdapter;
use routemarket_sqlx::SqlxAdapter;
use routemarket_stripe::webhook::compute_signature;
use routemarket_stripe::Plan;

const WEBHOOK_SECRET: &str = "whsec_marketplace_test";

struct Harness {
    ctx: Arc<MarketContext>,
    email: Arc<RecordingEmailSender>,
    payments: Arc<RecordingPaymentProvider>,
    storage: Arc<MemoryObjectStorage>,
}

async fn harness_with(adapter: Arc<dyn Adapter>) -> Harness {
    let options = MarketplaceOptions::new("marketplace-test-secret")
        .with_webhook_secret(WEBHOOK_SECRET)
        .with_app_url("https://routes.example.com");
    let email = Arc::new(RecordingEmailSender::new());
    let payments = Arc::new(RecordingPaymentProvider::new());
    let storage = Arc::new(MemoryObjectStorage::new("https://cdn.example.com"));

    let ctx = MarketContext::new(options, adapter)
        .with_email_sender(email.clone())
        .with_payment_provider(payments.clone())
        .with_object_storage(storage.clone())
        .with_plan(Plan::new("yearly", "Yearly", "price_yearly"));
    ctx.ensure_schema().await.unwrap();

    Harness {
        ctx: Arc::new(ctx),
        email,
        payments,
        storage,
    }
}

async fn harness() -> Harness {
    harness_with(Arc::new(MemoryAdapter::new())).await
}

async fn sqlite_harness() -> Harness {
    let adapter = SqlxAdapter::connect("sqlite::memory:").await.unwrap();
    harness_with(Arc::new(adapter)).await
}

async fn seed_user(ctx: &MarketContext, id: &str, role: Role) -> UserRef {
    let now = Utc::now();
    let user = User {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        name: id.to_string(),
        password_hash: "salt:key".into(),
        role,
        subscription_status: UserSubscriptionStatus::None,
        created_at: now,
        updated_at: now,
    };
    let user = ctx.store.repo().insert_user(&user).await.unwrap();
    UserRef::from(&user)
}

async fn seed_route(ctx: &MarketContext, id: &str, access_type: AccessType, price: Option<f64>) -> Route {
    let now = Utc::now();
    let route = Route {
        id: id.to_string(),
        title: format!("Route {id}"),
        description: "Coastal climb".into(),
        distance: 42.5,
        elevation_gain: 610,
        difficulty: Difficulty::Hard,
        location: "Big Sur".into(),
        access_type,
        price,
        gpx_file_url: format!("https://cdn.example.com/gpx/{id}.gpx"),
        thumbnail_url: None,
        is_published: true,
        created_at: now,
        updated_at: now,
    };
    ctx.store.repo().insert_route(&route).await.unwrap()
}

fn payment(user: &str, route: &str, tx: &str) -> ConfirmedPayment {
    ConfirmedPayment {
        user_id: user.into(),
        route_id: route.into(),
        amount_minor: 1250,
        currency: "USD".into(),
        transaction_id: tx.into(),
    }
}

fn active_change(external_id: &str, user: &str) -> SubscriptionChange {
    let now = Utc::now();
    SubscriptionChange {
        external_id: external_id.into(),
        user_id: Some(user.into()),
        price_id: Some("price_yearly".into()),
        period_start: now,
        period_end: now + Duration::days(365),
        is_active: true,
    }
}

fn signed(payload: &serde_json::Value) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(payload).unwrap();
    let ts = Utc::now().timestamp();
    let header = format!("t={ts},v1={}", compute_signature(&body, WEBHOOK_SECRET, ts));
    (body, header)
}

fn payment_event(user: &str, route: &str, intent: &str) -> serde_json::Value {
    json!({
        "id": "evt_payment",
        "type": "payment_intent.succeeded",
        "created": Utc::now().timestamp(),
        "data": { "object": {
            "id": intent,
            "amount": 1250,
            "amount_received": 1250,
            "currency": "usd",
            "status": "succeeded",
            "metadata": { "userId": user, "routeId": route, "routeTitle": "Route r1" }
        }}
    })
}

fn subscription_event(event_type: &str, sub: &str, user: &str, status: &str) -> serde_json::Value {
    let now = Utc::now().timestamp();
    json!({
        "id": "evt_sub",
        "type": event_type,
        "created": now,
        "data": { "object": {
            "id": sub,
            "status": status,
            "current_period_start": now,
            "current_period_end": now + 30 * 24 * 3600,
            "metadata": { "userId": user },
            "items": { "data": [ { "price": { "id": "price_monthly" } } ] }
        }}
    })
}

// ── Entitlement ─────────────────────────────────────────────────

#[tokio::test]
async fn free_route_is_free_gate_for_everyone() {
    let h = harness().await;
    let admin = seed_user(&h.ctx, "admin", Role::Admin).await;
    let rider = seed_user(&h.ctx, "rider", Role::User).await;
    seed_route(&h.ctx, "free", AccessType::Free, None).await;

    for user in [None, Some(&rider), Some(&admin)] {
        assert_eq!(evaluate(&h.ctx.store, user, "free").await.unwrap(), Entitlement::FreeGate);
    }
}

#[tokio::test]
async fn paid_route_denied_until_purchased() {
    let h = harness().await;
    let rider = seed_user(&h.ctx, "rider", Role::User).await;
    seed_route(&h.ctx, "r1", AccessType::Paid, Some(12.5)).await;

    assert_eq!(evaluate(&h.ctx.store, None, "r1").await.unwrap(), Entitlement::Denied);
    assert_eq!(evaluate(&h.ctx.store, Some(&rider), "r1").await.unwrap(), Entitlement::Denied);

    record_confirmed_payment(&h.ctx, payment("rider", "r1", "tx_1")).await.unwrap();
    assert_eq!(
        evaluate(&h.ctx.store, Some(&rider), "r1").await.unwrap(),
        Entitlement::Granted(GrantReason::Purchased)
    );
}

#[tokio::test]
async fn unknown_or_unpublished_route_is_not_found() {
    let h = harness().await;
    let err = evaluate(&h.ctx.store, None, "missing").await.unwrap_err();
    assert!(matches!(err, MarketError::NotFound(ErrorCode::RouteNotFound)));
}

// ── Purchase ledger ─────────────────────────────────────────────

#[tokio::test]
async fn recording_the_same_transaction_twice_is_idempotent() {
    let h = harness().await;
    seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "r1", AccessType::Paid, Some(12.5)).await;

    let first = record_confirmed_payment(&h.ctx, payment("u1", "r1", "tx_1")).await.unwrap();
    let second = record_confirmed_payment(&h.ctx, payment("u1", "r1", "tx_1")).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.purchase.id, second.purchase.id);
    assert_eq!(first.purchase.amount, 12.5);
    assert_eq!(first.purchase.currency, "usd");
    assert_eq!(h.ctx.store.repo().all_purchases().await.unwrap().len(), 1);
    // Confirmation goes out once.
    let sent = h.email.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Purchase Confirmation: Route r1");
}

#[tokio::test]
async fn second_transaction_for_owned_route_conflicts() {
    let h = harness().await;
    seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "r1", AccessType::Paid, Some(12.5)).await;

    record_confirmed_payment(&h.ctx, payment("u1", "r1", "tx_1")).await.unwrap();
    let err = record_confirmed_payment(&h.ctx, payment("u1", "r1", "tx_2")).await.unwrap_err();
    assert!(matches!(err, MarketError::Conflict(ErrorCode::DuplicatePayment)));

    let purchases = h.ctx.store.repo().all_purchases().await.unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].transaction_id, "tx_1");
}

#[tokio::test]
async fn payment_for_unknown_user_is_not_found() {
    let h = harness().await;
    seed_route(&h.ctx, "r1", AccessType::Paid, Some(12.5)).await;
    let err = record_confirmed_payment(&h.ctx, payment("ghost", "r1", "tx_1")).await.unwrap_err();
    assert!(matches!(err, MarketError::NotFound(ErrorCode::UserNotFound)));
}

async fn assert_concurrent_redelivery_records_once(h: &Harness) {
    seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "r1", AccessType::Paid, Some(12.5)).await;

    let (first, second) = tokio::join!(
        record_confirmed_payment(&h.ctx, payment("u1", "r1", "tx_1")),
        record_confirmed_payment(&h.ctx, payment("u1", "r1", "tx_1")),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.purchase.id, second.purchase.id);
    assert_eq!(u8::from(first.created) + u8::from(second.created), 1);
    let purchases = h.ctx.store.repo().all_purchases().await.unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].transaction_id, "tx_1");
}

#[tokio::test]
async fn concurrent_deliveries_of_one_transaction_record_one_purchase() {
    let h = harness().await;
    assert_concurrent_redelivery_records_once(&h).await;
    assert_eq!(h.email.sent().len(), 1);
}

// ── Subscriptions ───────────────────────────────────────────────

#[tokio::test]
async fn subscription_lifecycle_grants_then_revokes_premium() {
    let h = harness().await;
    let rider = seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "p1", AccessType::Premium, None).await;

    let created = subscription_created_or_updated(&h.ctx, active_change("sub_1", "u1")).await.unwrap();
    assert_eq!(created.status, SubscriptionStatus::Active);
    assert_eq!(created.plan_id, "yearly");
    assert_eq!(
        evaluate(&h.ctx.store, Some(&rider), "p1").await.unwrap(),
        Entitlement::Granted(GrantReason::Subscribed)
    );
    let user = h.ctx.store.repo().find_user("u1").await.unwrap().unwrap();
    assert_eq!(user.subscription_status, UserSubscriptionStatus::Active);

    // A second created/updated for the same id updates in place.
    subscription_created_or_updated(&h.ctx, active_change("sub_1", "u1")).await.unwrap();

    let cancelled = subscription_deleted(&h.ctx, "sub_1").await.unwrap();
    assert_eq!(cancelled.id, created.id);
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);

    let user = h.ctx.store.repo().find_user("u1").await.unwrap().unwrap();
    assert_eq!(user.subscription_status, UserSubscriptionStatus::Cancelled);
    assert_eq!(evaluate(&h.ctx.store, Some(&rider), "p1").await.unwrap(), Entitlement::Denied);
}

#[tokio::test]
async fn inactive_update_cancels() {
    let h = harness().await;
    seed_user(&h.ctx, "u1", Role::User).await;
    subscription_created_or_updated(&h.ctx, active_change("sub_1", "u1")).await.unwrap();

    let mut change = active_change("sub_1", "u1");
    change.is_active = false;
    let updated = subscription_created_or_updated(&h.ctx, change).await.unwrap();
    assert_eq!(updated.status, SubscriptionStatus::Cancelled);
}

#[tokio::test]
async fn subscription_for_unknown_user_rolls_back() {
    let h = harness().await;
    let err = subscription_created_or_updated(&h.ctx, active_change("sub_1", "ghost")).await.unwrap_err();
    assert!(matches!(err, MarketError::NotFound(ErrorCode::UserNotFound)));
    assert!(h.ctx.store.repo().find_subscription_by_external_id("sub_1").await.unwrap().is_none());
}

#[tokio::test]
async fn deleting_unknown_subscription_is_not_found() {
    let h = harness().await;
    let err = subscription_deleted(&h.ctx, "sub_missing").await.unwrap_err();
    assert!(matches!(err, MarketError::NotFound(ErrorCode::SubscriptionNotFound)));
}

async fn assert_stale_event_keeps_resubscription(h: &Harness) {
    let rider = seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "p1", AccessType::Premium, None).await;

    subscription_created_or_updated(&h.ctx, active_change("sub_old", "u1")).await.unwrap();
    subscription_deleted(&h.ctx, "sub_old").await.unwrap();
    let renewed = subscription_created_or_updated(&h.ctx, active_change("sub_new", "u1")).await.unwrap();
    assert_eq!(
        evaluate(&h.ctx.store, Some(&rider), "p1").await.unwrap(),
        Entitlement::Granted(GrantReason::Subscribed)
    );

    // Late update for the cancelled subscription arrives after the new one.
    let mut stale = active_change("sub_old", "u1");
    stale.is_active = false;
    let old = subscription_created_or_updated(&h.ctx, stale).await.unwrap();
    assert_eq!(old.status, SubscriptionStatus::Cancelled);

    assert_eq!(
        evaluate(&h.ctx.store, Some(&rider), "p1").await.unwrap(),
        Entitlement::Granted(GrantReason::Subscribed)
    );
    // The cache follows the most recently written row.
    let user = h.ctx.store.repo().find_user("u1").await.unwrap().unwrap();
    assert_eq!(user.subscription_status, UserSubscriptionStatus::Cancelled);
    let active = active_subscription_for_user(&h.ctx.store, "u1").await.unwrap().unwrap();
    assert_eq!(active.id, renewed.id);
    assert_eq!(active.stripe_subscription_id, "sub_new");
}

#[tokio::test]
async fn stale_event_for_old_subscription_keeps_premium_access() {
    let h = harness().await;
    assert_stale_event_keeps_resubscription(&h).await;
}

#[tokio::test]
async fn renewal_refreshes_billing_period() {
    let h = harness().await;
    seed_user(&h.ctx, "u1", Role::User).await;
    let first = active_change("sub_1", "u1");
    subscription_created_or_updated(&h.ctx, first.clone()).await.unwrap();

    let mut renewal = first.clone();
    renewal.period_start = first.period_start + Duration::days(30);
    renewal.period_end = first.period_end + Duration::days(30);
    let updated = subscription_created_or_updated(&h.ctx, renewal.clone()).await.unwrap();

    let stored = h.ctx.store.repo().find_subscription_by_external_id("sub_1").await.unwrap().unwrap();
    assert_eq!(stored.id, updated.id);
    assert_eq!(timestamp::format(&stored.start_date), timestamp::format(&renewal.period_start));
    assert_eq!(timestamp::format(&stored.end_date), timestamp::format(&renewal.period_end));
}

// ── Free-tier tokens ────────────────────────────────────────────

#[tokio::test]
async fn token_valid_until_expiry() {
    let h = harness().await;
    seed_route(&h.ctx, "free", AccessType::Free, None).await;

    let issued = issue_token(&h.ctx, " Rider@Example.com ", "free").await.unwrap();
    assert_eq!(issued.email, "rider@example.com");
    assert_eq!(issued.token.len(), 64);

    let before = issued.expires_at - Duration::seconds(1);
    let location = redeem_at(&h.ctx.store, &issued.token, before).await.unwrap();
    assert_eq!(location.gpx_file_url, "https://cdn.example.com/gpx/free.gpx");
    // Still redeemable before expiry.
    assert!(redeem_at(&h.ctx.store, &issued.token, before).await.is_ok());

    let after = issued.expires_at + Duration::seconds(1);
    let err = redeem_at(&h.ctx.store, &issued.token, after).await.unwrap_err();
    assert!(matches!(err, MarketError::Expired(ErrorCode::DownloadLinkExpired)));

    let record = h.ctx.store.repo().find_download_token(&issued.token).await.unwrap().unwrap();
    assert!(record.downloaded_at.is_some());

    let sent = h.email.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Your Free Route: Route free");
    assert!(sent[0].html.contains(&h.ctx.download_url(&issued.token)));
}

#[tokio::test]
async fn token_is_expired_at_exactly_expires_at() {
    let h = harness().await;
    seed_route(&h.ctx, "free", AccessType::Free, None).await;
    let issued = issue_token(&h.ctx, "rider@example.com", "free").await.unwrap();

    let err = redeem_at(&h.ctx.store, &issued.token, issued.expires_at).await.unwrap_err();
    assert!(matches!(err, MarketError::Expired(ErrorCode::DownloadLinkExpired)));
    let record = h.ctx.store.repo().find_download_token(&issued.token).await.unwrap().unwrap();
    assert!(record.downloaded_at.is_none());
}

#[tokio::test]
async fn token_issue_rejects_paid_route_and_bad_email() {
    let h = harness().await;
    seed_route(&h.ctx, "r1", AccessType::Paid, Some(12.5)).await;

    let err = issue_token(&h.ctx, "rider@example.com", "r1").await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidRequest { code: ErrorCode::RouteNotFree, .. }));
    let err = issue_token(&h.ctx, "not-an-email", "r1").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidEmail);
}

#[tokio::test]
async fn repeated_capture_keeps_one_subscriber() {
    let h = harness().await;
    seed_route(&h.ctx, "free", AccessType::Free, None).await;

    let a = issue_token(&h.ctx, "rider@example.com", "free").await.unwrap();
    let b = issue_token(&h.ctx, "rider@example.com", "free").await.unwrap();
    assert_ne!(a.token, b.token);
    assert!(h.ctx.store.repo().find_subscriber("rider@example.com").await.unwrap().is_some());
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let h = harness().await;
    let err = redeem_at(&h.ctx.store, "nope", Utc::now()).await.unwrap_err();
    assert!(matches!(err, MarketError::NotFound(ErrorCode::DownloadTokenNotFound)));
    assert_eq!(err.to_string(), "Invalid or expired download link");
}

// ── Webhooks ────────────────────────────────────────────────────

#[tokio::test]
async fn webhook_redelivery_records_one_purchase() {
    let h = harness().await;
    seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "r1", AccessType::Paid, Some(12.5)).await;

    let (body, header) = signed(&payment_event("u1", "r1", "tx_1"));
    let first = handle_stripe_webhook(&h.ctx, &body, Some(&header)).await.unwrap();
    let second = handle_stripe_webhook(&h.ctx, &body, Some(&header)).await.unwrap();

    assert!(matches!(first, WebhookOutcome::PurchaseRecorded { created: true, .. }));
    assert!(matches!(second, WebhookOutcome::PurchaseRecorded { created: false, .. }));

    let purchases = h.ctx.store.repo().all_purchases().await.unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].amount, 12.5);
    assert_eq!(purchases[0].transaction_id, "tx_1");
}

#[tokio::test]
async fn unsigned_webhook_mutates_nothing() {
    let h = harness().await;
    seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "r1", AccessType::Paid, Some(12.5)).await;
    let body = serde_json::to_vec(&payment_event("u1", "r1", "tx_1")).unwrap();

    let err = handle_stripe_webhook(&h.ctx, &body, None).await.unwrap_err();
    assert!(matches!(err, MarketError::Unauthorized(ErrorCode::MissingSignature)));

    let err = handle_stripe_webhook(&h.ctx, &body, Some("t=1,v1=deadbeef")).await.unwrap_err();
    assert_eq!(err.status().status_code(), 401);

    assert!(h.ctx.store.repo().all_purchases().await.unwrap().is_empty());
}

#[tokio::test]
async fn webhook_subscription_flow() {
    let h = harness().await;
    let rider = seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "p1", AccessType::Premium, None).await;

    let (body, header) = signed(&subscription_event("customer.subscription.created", "sub_1", "u1", "trialing"));
    handle_stripe_webhook(&h.ctx, &body, Some(&header)).await.unwrap();
    assert!(evaluate(&h.ctx.store, Some(&rider), "p1").await.unwrap().is_granted());

    let sub = h.ctx.store.repo().find_subscription_by_external_id("sub_1").await.unwrap().unwrap();
    assert_eq!(sub.plan_id, "monthly");

    let (body, header) = signed(&subscription_event("customer.subscription.deleted", "sub_1", "u1", "canceled"));
    let outcome = handle_stripe_webhook(&h.ctx, &body, Some(&header)).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::SubscriptionCancelled { .. }));
    assert_eq!(evaluate(&h.ctx.store, Some(&rider), "p1").await.unwrap(), Entitlement::Denied);
}

#[tokio::test]
async fn webhook_deletion_of_unknown_subscription_is_acknowledged() {
    let h = harness().await;
    let (body, header) = signed(&subscription_event("customer.subscription.deleted", "sub_x", "u1", "canceled"));
    let outcome = handle_stripe_webhook(&h.ctx, &body, Some(&header)).await.unwrap();
    assert_eq!(
        outcome,
        WebhookOutcome::UnknownSubscription {
            subscription_id: "sub_x".into()
        }
    );
}

#[tokio::test]
async fn webhook_ignores_other_events() {
    let h = harness().await;
    let (body, header) = signed(&json!({
        "id": "evt_other",
        "type": "charge.refunded",
        "created": 0,
        "data": { "object": {} }
    }));
    let outcome = handle_stripe_webhook(&h.ctx, &body, Some(&header)).await.unwrap();
    assert_eq!(
        outcome,
        WebhookOutcome::Ignored {
            event_type: "charge.refunded".into()
        }
    );
}

// ── Payments, catalog, accounts, dashboard ──────────────────────

#[tokio::test]
async fn initiate_payment_rules() {
    let h = harness().await;
    let rider = seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "r1", AccessType::Paid, Some(12.5)).await;
    seed_route(&h.ctx, "free", AccessType::Free, None).await;

    let initiation = initiate_payment(&h.ctx, &rider, "r1").await.unwrap();
    assert_eq!(initiation.client_secret, "pi_1_secret");
    assert_eq!(initiation.amount, 12.5);
    let requests = h.payments.requests();
    assert_eq!(requests[0].amount_minor, 1250);
    assert_eq!(requests[0].currency, "usd");
    assert_eq!(requests[0].metadata.route_id, "r1");

    let err = initiate_payment(&h.ctx, &rider, "free").await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidRequest { code: ErrorCode::RouteIsFree, .. }));
    assert_eq!(err.public_message(), "This route is free");

    record_confirmed_payment(&h.ctx, payment("u1", "r1", "tx_1")).await.unwrap();
    let err = initiate_payment(&h.ctx, &rider, "r1").await.unwrap_err();
    assert!(matches!(err, MarketError::Conflict(ErrorCode::AlreadyPurchased)));
}

#[tokio::test]
async fn admin_creates_route_with_uploads() {
    let h = harness().await;
    let admin = seed_user(&h.ctx, "admin", Role::Admin).await;
    let rider = seed_user(&h.ctx, "rider", Role::User).await;

    let new = NewRoute {
        title: "Ridge Loop".into(),
        description: "Views".into(),
        distance: 18.2,
        elevation_gain: 900,
        difficulty: Difficulty::Moderate,
        location: "Dolomites".into(),
        access_type: AccessType::Free,
        price: Some(9.0),
    };
    let gpx = Upload {
        file_name: "ridge.gpx".into(),
        content_type: "application/gpx+xml".into(),
        bytes: b"<gpx/>".to_vec(),
    };

    let err = create_route(&h.ctx, &rider, new.clone(), gpx.clone(), None).await.unwrap_err();
    assert!(matches!(err, MarketError::Forbidden(_)));

    let route = create_route(&h.ctx, &admin, new, gpx, None).await.unwrap();
    assert!(route.is_published);
    assert_eq!(route.price, None);
    assert!(route.gpx_file_url.starts_with("https://cdn.example.com/gpx/"));
    assert_eq!(h.storage.keys().len(), 1);

    assert_eq!(get_published(&h.ctx.store, &route.id).await.unwrap().title, "Ridge Loop");
}

#[tokio::test]
async fn listing_paginates_published_routes() {
    let h = harness().await;
    for i in 0..5 {
        seed_route(&h.ctx, &format!("r{i}"), AccessType::Free, None).await;
    }

    let page = list_published(&h.ctx.store, 2, 2).await.unwrap();
    assert_eq!(page.routes.len(), 2);
    assert_eq!(page.pagination.total, 5);
    assert_eq!(page.pagination.pages, 3);

    let last = list_published(&h.ctx.store, 3, 2).await.unwrap();
    assert_eq!(last.routes.len(), 1);

    assert!(list_published(&h.ctx.store, 0, 20).await.is_err());
    assert!(list_published(&h.ctx.store, 1, 101).await.is_err());
}

#[tokio::test]
async fn sign_up_sign_in_and_authenticate() {
    let h = harness().await;
    let session = sign_up(
        &h.ctx,
        SignUp {
            name: "Rider".into(),
            email: "Rider@Example.com".into(),
            password: "correct horse".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(session.user.email, "rider@example.com");

    let again = sign_in(&h.ctx, "rider@example.com", "correct horse").await.unwrap();
    let user = authenticate(&h.ctx, &again.token).await.unwrap();
    assert_eq!(user.id, session.user.id);
    assert_eq!(user.role, Role::User);

    let err = sign_in(&h.ctx, "rider@example.com", "wrong password").await.unwrap_err();
    assert!(matches!(err, MarketError::Unauthorized(ErrorCode::InvalidEmailOrPassword)));
    assert!(authenticate(&h.ctx, "garbage").await.is_err());
}

#[tokio::test]
async fn dashboard_and_admin_stats() {
    let h = harness().await;
    let admin = seed_user(&h.ctx, "admin", Role::Admin).await;
    let rider = seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "r1", AccessType::Paid, Some(12.5)).await;
    seed_route(&h.ctx, "r2", AccessType::Paid, Some(7.5)).await;

    record_confirmed_payment(&h.ctx, payment("u1", "r1", "tx_1")).await.unwrap();
    let mut second = payment("u1", "r2", "tx_2");
    second.amount_minor = 750;
    record_confirmed_payment(&h.ctx, second).await.unwrap();
    subscription_created_or_updated(&h.ctx, active_change("sub_1", "u1")).await.unwrap();

    let view = dashboard(&h.ctx.store, &rider).await.unwrap();
    assert_eq!(view.purchases.len(), 2);
    assert!(view.purchases.iter().all(|p| p.route_title.is_some()));
    assert!(view.subscription.is_some());

    let stats = admin_stats(&h.ctx.store, &admin).await.unwrap();
    assert_eq!(stats.total_routes, 2);
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.total_purchases, 2);
    assert_eq!(stats.total_revenue, 20.0);
    assert_eq!(stats.recent_routes.len(), 2);

    assert!(admin_stats(&h.ctx.store, &rider).await.is_err());
}

// ── SQLite ──────────────────────────────────────────────────────

#[tokio::test]
async fn sqlite_purchase_is_idempotent_and_conflicts() {
    let h = sqlite_harness().await;
    let rider = seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "r1", AccessType::Paid, Some(12.5)).await;

    let (body, header) = signed(&payment_event("u1", "r1", "tx_1"));
    handle_stripe_webhook(&h.ctx, &body, Some(&header)).await.unwrap();
    handle_stripe_webhook(&h.ctx, &body, Some(&header)).await.unwrap();

    let err = record_confirmed_payment(&h.ctx, payment("u1", "r1", "tx_2")).await.unwrap_err();
    assert!(matches!(err, MarketError::Conflict(_)));

    let purchases = h.ctx.store.repo().all_purchases().await.unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].amount, 12.5);
    assert_eq!(
        evaluate(&h.ctx.store, Some(&rider), "r1").await.unwrap(),
        Entitlement::Granted(GrantReason::Purchased)
    );
}

#[tokio::test]
async fn sqlite_subscription_lifecycle() {
    let h = sqlite_harness().await;
    let rider = seed_user(&h.ctx, "u1", Role::User).await;
    seed_route(&h.ctx, "p1", AccessType::Premium, None).await;

    subscription_created_or_updated(&h.ctx, active_change("sub_1", "u1")).await.unwrap();
    assert!(evaluate(&h.ctx.store, Some(&rider), "p1").await.unwrap().is_granted());

    subscription_deleted(&h.ctx, "sub_1").await.unwrap();
    let user = h.ctx.store.repo().find_user("u1").await.unwrap().unwrap();
    assert_eq!(user.subscription_status, UserSubscriptionStatus::Cancelled);
    assert_eq!(evaluate(&h.ctx.store, Some(&rider), "p1").await.unwrap(), Entitlement::Denied);

    let err = subscription_created_or_updated(&h.ctx, active_change("sub_2", "ghost")).await.unwrap_err();
    assert!(matches!(err, MarketError::NotFound(_)));
    assert!(h.ctx.store.repo().find_subscription_by_external_id("sub_2").await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_concurrent_deliveries_record_one_purchase() {
    let h = sqlite_harness().await;
    assert_concurrent_redelivery_records_once(&h).await;
}

#[tokio::test]
async fn sqlite_stale_event_keeps_resubscription() {
    let h = sqlite_harness().await;
    assert_stale_event_keeps_resubscription(&h).await;
}
