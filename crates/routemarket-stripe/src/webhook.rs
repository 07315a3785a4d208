//! Stripe webhook signature verification and event decoding.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::StripeError;
use crate::types::*;

type HmacSha256 = Hmac<Sha256>;

/// Parsed `Stripe-Signature` header: `t=<timestamp>,v1=<sig>[,v1=<sig>...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

/// Parse a `Stripe-Signature` header. Unknown schemes (e.g. `v0`) are skipped.
pub fn parse_signature_header(header: &str) -> Result<SignatureHeader, StripeError> {
    if header.trim().is_empty() {
        return Err(StripeError::MissingSignature);
    }

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature)?;
    if signatures.is_empty() {
        return Err(StripeError::InvalidSignature);
    }
    Ok(SignatureHeader { timestamp, signatures })
}

/// Hex HMAC-SHA256 of `{timestamp}.{payload}` under `secret`.
pub fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> String {
    // HMAC accepts keys of any length, so this never fails.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a Stripe webhook signature against the current time.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    webhook_secret: &str,
    tolerance_secs: Option<i64>,
) -> Result<(), StripeError> {
    verify_webhook_signature_at(
        payload,
        signature_header,
        webhook_secret,
        tolerance_secs,
        Utc::now().timestamp(),
    )
}

/// Verify a Stripe webhook signature as of `now` (unix seconds).
///
/// Succeeds when any `v1` signature matches. With a tolerance, events signed
/// more than `tolerance_secs` away from `now` are rejected as replays.
pub fn verify_webhook_signature_at(
    payload: &[u8],
    signature_header: &str,
    webhook_secret: &str,
    tolerance_secs: Option<i64>,
    now: i64,
) -> Result<(), StripeError> {
    let header = parse_signature_header(signature_header)?;
    let expected = compute_signature(payload, webhook_secret, header.timestamp);

    let matched = header
        .signatures
        .iter()
        .any(|sig| bool::from(expected.as_bytes().ct_eq(sig.as_bytes())));
    if !matched {
        return Err(StripeError::InvalidSignature);
    }

    if let Some(tolerance) = tolerance_secs {
        if (now - header.timestamp).abs() > tolerance {
            return Err(StripeError::TimestampOutsideTolerance);
        }
    }
    Ok(())
}

/// Verify the signature, then decode the event.
pub fn construct_event(
    payload: &[u8],
    signature_header: Option<&str>,
    webhook_secret: &str,
    tolerance_secs: Option<i64>,
) -> Result<StripeEvent, StripeError> {
    let header = signature_header.ok_or(StripeError::MissingSignature)?;
    verify_webhook_signature(payload, header, webhook_secret, tolerance_secs)?;
    parse_event(payload)
}

/// Event types the marketplace acts on.
pub const SUPPORTED_EVENTS: &[&str] = &[
    "payment_intent.succeeded",
    "customer.subscription.created",
    "customer.subscription.updated",
    "customer.subscription.deleted",
];

pub fn is_supported_event(event_type: &str) -> bool {
    SUPPORTED_EVENTS.contains(&event_type)
}

/// Decode an (already verified) webhook body.
pub fn parse_event(payload: &[u8]) -> Result<StripeEvent, StripeError> {
    let event: WebhookEvent =
        serde_json::from_slice(payload).map_err(|e| StripeError::InvalidPayload(e.to_string()))?;

    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            let intent: PaymentIntentObject = decode_object(event.data.object)?;
            Ok(StripeEvent::PaymentSucceeded(payment_succeeded(intent)?))
        }
        "customer.subscription.created" | "customer.subscription.updated" => {
            let sub: SubscriptionObject = decode_object(event.data.object)?;
            Ok(StripeEvent::SubscriptionUpserted(subscription_update(sub)?))
        }
        "customer.subscription.deleted" => {
            let sub: SubscriptionObject = decode_object(event.data.object)?;
            Ok(StripeEvent::SubscriptionDeleted { subscription_id: sub.id })
        }
        other => {
            tracing::debug!(event_type = other, "ignoring unsupported stripe event");
            Ok(StripeEvent::Ignored { event_type: other.to_string() })
        }
    }
}

fn decode_object<T: serde::de::DeserializeOwned>(object: serde_json::Value) -> Result<T, StripeError> {
    serde_json::from_value(object).map_err(|e| StripeError::InvalidPayload(e.to_string()))
}

fn payment_succeeded(intent: PaymentIntentObject) -> Result<PaymentSucceeded, StripeError> {
    let mut metadata = intent.metadata;
    let user_id = metadata.remove("userId").ok_or(StripeError::MissingMetadata("userId"))?;
    let route_id = metadata.remove("routeId").ok_or(StripeError::MissingMetadata("routeId"))?;

    Ok(PaymentSucceeded {
        payment_intent_id: intent.id,
        user_id,
        route_id,
        route_title: metadata.remove("routeTitle"),
        amount_minor: intent.amount_received.unwrap_or(intent.amount),
        currency: intent.currency,
    })
}

fn subscription_update(sub: SubscriptionObject) -> Result<SubscriptionUpdate, StripeError> {
    let price_id = sub.price_id().map(str::to_string);
    let mut metadata = sub.metadata;
    Ok(SubscriptionUpdate {
        user_id: metadata.remove("userId"),
        price_id,
        status: parse_subscription_status(&sub.status),
        period_start: unix_to_datetime(sub.current_period_start)?,
        period_end: unix_to_datetime(sub.current_period_end)?,
        subscription_id: sub.id,
    })
}

fn unix_to_datetime(secs: i64) -> Result<DateTime<Utc>, StripeError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| StripeError::InvalidPayload(format!("timestamp out of range: {secs}")))
}

/// Parse a Stripe subscription status string.
pub fn parse_subscription_status(status: &str) -> SubscriptionStatus {
    match status {
        "active" => SubscriptionStatus::Active,
        "canceled" => SubscriptionStatus::Canceled,
        "incomplete" => SubscriptionStatus::Incomplete,
        "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
        "past_due" => SubscriptionStatus::PastDue,
        "trialing" => SubscriptionStatus::Trialing,
        "unpaid" => SubscriptionStatus::Unpaid,
        "paused" => SubscriptionStatus::Paused,
        _ => SubscriptionStatus::Incomplete,
    }
}
