//! Stripe wire types and the decoded events the marketplace reacts to.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stripe webhook envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
    #[serde(default)]
    pub created: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// The `payment_intent` object, reduced to the fields we read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_received: Option<i64>,
    pub currency: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// The `subscription` object, reduced to the fields we read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub status: String,
    pub current_period_start: i64,
    pub current_period_end: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
}

impl SubscriptionObject {
    /// Price id of the first subscription item.
    pub fn price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }
}

/// Stripe subscription statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Trialing,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    /// Statuses that grant access to premium content.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

/// A successful one-time payment, as reported by `payment_intent.succeeded`.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSucceeded {
    pub payment_intent_id: String,
    pub user_id: String,
    pub route_id: String,
    pub route_title: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
}

/// A subscription creation or update.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    pub subscription_id: String,
    pub user_id: Option<String>,
    pub price_id: Option<String>,
    pub status: SubscriptionStatus,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// Webhook events decoded into what the marketplace acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum StripeEvent {
    PaymentSucceeded(PaymentSucceeded),
    SubscriptionUpserted(SubscriptionUpdate),
    SubscriptionDeleted { subscription_id: String },
    /// Any other event type. Acknowledged without action.
    Ignored { event_type: String },
}
