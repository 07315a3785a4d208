// Typed storage models and the closed enums they use.
//
// Field names serialize camelCase, matching the column names in
// `MarketSchema::marketplace()`. Enum values serialize SCREAMING_SNAKE_CASE;
// unknown strings fail to deserialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Table names.
pub mod tables {
    pub const ROUTE: &str = "route";
    pub const USER: &str = "user";
    pub const PURCHASE: &str = "purchase";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const EMAIL_SUBSCRIBER: &str = "email_subscriber";
    pub const EMAIL_DOWNLOAD: &str = "email_download";
}

/// Fixed-width RFC 3339 timestamps (microseconds, `Z` suffix) so that stored
/// strings sort chronologically.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => serializer.serialize_some(&format(dt)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}

// ─── Enums ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
}

/// How a route's content is unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessType {
    /// Email capture unlocks a time-limited download.
    Free,
    /// One-time purchase.
    Paid,
    /// Active subscription, or a one-time purchase when priced.
    Premium,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Status stored on a subscription row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn from_active(is_active: bool) -> Self {
        if is_active {
            Self::Active
        } else {
            Self::Cancelled
        }
    }
}

/// Subscription status cached on the user row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserSubscriptionStatus {
    #[default]
    None,
    Active,
    Cancelled,
}

impl From<SubscriptionStatus> for UserSubscriptionStatus {
    fn from(status: SubscriptionStatus) -> Self {
        match status {
            SubscriptionStatus::Active => Self::Active,
            SubscriptionStatus::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseStatus {
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProviderKind {
    Stripe,
}

// ─── Models ──────────────────────────────────────────────────────

/// A published or draft route listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Kilometres.
    pub distance: f64,
    /// Metres.
    pub elevation_gain: i64,
    pub difficulty: Difficulty,
    pub location: String,
    pub access_type: AccessType,
    /// Display-currency units. Required for PAID, optional for PREMIUM.
    #[serde(default)]
    pub price: Option<f64>,
    pub gpx_file_url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    pub is_published: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Route {
    /// Price in minor units, if the route is priced.
    pub fn price_minor(&self) -> Option<i64> {
        self.price.map(|p| (p * 100.0).round() as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub subscription_status: UserSubscriptionStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
            subscription_status: self.subscription_status,
            created_at: self.created_at,
        }
    }
}

/// User as exposed over the API (no password hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub subscription_status: UserSubscriptionStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// An immutable record of a completed one-time payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: String,
    pub user_id: String,
    pub route_id: String,
    /// Display-currency units.
    pub amount: f64,
    pub currency: String,
    pub payment_provider: PaymentProviderKind,
    pub transaction_id: String,
    pub status: PurchaseStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub stripe_subscription_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    #[serde(with = "timestamp")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub end_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSubscriber {
    pub id: String,
    pub email: String,
    pub source: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Time-limited, email-addressed download credential for a FREE route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDownloadToken {
    pub id: String,
    pub token: String,
    pub email: String,
    pub route_id: String,
    #[serde(with = "timestamp")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub downloaded_at: Option<DateTime<Utc>>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl EmailDownloadToken {
    /// A token is usable strictly before its expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_enums_use_screaming_snake_case() {
        assert_eq!(serde_json::to_value(AccessType::Premium).unwrap(), "PREMIUM");
        assert_eq!(serde_json::to_value(Difficulty::Moderate).unwrap(), "MODERATE");
        assert_eq!(serde_json::to_value(UserSubscriptionStatus::None).unwrap(), "NONE");
        let role: Role = serde_json::from_value(serde_json::json!("ADMIN")).unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_unknown_enum_value_is_rejected() {
        let parsed: Result<AccessType, _> = serde_json::from_value(serde_json::json!("GOLD"));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_timestamps_are_fixed_width() {
        let whole = "2025-03-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let frac = whole + Duration::milliseconds(500);
        let a = timestamp::format(&whole);
        let b = timestamp::format(&frac);
        assert_eq!(a, "2025-03-01T10:00:00.000000Z");
        assert!(a < b);
    }

    #[test]
    fn test_price_minor_rounds() {
        let now = Utc::now();
        let route = Route {
            id: "r1".into(),
            title: "Coastal Loop".into(),
            description: "".into(),
            distance: 42.5,
            elevation_gain: 610,
            difficulty: Difficulty::Hard,
            location: "Big Sur".into(),
            access_type: AccessType::Paid,
            price: Some(12.5),
            gpx_file_url: "https://cdn/gpx/a.gpx".into(),
            thumbnail_url: None,
            is_published: true,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(route.price_minor(), Some(1250));
    }

    #[test]
    fn test_token_expiry_boundary() {
        let now = Utc::now();
        let token = EmailDownloadToken {
            id: "t".into(),
            token: "ab".into(),
            email: "a@b.co".into(),
            route_id: "r".into(),
            expires_at: now,
            downloaded_at: None,
            created_at: now - Duration::hours(24),
        };
        assert!(token.is_expired_at(now));
        assert!(!token.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_profile_hides_password_hash() {
        let now = Utc::now();
        let user = User {
            id: "u1".into(),
            email: "rider@example.com".into(),
            name: "Rider".into(),
            password_hash: "salt:key".into(),
            role: Role::User,
            subscription_status: UserSubscriptionStatus::None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(user.profile()).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["subscriptionStatus"], "NONE");
    }
}
