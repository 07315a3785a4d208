//! Stripe configuration.

use serde::{Deserialize, Serialize};

/// Stripe integration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeConfig {
    /// Stripe secret key (`sk_...`).
    pub secret_key: String,
    /// Webhook signing secret (`whsec_...`).
    pub webhook_secret: String,
    /// API base URL. Overridable for tests and proxies.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Maximum accepted age of a signed webhook, in seconds. `None` disables the check.
    #[serde(default = "default_tolerance")]
    pub tolerance_secs: Option<i64>,
    /// Known subscription plans.
    #[serde(default)]
    pub plans: Vec<Plan>,
    /// Plan assigned when an event's price id matches no configured plan.
    #[serde(default = "default_plan")]
    pub default_plan: String,
}

fn default_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_tolerance() -> Option<i64> {
    Some(300)
}

fn default_plan() -> String {
    "monthly".to_string()
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base: default_api_base(),
            tolerance_secs: default_tolerance(),
            plans: Vec::new(),
            default_plan: default_plan(),
        }
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plans.push(plan);
        self
    }

    /// Find a plan by Stripe price ID.
    pub fn find_plan_by_price(&self, price_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.stripe_price_id == price_id)
    }

    /// Plan id for a subscription priced at `price_id`.
    pub fn plan_for_price(&self, price_id: Option<&str>) -> &str {
        price_id
            .and_then(|id| self.find_plan_by_price(id))
            .map(|p| p.id.as_str())
            .unwrap_or(&self.default_plan)
    }
}

/// Subscription plan definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub stripe_price_id: String,
}

impl Plan {
    pub fn new(id: impl Into<String>, name: impl Into<String>, stripe_price_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stripe_price_id: stripe_price_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_for_price_falls_back_to_default() {
        let config = StripeConfig::new("sk_test", "whsec_test")
            .with_plan(Plan::new("yearly", "Yearly", "price_year"));
        assert_eq!(config.plan_for_price(Some("price_year")), "yearly");
        assert_eq!(config.plan_for_price(Some("price_other")), "monthly");
        assert_eq!(config.plan_for_price(None), "monthly");
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: StripeConfig =
            serde_json::from_str(r#"{"secretKey":"sk","webhookSecret":"wh"}"#).unwrap();
        assert_eq!(config.api_base, "https://api.stripe.com");
        assert_eq!(config.tolerance_secs, Some(300));
        assert!(config.plans.is_empty());
    }
}
