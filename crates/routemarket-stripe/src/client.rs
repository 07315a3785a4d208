//! Minimal Stripe REST client.

use serde::Deserialize;

use crate::config::StripeConfig;
use crate::error::StripeError;

/// Parameters for `POST /v1/payment_intents`.
#[derive(Debug, Clone)]
pub struct CreatePaymentIntent {
    /// Amount in minor units (cents).
    pub amount: i64,
    pub currency: String,
    pub metadata: Vec<(String, String)>,
}

impl CreatePaymentIntent {
    fn form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), self.amount.to_string()),
            ("currency".to_string(), self.currency.clone()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        for (key, value) in &self.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }
        form
    }
}

/// The fields of a created PaymentIntent the checkout flow needs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Stripe API client authenticated with the secret key.
#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Create a PaymentIntent with automatic payment methods enabled.
    pub async fn create_payment_intent(&self, params: &CreatePaymentIntent) -> Result<PaymentIntent, StripeError> {
        let url = format!("{}/v1/payment_intents", self.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&params.form())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiErrorBody>().await {
                Ok(body) => body.error.message.unwrap_or_else(|| status.to_string()),
                Err(_) => status.to_string(),
            };
            tracing::warn!(status = status.as_u16(), %message, "stripe payment intent creation failed");
            return Err(StripeError::Api { status: status.as_u16(), message });
        }

        let intent: PaymentIntent = response.json().await?;
        tracing::debug!(payment_intent = %intent.id, "created stripe payment intent");
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_intent_form_encoding() {
        let params = CreatePaymentIntent {
            amount: 1250,
            currency: "usd".into(),
            metadata: vec![("routeId".into(), "r1".into()), ("userId".into(), "u1".into())],
        };
        let form = params.form();
        assert!(form.contains(&("amount".to_string(), "1250".to_string())));
        assert!(form.contains(&("metadata[routeId]".to_string(), "r1".to_string())));
        assert!(form.contains(&("automatic_payment_methods[enabled]".to_string(), "true".to_string())));
    }

    #[tokio::test]
    async fn test_unreachable_api_is_http_error() {
        let mut config = StripeConfig::new("sk_test", "whsec");
        config.api_base = "http://127.0.0.1:9".into();
        let client = StripeClient::new(&config);
        let err = client
            .create_payment_intent(&CreatePaymentIntent { amount: 100, currency: "usd".into(), metadata: vec![] })
            .await
            .unwrap_err();
        assert!(matches!(err, StripeError::Http(_)));
    }
}
