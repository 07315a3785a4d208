// Session JWTs: HS256 sign/verify using the `jsonwebtoken` crate.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use routemarket_core::error::MarketError;

/// Sign `payload` with HS256, adding `iat` and `exp` claims.
pub fn sign_jwt<T: Serialize>(payload: &T, secret: &str, expires_in_secs: u64) -> Result<String, MarketError> {
    let now = chrono::Utc::now().timestamp().max(0) as u64;

    let claims = JwtClaims {
        payload: serde_json::to_value(payload)
            .map_err(|e| MarketError::Config(format!("Failed to serialize JWT payload: {e}")))?,
        iat: now,
        exp: now + expires_in_secs,
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
        .map_err(|e| MarketError::Config(format!("JWT signing failed: {e}")))
}

/// Verify and decode an HS256 JWT. `None` if the signature, expiry or payload is invalid.
pub fn verify_jwt<T: DeserializeOwned>(token: &str, secret: &str) -> Option<T> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;
    validation.required_spec_claims.clear();

    let token_data = jsonwebtoken::decode::<JwtClaims>(token, &key, &validation).ok()?;
    serde_json::from_value(token_data.claims.payload).ok()
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    #[serde(flatten)]
    payload: serde_json::Value,
    iat: u64,
    exp: u64,
}
