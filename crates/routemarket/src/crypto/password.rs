// Password hashing with scrypt (N=16384, r=16, p=1, dkLen=64) and a random
// 16-byte salt. Stored format: "hex(salt):hex(key)".

use rand::RngCore;
use scrypt::{scrypt, Params};
use subtle::ConstantTimeEq;

use routemarket_core::error::MarketError;

/// Hash a password. Returns `salt:key`, both hex-encoded.
pub fn hash_password(password: &str) -> Result<String, MarketError> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt_hex = hex::encode(salt_bytes);

    let key = derive_key(password, &salt_hex)?;
    Ok(format!("{}:{}", salt_hex, hex::encode(key)))
}

/// Check `password` against a hash produced by [`hash_password`].
pub fn verify_password(hash: &str, password: &str) -> Result<bool, MarketError> {
    let (salt, key_hex) = hash
        .split_once(':')
        .ok_or_else(|| MarketError::Config("Invalid password hash format".into()))?;

    let expected = hex::decode(key_hex)
        .map_err(|e| MarketError::Config(format!("Invalid hex in password hash: {e}")))?;
    let derived = derive_key(password, salt)?;

    Ok(derived.ct_eq(&expected).into())
}

fn derive_key(password: &str, salt: &str) -> Result<Vec<u8>, MarketError> {
    // log2(N) = 14
    let params = Params::new(14, 16, 1, 64)
        .map_err(|e| MarketError::Config(format!("Invalid scrypt params: {e}")))?;

    let mut output = vec![0u8; 64];
    scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut output)
        .map_err(|e| MarketError::Config(format!("scrypt failed: {e}")))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse battery").unwrap();
        let (salt, key) = hash.split_once(':').unwrap();
        assert_eq!(salt.len(), 32);
        assert_eq!(key.len(), 128);

        assert!(verify_password(&hash, "correct horse battery").unwrap());
        assert!(!verify_password(&hash, "wrong-password").unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_hash_format() {
        assert!(verify_password("no-colon-here", "password").is_err());
    }
}
