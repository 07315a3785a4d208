// Random token generation.

use rand::RngCore;

/// `byte_len` random bytes from the OS-seeded CSPRNG, hex-encoded.
pub fn generate_token_hex(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_and_charset() {
        let token = generate_token_hex(32);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_uniqueness() {
        assert_ne!(generate_token_hex(32), generate_token_hex(32));
    }
}
