// Identifier and email helpers.

/// Generate a unique row id using nanoid (21 characters).
pub fn generate_id() -> String {
    nanoid::nanoid!()
}

/// Trim and lower-case an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shape check: one `@`, non-empty local part, a dotted domain, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((name, tld)) => !name.is_empty() && !tld.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_length() {
        assert_eq!(generate_id().len(), 21);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Rider@Example.COM "), "rider@example.com");
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("rider@example.com"));
        assert!(!is_valid_email("rider@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ri der@example.com"));
        assert!(!is_valid_email("a@b@c.com"));
        assert!(!is_valid_email(""));
    }
}
