//! Opaque bearer secrets and identifiers.
//!
//! Every value is 32 bytes from the OS CSPRNG, rendered as unpadded URL-safe
//! base64 (43 chars), so it can travel in headers, cookies and query strings
//! without escaping.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

const SECRET_BYTES: usize = 32;

/// Generate a fresh high-entropy opaque secret.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Cheap shape check used before touching any lookup table.
pub fn looks_like_secret(value: &str) -> bool {
    value.len() == 43
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_unique_and_well_formed() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        assert!(looks_like_secret(&a));
        assert!(looks_like_secret(&b));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(!looks_like_secret(""));
        assert!(!looks_like_secret("short"));
        assert!(!looks_like_secret(&"a".repeat(42).chars().chain(['=']).collect::<String>()));
    }
}
