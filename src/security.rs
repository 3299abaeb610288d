//! Cryptographically secure primitives shared by the auth and persistence
//! layers: bearer token generation and constant-time comparison.

use rand::{distributions::Alphanumeric, thread_rng, Rng};
use subtle::ConstantTimeEq;

/// Base62 token length. `TOKEN_ENTROPY_BYTES` raw bytes would give more
/// entropy per character with base64, but base62 avoids characters that
/// need escaping in shell env vars and URLs the token might travel through.
pub const TOKEN_LENGTH: usize = 43;

/// Generates a bearer token with at least 128 bits of entropy
/// (43 base62 characters * ~5.95 bits/char ~= 256 bits).
pub fn generate_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Compares two tokens in constant time to avoid leaking length/prefix
/// information through response timing.
pub fn tokens_equal(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_have_expected_length_and_charset() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_alphanumeric()));
    }

    #[test]
    fn generated_tokens_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(generate_token()));
        }
    }

    #[test]
    fn tokens_equal_is_exact() {
        let token = generate_token();
        assert!(tokens_equal(&token, &token));
        assert!(!tokens_equal(&token, "not-the-token"));
    }

    #[test]
    fn tokens_equal_rejects_different_lengths() {
        assert!(!tokens_equal("short", "a-bit-longer"));
    }
}
