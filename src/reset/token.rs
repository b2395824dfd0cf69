//! Reset token generation, hashing, and link construction.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// Random bytes per token (256 bits of entropy).
pub(crate) const TOKEN_BYTES: usize = 32;

/// Produces raw token values. Swappable so collision handling can be exercised.
pub trait TokenGenerator: Send + Sync {
    /// # Errors
    /// Returns an error if the random source fails.
    fn generate(&self) -> Result<String>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OsTokenGenerator;

impl TokenGenerator for OsTokenGenerator {
    fn generate(&self) -> Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate reset token")?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Hash a reset token so the raw value never touches the store.
#[must_use]
pub fn hash_reset_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Normalize an email for case-insensitive lookups.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Build the frontend link included in reset notifications.
#[must_use]
pub fn build_reset_url(frontend_base_url: &str, token: &str, email: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    let email: String = url::form_urlencoded::byte_serialize(email.as_bytes()).collect();
    format!("{base}/reset-password?token={token}&email={email}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn generated_tokens_carry_32_random_bytes() {
        let decoded_len = OsTokenGenerator
            .generate()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(TOKEN_BYTES));
    }

    #[test]
    fn generated_tokens_differ() -> Result<()> {
        let first = OsTokenGenerator.generate()?;
        let second = OsTokenGenerator.generate()?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn hash_reset_token_stable() {
        let first = hash_reset_token("token");
        let second = hash_reset_token("token");
        let different = hash_reset_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn build_reset_url_trims_slash_and_encodes_email() {
        let url = build_reset_url("https://reset.dev/", "abc_-1", "a+b@example.com");
        assert_eq!(
            url,
            "https://reset.dev/reset-password?token=abc_-1&email=a%2Bb%40example.com"
        );
    }
}
