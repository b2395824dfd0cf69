//! # resetd (Password Reset Service)
//!
//! `resetd` issues, verifies, and consumes password-reset tokens on behalf of a
//! single-page frontend.
//!
//! ## Flow
//!
//! 1. The client posts an email to `/api/auth/request-reset`. The response is
//!    identical whether or not an account exists for that email.
//! 2. For a known account a fresh token replaces any previous one and a reset link
//!    is handed to the configured notifier (SMTP or log output).
//! 3. The frontend may pre-validate the link with `GET /api/auth/reset-password/{token}`.
//!    This never consumes the token.
//! 4. The new password is posted to `/api/auth/reset-password/{token}`. The token is
//!    re-validated, claimed atomically, and deleted only after the new password hash
//!    has been stored.
//!
//! ## Token storage
//!
//! Tokens are 32 random bytes from the OS CSPRNG, base64url-encoded. Only their
//! SHA-256 digest is persisted, and the digest carries a unique constraint so a
//! collision fails loudly instead of replacing an existing record.

pub mod api;
pub mod cli;
pub mod reset;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
