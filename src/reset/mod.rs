//! Password-reset token lifecycle.
//!
//! [`ResetManager`] owns issuance, verification, and consumption of reset tokens.
//! Everything it touches sits behind a trait so the same lifecycle runs against
//! Postgres in production and the in-memory store in tests:
//!
//! - [`UserDirectory`]: lookup by email/id and password updates.
//! - [`TokenStore`]: token records keyed by their SHA-256 digest.
//! - [`CredentialHasher`]: one-way password hashing (Argon2id by default).
//! - [`Notifier`]: out-of-band delivery of the reset link (SMTP or log).
//! - [`Clock`]: source of "now" for expiry checks.
//!
//! ## Token states
//!
//! `Issued -> Valid -> {Consumed | Expired | Superseded}`. Every terminal state
//! deletes the record. While a consume is in flight the token is *claimed*: a
//! claimed token cannot be claimed again and no longer verifies. If the password
//! update fails the claim is released and the token is usable again.

mod clock;
mod error;
mod hasher;
mod manager;
pub mod memory;
mod notifier;
mod postgres;
mod store;
mod sweeper;
mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ResetError;
pub use hasher::{Argon2Hasher, CredentialHasher};
pub use manager::{
    IssueOutcome, IssuedToken, MAX_TOKEN_TTL_SECONDS, ResetConfig, ResetManager, VerifiedToken,
    validate_password,
};
pub use memory::MemoryStore;
pub use notifier::{LogNotifier, Notifier, ResetNotice, SmtpConfig, SmtpNotifier};
pub use postgres::PgStore;
pub use store::{InsertOutcome, ResetTokenRecord, TokenStore, UserDirectory, UserRecord};
pub use sweeper::spawn_expiry_sweeper;
pub use token::{
    OsTokenGenerator, TokenGenerator, build_reset_url, hash_reset_token, normalize_email,
};
