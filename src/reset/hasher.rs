use anyhow::{Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// One-way password hashing for stored credentials.
pub trait CredentialHasher: Send + Sync {
    /// Hash a password into a self-describing string (PHC format).
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    fn hash(&self, password: &str) -> Result<String>;

    /// Check a password against a stored hash. Malformed hashes never match.
    fn verify(&self, password: &str, password_hash: &str) -> bool;
}

/// Argon2id hasher. Default params unless custom costs are supplied.
#[derive(Clone, Debug, Default)]
pub struct Argon2Hasher {
    params: Option<Params>,
}

impl Argon2Hasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom memory (KiB), time, and parallelism costs.
    ///
    /// # Errors
    /// Returns an error if the costs are out of range for Argon2.
    pub fn with_costs(memory_kib: u32, time_cost: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, time_cost, parallelism, None)
            .map_err(|e| anyhow!("Invalid Argon2 params: {e}"))?;
        Ok(Self {
            params: Some(params),
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        match &self.params {
            Some(params) => Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone()),
            None => Argon2::default(),
        }
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, password_hash: &str) -> bool {
        PasswordHash::new(password_hash).is_ok_and(|parsed| {
            self.argon2()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Result<Argon2Hasher> {
        Argon2Hasher::with_costs(1024, 1, 1)
    }

    #[test]
    fn hash_and_verify() -> Result<()> {
        let hasher = cheap()?;
        let hash = hasher.hash("NewPass123")?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("NewPass123", &hash));
        assert!(!hasher.verify("WrongPass123", &hash));
        Ok(())
    }

    #[test]
    fn salts_differ_between_hashes() -> Result<()> {
        let hasher = cheap()?;
        assert_ne!(hasher.hash("NewPass123")?, hasher.hash("NewPass123")?);
        Ok(())
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!Argon2Hasher::new().verify("NewPass123", "not-a-phc-string"));
    }

    #[test]
    fn invalid_costs_rejected() {
        assert!(Argon2Hasher::with_costs(1, 0, 0).is_err());
    }
}
