//! Salted, adjustable-cost password hashing (Argon2id, PHC string format).
//!
//! The cost factor maps to the Argon2 time cost (iterations). All parameters
//! are encoded in the output string, so hashes written with older or cheaper
//! settings keep verifying after the defaults are raised.

use super::error::AuthError;
use argon2::{
    password_hash::{rand_core::OsRng, Error as PhcError, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

/// Default Argon2 time cost.
pub const DEFAULT_COST: u32 = 3;

/// Default Argon2 memory cost in KiB (19 MiB).
pub const DEFAULT_MEMORY_KIB: u32 = 19_456;

const PARALLELISM: u32 = 1;

const SELF_TEST_PLAINTEXT: &str = "vouch-self-test";

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
    memory_kib: u32,
}

impl PasswordHasher {
    #[must_use]
    pub const fn new(cost: u32) -> Self {
        Self {
            cost,
            memory_kib: DEFAULT_MEMORY_KIB,
        }
    }

    #[must_use]
    pub const fn with_memory_kib(mut self, memory_kib: u32) -> Self {
        self.memory_kib = memory_kib;
        self
    }

    #[must_use]
    pub const fn cost(&self) -> u32 {
        self.cost
    }

    #[must_use]
    pub const fn memory_kib(&self) -> u32 {
        self.memory_kib
    }

    /// Hash with the configured cost factor.
    ///
    /// # Errors
    /// Returns `HashingFailure` if the parameters are rejected by Argon2.
    pub fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        self.hash_with_cost(plaintext, self.cost)
    }

    /// Hash with an explicit cost factor. Every call draws a fresh salt.
    ///
    /// # Errors
    /// Returns `HashingFailure` for a zero cost or parameters Argon2 rejects.
    pub fn hash_with_cost(&self, plaintext: &str, cost: u32) -> Result<String, AuthError> {
        if cost == 0 {
            return Err(AuthError::HashingFailure(
                "cost factor must be positive".to_string(),
            ));
        }

        let params = Params::new(self.memory_kib, cost, PARALLELISM, None)
            .map_err(|e| AuthError::HashingFailure(format!("invalid parameters: {e}")))?;
        let salt = SaltString::generate(&mut OsRng);

        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::HashingFailure(e.to_string()))
    }

    /// Check `plaintext` against a stored hash.
    ///
    /// Anything that is not an Argon2 PHC string (empty, bcrypt, scrypt, free
    /// text) fails closed with `Ok(false)`. A string that claims to be Argon2
    /// but cannot be decoded is a `HashingFailure`.
    ///
    /// # Errors
    /// Returns `HashingFailure` for a corrupt Argon2 encoding.
    pub fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, AuthError> {
        if !hash.starts_with("$argon2") {
            debug!("foreign hash format, failing closed");
            return Ok(false);
        }

        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::HashingFailure(format!("invalid hash encoding: {e}")))?;

        // Output comparison inside verify_password is constant time.
        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PhcError::Password) => Ok(false),
            Err(PhcError::Algorithm) => Ok(false),
            Err(e) => Err(AuthError::HashingFailure(e.to_string())),
        }
    }

    /// [`hash`](Self::hash) on the blocking pool.
    ///
    /// # Errors
    /// Returns `HashingFailure` if hashing fails or the worker panics.
    #[instrument(skip_all, fields(cost = self.cost))]
    pub async fn hash_blocking(&self, plaintext: SecretString) -> Result<String, AuthError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(plaintext.expose_secret()))
            .await
            .map_err(|e| AuthError::HashingFailure(format!("hashing task failed: {e}")))?
    }

    /// [`verify`](Self::verify) on the blocking pool.
    ///
    /// # Errors
    /// Returns `HashingFailure` for a corrupt hash or if the worker panics.
    #[instrument(skip_all)]
    pub async fn verify_blocking(
        &self,
        plaintext: SecretString,
        hash: String,
    ) -> Result<bool, AuthError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(plaintext.expose_secret(), &hash))
            .await
            .map_err(|e| AuthError::HashingFailure(format!("verification task failed: {e}")))?
    }

    /// Hash a fixed plaintext twice and verify both immediately.
    ///
    /// # Errors
    /// Returns `HashingFailure` if hashing fails or the round trip does not hold.
    pub fn self_test(&self) -> Result<SelfTestReport, AuthError> {
        let first = self.hash(SELF_TEST_PLAINTEXT)?;
        let second = self.hash(SELF_TEST_PLAINTEXT)?;

        let report = SelfTestReport {
            verifies: self.verify(SELF_TEST_PLAINTEXT, &first)?
                && self.verify(SELF_TEST_PLAINTEXT, &second)?,
            rejects_wrong: !self.verify("not-the-self-test", &first)?,
            salted: first != second,
            sample: first,
        };

        if report.passed() {
            Ok(report)
        } else {
            Err(AuthError::HashingFailure(format!(
                "self-test failed: verifies={}, rejects_wrong={}, salted={}",
                report.verifies, report.rejects_wrong, report.salted
            )))
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

#[derive(Debug, Clone)]
pub struct SelfTestReport {
    pub verifies: bool,
    pub rejects_wrong: bool,
    pub salted: bool,
    pub sample: String,
}

impl SelfTestReport {
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.verifies && self.rejects_wrong && self.salted
    }
}
