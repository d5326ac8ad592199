//! Offline operator utilities.
//!
//! Nothing here is wired into the authorization path. The probe takes a hash
//! that an operator already holds (copied out of the database, say) and checks
//! it against a short list of well-known passwords, to answer "was this
//! account left on a default password?" without touching any live store.

use super::{error::AuthError, hasher::PasswordHasher};

/// Passwords commonly left behind by fixtures and manual resets.
pub const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "Password1",
    "Password123!",
    "123456",
    "12345678",
    "qwerty",
    "letmein",
    "admin",
    "changeme",
    "Secret123!",
    "test",
    "test1234",
];

/// Return the first candidate that verifies against `hash`.
///
/// # Errors
/// `HashingFailure` if `hash` is a corrupt Argon2 encoding.
pub fn probe_common_passwords<'a, I>(
    hasher: &PasswordHasher,
    hash: &str,
    candidates: I,
) -> Result<Option<&'a str>, AuthError>
where
    I: IntoIterator<Item = &'a str>,
{
    for candidate in candidates {
        if hasher.verify(candidate, hash)? {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}
