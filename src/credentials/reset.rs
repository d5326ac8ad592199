use super::{
    error::AuthError,
    hasher::PasswordHasher,
    identity::{Identity, IdentityFields, IdentityPatch, NewIdentity},
    store::SharedStore,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Provisions and rotates password credentials.
pub struct CredentialResetService {
    store: SharedStore,
    hasher: PasswordHasher,
}

impl CredentialResetService {
    #[must_use]
    pub fn new(store: SharedStore, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    /// Reset `email` to a known state: any existing identity is removed
    /// outright, then a fresh one is created with a new hash.
    ///
    /// # Errors
    /// `StoreUnavailable` if storage cannot be reached, `HashingFailure` if
    /// the password cannot be hashed, `DuplicateEmail` if a concurrent
    /// provision won the race.
    #[instrument(skip(self, password, attributes), fields(client = %self.store.name()))]
    pub async fn provision(
        &self,
        email: &str,
        password: SecretString,
        attributes: IdentityFields,
    ) -> Result<Identity, AuthError> {
        // Hash first so a hashing failure does not leave the email deleted.
        let hash = self.hasher.hash_blocking(password).await?;

        if let Some(existing) = self.store.find_by_email(email).await? {
            match self.store.delete(existing.id).await {
                // Someone else removed it between the lookup and the delete.
                Ok(()) | Err(AuthError::NotFound) => {
                    info!(identity = %existing.id, "removed existing identity before provisioning");
                }
                Err(e) => return Err(e),
            }
        }

        let created = self
            .store
            .create(
                NewIdentity::new(email)
                    .with_password_hash(hash)
                    .with_fields(attributes),
            )
            .await?;

        info!(identity = %created.id, role = %created.role, "identity provisioned");

        Ok(created)
    }

    /// Replace the password of an existing identity and prove the write by
    /// reading it back.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `VerificationMismatch` if the stored
    /// hash does not verify the new password after the write.
    #[instrument(skip(self, password), fields(client = %self.store.name()))]
    pub async fn rotate(&self, identity_id: Uuid, password: SecretString) -> Result<Identity, AuthError> {
        let hash = self.hasher.hash_blocking(password.clone()).await?;

        self.store
            .update(identity_id, IdentityPatch::password_hash(hash))
            .await?;

        let stored = self
            .store
            .find_by_id(identity_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        // A stored value that no longer decodes is the same storage bug as
        // one that decodes to the wrong thing.
        let verified = match stored.password_hash.clone() {
            Some(hash) => self
                .hasher
                .verify_blocking(password, hash)
                .await
                .unwrap_or_else(|e| {
                    error!(identity = %identity_id, error = %e, "stored hash failed to decode");
                    false
                }),
            None => false,
        };

        if !verified {
            error!(
                alert = true,
                identity = %identity_id,
                email = %stored.email,
                "stored hash does not verify the password just written"
            );
            return Err(AuthError::VerificationMismatch(identity_id));
        }

        info!(identity = %identity_id, "password rotated");

        Ok(stored)
    }

    /// Rotate by email, for tooling that only knows the address.
    ///
    /// # Errors
    /// Same as [`rotate`](Self::rotate).
    pub async fn rotate_by_email(
        &self,
        email: &str,
        password: SecretString,
    ) -> Result<Identity, AuthError> {
        let identity = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::NotFound)?;
        self.rotate(identity.id, password).await
    }
}

/// Reject obviously empty passwords before they reach the hasher.
///
/// # Errors
/// `InvalidCredentials` for empty or whitespace-only input.
pub fn require_password(password: &SecretString) -> Result<(), AuthError> {
    if password.expose_secret().trim().is_empty() {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(())
}
