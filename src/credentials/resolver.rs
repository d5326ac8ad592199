//! The `authorize` callback behind the identity provider.
//!
//! Lookup → credential presence → password verification. The boundary entry
//! point, [`AuthorizationResolver::authorize`], never tells an unknown email,
//! a password-less account and a wrong password apart. The trusted
//! [`AuthorizationResolver::authenticate`] does, for operator tooling.

use super::{
    error::{AuthError, Denial},
    hasher::PasswordHasher,
    identity::IdentityProjection,
    store::SharedStore,
};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

const DECOY_PLAINTEXT: &str = "vouch-decoy-credential";

pub struct AuthorizationResolver {
    store: SharedStore,
    hasher: PasswordHasher,
    // Verified against on failure paths that have no real hash, so timing
    // does not reveal whether the email exists.
    decoy: OnceCell<Option<String>>,
}

impl AuthorizationResolver {
    #[must_use]
    pub fn new(store: SharedStore, hasher: PasswordHasher) -> Self {
        Self {
            store,
            hasher,
            decoy: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Compute the decoy hash now instead of on the first failed login.
    pub async fn warm_up(&self) {
        if self.decoy().await.is_some() {
            debug!("decoy hash ready");
        }
    }

    /// Boundary entry point: all credential failures look the same.
    ///
    /// # Errors
    /// `Denial::InvalidCredentials` for any credential problem,
    /// `Denial::Unavailable` for operational failures (store unreachable or
    /// misconfigured, corrupt stored hash).
    #[instrument(skip(self, password), fields(client = %self.store.name()))]
    pub async fn authorize(
        &self,
        email: &str,
        password: SecretString,
    ) -> Result<IdentityProjection, Denial> {
        self.authenticate(email, password).await.map_err(|err| {
            let denial = Denial::from(&err);
            match &err {
                AuthError::NotFound
                | AuthError::NoCredentialSet
                | AuthError::InvalidCredentials => {
                    info!(reason = err.code(), "authorization denied");
                }
                AuthError::StoreUnavailable(_) => {
                    error!(reason = err.code(), error = %err, "authorization failed, store unavailable");
                }
                _ => {
                    error!(reason = err.code(), error = %err, "authorization failed");
                }
            }
            denial
        })
    }

    /// Trusted entry point: reports the precise failure kind.
    ///
    /// # Errors
    /// `NotFound`, `NoCredentialSet` or `InvalidCredentials` for credential
    /// failures, `StoreUnavailable`/`Store`/`HashingFailure` for operational ones.
    #[instrument(skip(self, password), fields(client = %self.store.name()))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: SecretString,
    ) -> Result<IdentityProjection, AuthError> {
        let Some(identity) = self.store.find_by_email(email).await? else {
            debug!("no identity for email");
            self.burn_decoy(password).await;
            return Err(AuthError::NotFound);
        };

        let Some(hash) = identity.password_hash.clone() else {
            debug!(identity = %identity.id, "identity has no password credential");
            self.burn_decoy(password).await;
            return Err(AuthError::NoCredentialSet);
        };

        if self.hasher.verify_blocking(password, hash).await? {
            debug!(identity = %identity.id, "password verified");
            Ok(identity.projection())
        } else {
            debug!(identity = %identity.id, "password mismatch");
            Err(AuthError::InvalidCredentials)
        }
    }

    async fn decoy(&self) -> Option<&String> {
        let hasher = self.hasher;
        self.decoy
            .get_or_init(|| async move {
                hasher
                    .hash_blocking(SecretString::from(DECOY_PLAINTEXT.to_string()))
                    .await
                    .map_err(|e| warn!("could not prepare decoy hash: {e}"))
                    .ok()
            })
            .await
            .as_ref()
    }

    async fn burn_decoy(&self, password: SecretString) {
        if let Some(decoy) = self.decoy().await {
            let _ = self.hasher.verify_blocking(password, decoy.clone()).await;
        }
    }
}

/// Convenience for wiring into axum extensions.
pub type SharedResolver = Arc<AuthorizationResolver>;
