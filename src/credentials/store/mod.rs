//! Persisted identity records behind named client handles.
//!
//! Several handles may point at the same physical store (an authentication
//! pool and an admin pool, say). None of them cache: every read goes to the
//! backing storage, so a write through one handle is visible through all.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryBackend, MemoryCredentialStore};
pub use postgres::{PgCredentialStore, PoolSettings};

use super::{
    error::AuthError,
    identity::{Identity, IdentityPatch, NewIdentity},
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Client identifier used in logs and consistency reports.
    fn name(&self) -> &str;

    /// Where this handle points, with credentials stripped.
    fn target(&self) -> String;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), AuthError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AuthError>;

    /// All identities ordered by creation time.
    async fn list(&self) -> Result<Vec<Identity>, AuthError>;

    /// # Errors
    /// `DuplicateEmail` if the email is already taken.
    async fn create(&self, identity: NewIdentity) -> Result<Identity, AuthError>;

    /// Apply `patch` and refresh `updated_at`.
    ///
    /// # Errors
    /// `NotFound` if `id` does not exist.
    async fn update(&self, id: Uuid, patch: IdentityPatch) -> Result<Identity, AuthError>;

    /// Remove the row entirely.
    ///
    /// # Errors
    /// `NotFound` if `id` does not exist.
    async fn delete(&self, id: Uuid) -> Result<(), AuthError>;
}

pub type SharedStore = Arc<dyn CredentialStore>;
