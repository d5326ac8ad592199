//! Process-local identity storage.
//!
//! A [`MemoryBackend`] is the physical store; any number of
//! [`MemoryCredentialStore`] handles can be connected to it. Handles connected
//! to different backends see different data, which is exactly the drift the
//! consistency auditor is meant to catch.

use super::CredentialStore;
use crate::credentials::{
    error::AuthError,
    identity::{Identity, IdentityPatch, NewIdentity},
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Rows {
    by_id: HashMap<Uuid, Identity>,
    // email -> id, the uniqueness index
    by_email: HashMap<String, Uuid>,
}

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    label: String,
    rows: Arc<RwLock<Rows>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            rows: Arc::new(RwLock::new(Rows::default())),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Open a new named client handle on this backend.
    #[must_use]
    pub fn connect(&self, name: impl Into<String>) -> MemoryCredentialStore {
        MemoryCredentialStore {
            name: name.into(),
            backend: self.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryCredentialStore {
    name: String,
    backend: MemoryBackend,
}

impl MemoryCredentialStore {
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Rows>, AuthError> {
        self.backend
            .rows
            .read()
            .map_err(|_| AuthError::StoreUnavailable("memory backend lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Rows>, AuthError> {
        self.backend
            .rows
            .write()
            .map_err(|_| AuthError::StoreUnavailable("memory backend lock poisoned".to_string()))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> String {
        format!("memory://{}", self.backend.label)
    }

    async fn ping(&self) -> Result<(), AuthError> {
        self.read().map(|_| ())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        let rows = self.read()?;
        Ok(rows
            .by_email
            .get(email)
            .and_then(|id| rows.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AuthError> {
        Ok(self.read()?.by_id.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Identity>, AuthError> {
        let mut identities: Vec<Identity> = self.read()?.by_id.values().cloned().collect();
        identities.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.email.cmp(&b.email)));
        Ok(identities)
    }

    #[instrument(skip(self, identity), fields(client = %self.name, email = %identity.email))]
    async fn create(&self, identity: NewIdentity) -> Result<Identity, AuthError> {
        let mut rows = self.write()?;

        if rows.by_email.contains_key(&identity.email) {
            debug!("email already taken");
            return Err(AuthError::DuplicateEmail(identity.email));
        }

        let now = Utc::now();
        let created = Identity {
            id: Uuid::new_v4(),
            email: identity.email,
            password_hash: identity.password_hash,
            display_name: identity.fields.display_name,
            avatar_ref: identity.fields.avatar_ref,
            role: identity.fields.role,
            email_verified_at: identity.fields.email_verified_at,
            created_at: now,
            updated_at: now,
        };

        rows.by_email.insert(created.email.clone(), created.id);
        rows.by_id.insert(created.id, created.clone());

        Ok(created)
    }

    #[instrument(skip(self, patch), fields(client = %self.name))]
    async fn update(&self, id: Uuid, patch: IdentityPatch) -> Result<Identity, AuthError> {
        let mut rows = self.write()?;
        let identity = rows.by_id.get_mut(&id).ok_or(AuthError::NotFound)?;

        patch.apply(identity);
        identity.updated_at = Utc::now().max(identity.created_at);

        Ok(identity.clone())
    }

    #[instrument(skip(self), fields(client = %self.name))]
    async fn delete(&self, id: Uuid) -> Result<(), AuthError> {
        let mut rows = self.write()?;
        let removed = rows.by_id.remove(&id).ok_or(AuthError::NotFound)?;
        rows.by_email.remove(&removed.email);
        Ok(())
    }
}
