//! PostgreSQL identity store (`identities` table, see `db/sql`).

use super::CredentialStore;
use crate::credentials::{
    error::{is_unique_violation, AuthError},
    identity::{Identity, IdentityPatch, NewIdentity},
};
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgPoolOptions, Connection, PgPool, Postgres, QueryBuilder};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, info_span, instrument, warn, Instrument};
use url::Url;
use uuid::Uuid;

const COLUMNS: &str = "id, email, password_hash, display_name, avatar_ref, role::text AS role, \
                       email_verified_at, created_at, updated_at";

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            max_lifetime: Duration::from_secs(60 * 2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    name: String,
    target: String,
    pool: PgPool,
}

impl PgCredentialStore {
    /// Build a handle without touching the network. The first query (or
    /// [`wait_until_ready`](Self::wait_until_ready)) opens connections.
    ///
    /// # Errors
    /// Returns `Store` if the DSN cannot be parsed.
    pub fn connect_lazy(
        name: impl Into<String>,
        dsn: &SecretString,
        settings: PoolSettings,
    ) -> Result<Self, AuthError> {
        let name = name.into();
        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .max_lifetime(settings.max_lifetime)
            .test_before_acquire(true)
            .connect_lazy(dsn.expose_secret())
            .map_err(|e| AuthError::Store(format!("invalid DSN for client {name}: {e}")))?;

        Ok(Self {
            target: redact_dsn(dsn.expose_secret()),
            name,
            pool,
        })
    }

    #[must_use]
    pub fn from_pool(name: impl Into<String>, target: impl Into<String>, pool: PgPool) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            pool,
        }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Retry [`CredentialStore::ping`] with jittered exponential backoff.
    ///
    /// Failures inside `grace` are expected while the database comes up and
    /// only log at `warn`; the first failure past it logs at `error` and is
    /// returned.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` once the grace window is exhausted.
    #[instrument(skip(self), fields(client = %self.name, target = %self.target))]
    pub async fn wait_until_ready(&self, grace: Duration) -> Result<(), AuthError> {
        let started = Instant::now();
        let mut rng = StdRng::from_entropy();

        for attempt in 1u32.. {
            match self.ping().await {
                Ok(()) => {
                    info!(attempt, "credential store reachable");
                    return Ok(());
                }

                Err(e) => {
                    let elapsed = started.elapsed();
                    if elapsed >= grace {
                        error!(attempt, error = %e, "credential store unreachable after grace window");
                        return Err(e);
                    }

                    let backoff = 2u64.pow(attempt.min(4) - 1) as f64 * rng.gen_range(0.8..1.2);
                    let backoff = Duration::from_secs_f64(backoff).min(grace - elapsed);

                    warn!(attempt, error = %e, "credential store not reachable yet, retrying in {:?}", backoff);

                    sleep(backoff).await;
                }
            }
        }

        Err(AuthError::StoreUnavailable("retry budget exhausted".to_string()))
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> String {
        self.target.clone()
    }

    async fn ping(&self) -> Result<(), AuthError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .map_err(|e| AuthError::StoreUnavailable(e.to_string()))?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .map_err(|e| AuthError::StoreUnavailable(e.to_string()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        let query = format!("SELECT {COLUMNS} FROM identities WHERE email = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str(),
            client = %self.name
        );
        sqlx::query_as::<_, Identity>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(AuthError::from)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AuthError> {
        let query = format!("SELECT {COLUMNS} FROM identities WHERE id = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str(),
            client = %self.name
        );
        sqlx::query_as::<_, Identity>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(AuthError::from)
    }

    async fn list(&self) -> Result<Vec<Identity>, AuthError> {
        let query = format!("SELECT {COLUMNS} FROM identities ORDER BY created_at, email");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str(),
            client = %self.name
        );
        sqlx::query_as::<_, Identity>(&query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .map_err(AuthError::from)
    }

    async fn create(&self, identity: NewIdentity) -> Result<Identity, AuthError> {
        let query = format!(
            r"
            INSERT INTO identities
                (id, email, password_hash, display_name, avatar_ref, role, email_verified_at)
            VALUES ($1, $2, $3, $4, $5, $6::identity_role, $7)
            RETURNING {COLUMNS}
            "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str(),
            client = %self.name
        );
        let result = sqlx::query_as::<_, Identity>(&query)
            .bind(Uuid::new_v4())
            .bind(&identity.email)
            .bind(&identity.password_hash)
            .bind(&identity.fields.display_name)
            .bind(&identity.fields.avatar_ref)
            .bind(identity.fields.role.as_str())
            .bind(identity.fields.email_verified_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(created) => Ok(created),
            Err(err) if is_unique_violation(&err) => Err(AuthError::DuplicateEmail(identity.email)),
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, id: Uuid, patch: IdentityPatch) -> Result<Identity, AuthError> {
        // updated_at never drops below created_at, whatever the server clock does.
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("UPDATE identities SET updated_at = GREATEST(NOW(), created_at)");

        if let Some(hash) = patch.password_hash {
            builder.push(", password_hash = ").push_bind(hash);
        }
        if let Some(display_name) = patch.display_name {
            builder.push(", display_name = ").push_bind(display_name);
        }
        if let Some(avatar_ref) = patch.avatar_ref {
            builder.push(", avatar_ref = ").push_bind(avatar_ref);
        }
        if let Some(role) = patch.role {
            builder
                .push(", role = ")
                .push_bind(role.as_str())
                .push("::identity_role");
        }
        if let Some(verified) = patch.email_verified_at {
            builder.push(", email_verified_at = ").push_bind(verified);
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(COLUMNS);

        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = builder.sql(),
            client = %self.name
        );
        builder
            .build_query_as::<Identity>()
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?
            .ok_or(AuthError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), AuthError> {
        let query = "DELETE FROM identities WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query,
            client = %self.name
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound);
        }

        Ok(())
    }
}

/// Render a DSN for logs and reports with the password removed.
#[must_use]
pub fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(None);
            }
            url.to_string()
        }
        Err(_) => "<unparseable dsn>".to_string(),
    }
}
