use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

/// Account role. Returned to callers as an attribute only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Fan,
    Creator,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fan => "FAN",
            Self::Creator => "CREATOR",
            Self::Admin => "ADMIN",
        }
    }

    /// Parse the persisted `identities.role` value.
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        value.parse().map_err(|e: String| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e,
            )))
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "FAN" => Ok(Self::Fan),
            "CREATOR" => Ok(Self::Creator),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(format!("invalid role: {value}")),
        }
    }
}

/// A stored account record keyed by email.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    pub role: Role,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    #[must_use]
    pub const fn has_credential(&self) -> bool {
        self.password_hash.is_some()
    }

    #[must_use]
    pub fn projection(&self) -> IdentityProjection {
        IdentityProjection {
            id: self.id,
            email: self.email.clone(),
            name: self.display_name.clone(),
            image: self.avatar_ref.clone(),
            role: self.role,
        }
    }
}

// Hand-written so the hash never ends up in a log line.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("email", &self.email)
            .field(
                "password_hash",
                &self.password_hash.as_ref().map(|_| "[REDACTED]"),
            )
            .field("display_name", &self.display_name)
            .field("avatar_ref", &self.avatar_ref)
            .field("role", &self.role)
            .field("email_verified_at", &self.email_verified_at)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl<'r> FromRow<'r, PgRow> for Identity {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            display_name: row.try_get("display_name")?,
            avatar_ref: row.try_get("avatar_ref")?,
            role: Role::from_db(&role)?,
            email_verified_at: row.try_get("email_verified_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// What a successful authentication hands back. Never carries the hash.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IdentityProjection {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub role: Role,
}

/// Descriptive fields supplied at provisioning time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityFields {
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    pub role: Role,
    pub email_verified_at: Option<DateTime<Utc>>,
}

impl IdentityFields {
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    #[must_use]
    pub fn with_avatar_ref(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }

    #[must_use]
    pub const fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub const fn verified_at(mut self, at: DateTime<Utc>) -> Self {
        self.email_verified_at = Some(at);
        self
    }
}

/// Input to `CredentialStore::create`.
#[derive(Clone, PartialEq, Eq)]
pub struct NewIdentity {
    pub email: String,
    pub password_hash: Option<String>,
    pub fields: IdentityFields,
}

impl NewIdentity {
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: None,
            fields: IdentityFields::default(),
        }
    }

    #[must_use]
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: IdentityFields) -> Self {
        self.fields = fields;
        self
    }
}

impl fmt::Debug for NewIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewIdentity")
            .field("email", &self.email)
            .field(
                "password_hash",
                &self.password_hash.as_ref().map(|_| "[REDACTED]"),
            )
            .field("fields", &self.fields)
            .finish()
    }
}

/// Partial update. `None` leaves a column untouched; `Some(None)` clears a
/// nullable column.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct IdentityPatch {
    pub password_hash: Option<Option<String>>,
    pub display_name: Option<Option<String>>,
    pub avatar_ref: Option<Option<String>>,
    pub role: Option<Role>,
    pub email_verified_at: Option<Option<DateTime<Utc>>>,
}

impl IdentityPatch {
    #[must_use]
    pub fn password_hash(hash: impl Into<String>) -> Self {
        Self {
            password_hash: Some(Some(hash.into())),
            ..Self::default()
        }
    }

    /// Apply the patch in place. `updated_at` is the caller's business.
    pub fn apply(&self, identity: &mut Identity) {
        if let Some(hash) = &self.password_hash {
            identity.password_hash.clone_from(hash);
        }
        if let Some(display_name) = &self.display_name {
            identity.display_name.clone_from(display_name);
        }
        if let Some(avatar_ref) = &self.avatar_ref {
            identity.avatar_ref.clone_from(avatar_ref);
        }
        if let Some(role) = self.role {
            identity.role = role;
        }
        if let Some(verified) = self.email_verified_at {
            identity.email_verified_at = verified;
        }
    }
}

impl fmt::Debug for IdentityPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityPatch")
            .field(
                "password_hash",
                &self.password_hash.as_ref().map(|h| h.as_ref().map(|_| "[REDACTED]")),
            )
            .field("display_name", &self.display_name)
            .field("avatar_ref", &self.avatar_ref)
            .field("role", &self.role)
            .field("email_verified_at", &self.email_verified_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Identity {
        let now = Utc::now();
        Identity {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            password_hash: Some("$argon2id$v=19$m=64,t=1,p=1$c2FsdHNhbHQ$aGFzaA".to_string()),
            display_name: Some("Alice".to_string()),
            avatar_ref: None,
            role: Role::Creator,
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::Fan, Role::Creator, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert!("OWNER".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Fan);
    }

    #[test]
    fn role_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&Role::Creator).ok(),
            Some("\"CREATOR\"".to_string())
        );
    }

    #[test]
    fn debug_redacts_hash() {
        let identity = sample();
        let rendered = format!("{identity:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("argon2id"));
    }

    #[test]
    fn projection_omits_hash() {
        let identity = sample();
        let projection = identity.projection();
        assert_eq!(projection.id, identity.id);
        assert_eq!(projection.name.as_deref(), Some("Alice"));
        assert_eq!(projection.role, Role::Creator);

        let json = serde_json::to_value(&projection).unwrap_or_default();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "CREATOR");
    }

    #[test]
    fn patch_touches_only_named_fields() {
        let mut identity = sample();
        let before = identity.clone();

        IdentityPatch::password_hash("$argon2id$new").apply(&mut identity);

        assert_eq!(identity.password_hash.as_deref(), Some("$argon2id$new"));
        assert_eq!(identity.display_name, before.display_name);
        assert_eq!(identity.role, before.role);
        assert_eq!(identity.email, before.email);
    }

    #[test]
    fn patch_can_clear_nullable_fields() {
        let mut identity = sample();
        let patch = IdentityPatch {
            password_hash: Some(None),
            display_name: Some(None),
            ..IdentityPatch::default()
        };
        patch.apply(&mut identity);
        assert!(!identity.has_credential());
        assert!(identity.display_name.is_none());
    }
}
