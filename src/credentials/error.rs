use thiserror::Error;
use uuid::Uuid;

/// Failure kinds of the credential subsystem.
///
/// These carry enough context for operators. Callers on the public
/// authorization boundary must go through [`Denial`] instead, which collapses
/// every credential failure into one indistinguishable answer.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity not found")]
    NotFound,
    #[error("an identity with email {0} already exists")]
    DuplicateEmail(String),
    #[error("identity has no password credential")]
    NoCredentialSet,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    HashingFailure(String),
    #[error("stored hash for identity {0} does not verify against the password just written")]
    VerificationMismatch(Uuid),
    #[error("store clients disagree: {}", .0.join(", "))]
    ConsistencyMismatch(Vec<String>),
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("credential store error: {0}")]
    Store(String),
}

impl AuthError {
    /// Stable machine-readable code, used in logs and diagnostics output.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::DuplicateEmail(_) => "duplicate_email",
            Self::NoCredentialSet => "no_credential_set",
            Self::InvalidCredentials => "invalid_credentials",
            Self::HashingFailure(_) => "hashing_failure",
            Self::VerificationMismatch(_) => "verification_mismatch",
            Self::ConsistencyMismatch(_) => "consistency_mismatch",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Store(_) => "store_error",
        }
    }

    /// Critical kinds point at systemic misconfiguration rather than user input.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::VerificationMismatch(_) | Self::ConsistencyMismatch(_)
        )
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        let unreachable = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => true,
            sqlx::Error::Database(db_err) => db_err
                .code()
                .is_some_and(|code| refuses_connection(code.as_ref())),
            _ => false,
        };

        if unreachable {
            Self::StoreUnavailable(err.to_string())
        } else {
            Self::Store(err.to_string())
        }
    }
}

/// SQLSTATEs raised while the server refuses the session itself: connection
/// exceptions (08), bad login (28), unknown database (3D) and operator
/// intervention such as shutdown (57P).
fn refuses_connection(code: &str) -> bool {
    ["08", "28", "3D", "57P"]
        .iter()
        .any(|class| code.starts_with(class))
}

/// SQLSTATE 23505.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// What the authorization boundary is allowed to reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authentication temporarily unavailable")]
    Unavailable,
}

impl Denial {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unavailable => "unavailable",
        }
    }
}

impl From<&AuthError> for Denial {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::NotFound | AuthError::NoCredentialSet | AuthError::InvalidCredentials => {
                Self::InvalidCredentials
            }
            _ => Self::Unavailable,
        }
    }
}
