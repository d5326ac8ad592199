//! Cross-client drift detection.
//!
//! Two store handles that are supposed to reach the same database (one for
//! the login path, one for admin tooling, say) can quietly end up on
//! different ones through configuration. Then a password reset "works" and
//! login still fails. The auditor runs the same lookup through every handle
//! and compares what comes back.

use super::{error::AuthError, store::SharedStore};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{error, info, instrument, warn};

/// What one client saw for the audited email.
#[derive(Clone, PartialEq, Eq)]
pub enum Observation {
    Present { hash: Option<String> },
    Absent,
    Failed { error: String },
}

impl Observation {
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    #[must_use]
    pub const fn has_hash(&self) -> bool {
        matches!(self, Self::Present { hash: Some(_) })
    }

    #[must_use]
    pub fn hash(&self) -> Option<&str> {
        match self {
            Self::Present { hash } => hash.as_deref(),
            _ => None,
        }
    }

    fn agrees_with(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Present { hash: a }, Self::Present { hash: b }) => a == b,
            (Self::Absent, Self::Absent) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present { hash } => f
                .debug_struct("Present")
                .field("hash", &hash.as_deref().map(fingerprint))
                .finish(),
            Self::Absent => f.write_str("Absent"),
            Self::Failed { error } => f.debug_struct("Failed").field("error", error).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientObservation {
    pub client: String,
    pub target: String,
    pub observation: Observation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Consistent,
    ConsistencyMismatch { clients: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub email: String,
    pub observations: Vec<ClientObservation>,
    pub verdict: Verdict,
}

impl ConsistencyReport {
    fn evaluate(email: &str, observations: Vec<ClientObservation>) -> Self {
        let mut differing = Vec::new();

        if let Some((reference, rest)) = observations.split_first() {
            for other in rest {
                if !other.observation.agrees_with(&reference.observation) {
                    differing.push(other.client.clone());
                }
            }
            if !differing.is_empty() {
                differing.insert(0, reference.client.clone());
            }
        }

        let verdict = if differing.is_empty() {
            Verdict::Consistent
        } else {
            Verdict::ConsistencyMismatch { clients: differing }
        };

        Self {
            email: email.to_string(),
            observations,
            verdict,
        }
    }

    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        matches!(self.verdict, Verdict::Consistent)
    }

    /// Treat a mismatch as an error.
    ///
    /// # Errors
    /// `ConsistencyMismatch` with the differing client names.
    pub fn into_result(self) -> Result<Self, AuthError> {
        match &self.verdict {
            Verdict::Consistent => Ok(self),
            Verdict::ConsistencyMismatch { clients } => {
                Err(AuthError::ConsistencyMismatch(clients.clone()))
            }
        }
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "email: {}", self.email)?;
        for entry in &self.observations {
            let state = match &entry.observation {
                Observation::Present { hash: Some(hash) } => {
                    format!("present, hash {}", fingerprint(hash))
                }
                Observation::Present { hash: None } => "present, no hash".to_string(),
                Observation::Absent => "absent".to_string(),
                Observation::Failed { error } => format!("lookup failed: {error}"),
            };
            writeln!(f, "  {:<16} {:<40} {}", entry.client, entry.target, state)?;
        }
        match &self.verdict {
            Verdict::Consistent => write!(f, "verdict: consistent"),
            Verdict::ConsistencyMismatch { clients } => {
                write!(f, "verdict: MISMATCH between {}", clients.join(", "))
            }
        }
    }
}

/// SHA-256 prefix of the stored hash: enough to tell two hashes apart, none
/// of the hash itself.
fn fingerprint(hash: &str) -> String {
    let digest = Sha256::digest(hash.as_bytes());
    let prefix: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
    format!("sha256:{prefix}")
}

pub struct ConsistencyAuditor {
    clients: Vec<SharedStore>,
}

impl ConsistencyAuditor {
    /// An audit needs at least two clients to compare.
    #[must_use]
    pub fn new(first: SharedStore, second: SharedStore) -> Self {
        Self {
            clients: vec![first, second],
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: SharedStore) -> Self {
        self.clients.push(client);
        self
    }

    #[must_use]
    pub fn client_names(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.name().to_string()).collect()
    }

    #[instrument(skip(self))]
    pub async fn audit(&self, email: &str) -> ConsistencyReport {
        let mut observations = Vec::with_capacity(self.clients.len());

        for client in &self.clients {
            let observation = match client.find_by_email(email).await {
                Ok(Some(identity)) => Observation::Present {
                    hash: identity.password_hash,
                },
                Ok(None) => Observation::Absent,
                Err(e) => {
                    warn!(client = client.name(), error = %e, "audit lookup failed");
                    Observation::Failed {
                        error: e.to_string(),
                    }
                }
            };

            observations.push(ClientObservation {
                client: client.name().to_string(),
                target: client.target(),
                observation,
            });
        }

        let report = ConsistencyReport::evaluate(email, observations);

        match &report.verdict {
            Verdict::Consistent => info!("store clients agree"),
            Verdict::ConsistencyMismatch { clients } => error!(
                alert = true,
                clients = %clients.join(","),
                "store clients disagree"
            ),
        }

        report
    }
}
