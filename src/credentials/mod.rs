//! Credential authentication and verification.
//!
//! Every component takes its store handles explicitly. There is no global
//! client: the auditor relies on holding several independently configured
//! handles side by side.

pub mod audit;
pub mod diagnostics;
pub mod error;
pub mod hasher;
pub mod identity;
pub mod reset;
pub mod resolver;
pub mod store;

pub use audit::{ConsistencyAuditor, ConsistencyReport, Verdict};
pub use error::{AuthError, Denial};
pub use hasher::PasswordHasher;
pub use identity::{Identity, IdentityFields, IdentityPatch, IdentityProjection, NewIdentity, Role};
pub use reset::CredentialResetService;
pub use resolver::AuthorizationResolver;
pub use store::{CredentialStore, SharedStore};
