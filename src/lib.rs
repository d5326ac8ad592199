//! # Vouch (credential authentication and verification)
//!
//! `vouch` turns an email/password pair into an authenticated identity. It owns
//! the password hashing discipline for stored credentials and ships a
//! cross-client consistency check for the case where two independently
//! configured store handles quietly point at different databases.
//!
//! ## Enumeration safety
//!
//! The HTTP `authorize` callback answers an unknown email, an account without a
//! password and a wrong password with the same `401 invalid_credentials`. The
//! precise reason is only available through the trusted
//! [`credentials::AuthorizationResolver::authenticate`] entry point used by the
//! `verify` tool.
//!
//! ## Operator tooling
//!
//! The binary doubles as the operator toolbox: `users`, `selftest`,
//! `provision`, `rotate`, `verify`, `audit` and the offline `probe`.

pub mod cli;
pub mod credentials;
pub mod vouch;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
