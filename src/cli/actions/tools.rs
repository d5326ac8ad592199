//! Operator tooling. Every command goes through the same public contract the
//! server uses; nothing here reaches around the credential modules.

use crate::{
    cli::globals::GlobalArgs,
    credentials::{
        diagnostics::{probe_common_passwords, COMMON_PASSWORDS},
        reset::require_password,
        store::{MemoryBackend, PgCredentialStore, PoolSettings},
        AuthorizationResolver, ConsistencyAuditor, CredentialResetService, Identity,
        IdentityFields, SharedStore,
    },
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::{fmt::Write as _, sync::Arc};
use tracing::{debug, info};
use uuid::Uuid;

/// Where a tool reads and writes identities.
#[derive(Debug)]
pub enum StoreTarget {
    /// Throwaway store, gone when the command exits.
    Memory,
    Dsn(SecretString),
}

impl StoreTarget {
    /// Open a handle and make sure it answers before doing any work.
    ///
    /// # Errors
    /// Returns an error if the DSN is invalid or the store is unreachable.
    pub async fn open(&self, name: &str) -> Result<SharedStore> {
        let store: SharedStore = match self {
            Self::Memory => Arc::new(MemoryBackend::new("dry-run").connect(name)),
            Self::Dsn(dsn) => Arc::new(
                PgCredentialStore::connect_lazy(name, dsn, PoolSettings::default())
                    .with_context(|| format!("failed to configure store client {name}"))?,
            ),
        };

        store
            .ping()
            .await
            .with_context(|| format!("store client {name} ({}) is unreachable", store.target()))?;

        debug!(client = name, target = %store.target(), "store client ready");

        Ok(store)
    }
}

#[derive(Debug)]
pub struct UsersArgs {
    pub store: StoreTarget,
}

#[derive(Debug)]
pub struct SelfTestArgs {
    pub globals: GlobalArgs,
}

#[derive(Debug)]
pub struct ProvisionArgs {
    pub globals: GlobalArgs,
    pub store: StoreTarget,
    pub email: String,
    pub password: SecretString,
    pub fields: IdentityFields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityRef {
    Email(String),
    Id(Uuid),
}

#[derive(Debug)]
pub struct RotateArgs {
    pub globals: GlobalArgs,
    pub store: StoreTarget,
    pub identity: IdentityRef,
    pub password: SecretString,
}

#[derive(Debug)]
pub struct VerifyArgs {
    pub globals: GlobalArgs,
    pub store: StoreTarget,
    pub email: String,
    pub password: SecretString,
}

#[derive(Debug)]
pub struct AuditArgs {
    pub clients: Vec<(String, SecretString)>,
    pub email: String,
}

#[derive(Debug)]
pub struct ProbeArgs {
    pub globals: GlobalArgs,
    pub hash: String,
    pub candidates: Vec<String>,
}

/// One line per identity; the hash itself is never printed.
#[must_use]
pub fn render_identities(identities: &[Identity]) -> String {
    let mut out = String::new();
    for identity in identities {
        let _ = writeln!(
            out,
            "{}  {:<32} {:<8} password={:<3} verified={:<3} created={}",
            identity.id,
            identity.email,
            identity.role,
            if identity.has_credential() { "yes" } else { "no" },
            if identity.email_verified_at.is_some() { "yes" } else { "no" },
            identity.created_at.to_rfc3339(),
        );
    }
    let _ = write!(out, "{} identities", identities.len());
    out
}

/// # Errors
/// Returns an error if the store cannot be reached or read.
pub async fn users(args: UsersArgs) -> Result<()> {
    let store = args.store.open("admin").await?;
    let identities = store.list().await.context("failed to list identities")?;
    println!("{}", render_identities(&identities));
    Ok(())
}

/// # Errors
/// Returns an error if the hash/verify round trip does not hold.
pub fn selftest(args: &SelfTestArgs) -> Result<()> {
    let hasher = args.globals.hasher();
    let report = hasher.self_test().context("password hasher self-test failed")?;

    println!(
        "hasher ok: argon2id t={} m={}KiB verifies={} rejects_wrong={} salted={}",
        hasher.cost(),
        hasher.memory_kib(),
        report.verifies,
        report.rejects_wrong,
        report.salted
    );
    println!("sample: {}", report.sample);

    Ok(())
}

/// # Errors
/// Returns an error if the password is empty or provisioning fails.
pub async fn provision(args: ProvisionArgs) -> Result<()> {
    require_password(&args.password).map_err(|_| anyhow!("password must not be empty"))?;

    let store = args.store.open("admin").await?;
    let service = CredentialResetService::new(store.clone(), args.globals.hasher());

    let identity = service
        .provision(&args.email, args.password.clone(), args.fields)
        .await
        .with_context(|| format!("failed to provision {}", args.email))?;

    // Prove the new credential works through the same path a login takes.
    AuthorizationResolver::new(store, args.globals.hasher())
        .authenticate(&args.email, args.password)
        .await
        .with_context(|| format!("provisioned {} but it does not authenticate", args.email))?;

    info!(identity = %identity.id, "provisioned");
    println!("{}", render_identities(std::slice::from_ref(&identity)));

    Ok(())
}

/// # Errors
/// Returns an error if the identity is unknown or the write does not verify.
pub async fn rotate(args: RotateArgs) -> Result<()> {
    require_password(&args.password).map_err(|_| anyhow!("password must not be empty"))?;

    let store = args.store.open("admin").await?;
    let service = CredentialResetService::new(store, args.globals.hasher());

    let identity = match &args.identity {
        IdentityRef::Email(email) => service
            .rotate_by_email(email, args.password)
            .await
            .with_context(|| format!("failed to rotate password for {email}"))?,
        IdentityRef::Id(id) => service
            .rotate(*id, args.password)
            .await
            .with_context(|| format!("failed to rotate password for {id}"))?,
    };

    println!("password rotated and verified for {} ({})", identity.email, identity.id);

    Ok(())
}

/// # Errors
/// Returns an error carrying the precise failure code when authentication fails.
pub async fn verify(args: VerifyArgs) -> Result<()> {
    let store = args.store.open("auth").await?;
    let resolver = AuthorizationResolver::new(store, args.globals.hasher());

    match resolver.authenticate(&args.email, args.password).await {
        Ok(projection) => {
            println!(
                "ok: {} ({}) role={}",
                projection.email, projection.id, projection.role
            );
            Ok(())
        }
        Err(e) => Err(anyhow!("{}: {e}", e.code())),
    }
}

/// # Errors
/// Returns an error if fewer than two clients are given, a client cannot be
/// configured, or the clients disagree.
pub async fn audit(args: AuditArgs) -> Result<()> {
    let mut clients = args
        .clients
        .iter()
        .map(|(name, dsn)| -> Result<SharedStore> {
            let store = PgCredentialStore::connect_lazy(name.as_str(), dsn, PoolSettings::default())
                .with_context(|| format!("failed to configure store client {name}"))?;
            Ok(Arc::new(store))
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter();

    let (Some(first), Some(second)) = (clients.next(), clients.next()) else {
        return Err(anyhow!("audit needs at least two --client entries"));
    };

    let auditor = clients.fold(ConsistencyAuditor::new(first, second), ConsistencyAuditor::with_client);

    let report = auditor.audit(&args.email).await;
    println!("{report}");

    report.into_result()?;

    Ok(())
}

/// # Errors
/// Returns an error if the hash is a corrupt Argon2 encoding or a candidate matches.
pub fn probe(args: &ProbeArgs) -> Result<()> {
    let hasher = args.globals.hasher();

    let found = if args.candidates.is_empty() {
        probe_common_passwords(&hasher, &args.hash, COMMON_PASSWORDS.iter().copied())
    } else {
        probe_common_passwords(&hasher, &args.hash, args.candidates.iter().map(String::as_str))
    }
    .context("could not check hash")?;

    match found {
        Some(candidate) => Err(anyhow!("hash matches common password {candidate:?}")),
        None => {
            println!("no common password matches");
            Ok(())
        }
    }
}
