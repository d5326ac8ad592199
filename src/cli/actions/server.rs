use crate::{
    cli::globals::GlobalArgs,
    credentials::store::{PgCredentialStore, PoolSettings},
    vouch,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub startup_grace: Duration,
    pub globals: GlobalArgs,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the DSN is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store = PgCredentialStore::connect_lazy("auth", &args.dsn, PoolSettings::default())
        .context("failed to configure credential store")?;

    vouch::new(args.port, store, args.globals.hasher(), args.startup_grace).await
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        dsn = %crate::credentials::store::postgres::redact_dsn(args.dsn.expose_secret()),
        startup_grace_seconds = args.startup_grace.as_secs(),
        hash_cost = args.globals.hash_cost,
        hash_memory_kib = args.globals.hash_memory_kib,
        "Starting {} {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        crate::GIT_COMMIT_HASH
    );
}
