use crate::cli::actions::{server, tools, Action};
use anyhow::Result;

/// Execute the provided action.
// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::Users(args) => tools::users(args).await,
        Action::SelfTest(args) => tools::selftest(&args),
        Action::Provision(args) => tools::provision(args).await,
        Action::Rotate(args) => tools::rotate(args).await,
        Action::Verify(args) => tools::verify(args).await,
        Action::Audit(args) => tools::audit(args).await,
        Action::Probe(args) => tools::probe(&args),
    }
}
