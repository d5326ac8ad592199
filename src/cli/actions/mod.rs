pub mod server;
pub mod tools;

// Internal "interpreter" for `Action`.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    Users(tools::UsersArgs),
    SelfTest(tools::SelfTestArgs),
    Provision(tools::ProvisionArgs),
    Rotate(tools::RotateArgs),
    Verify(tools::VerifyArgs),
    Audit(tools::AuditArgs),
    Probe(tools::ProbeArgs),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
