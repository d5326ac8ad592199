use clap::{Arg, ArgAction, Command};

pub const ARG_DSN: &str = "dsn";
pub const ARG_MEMORY: &str = "memory";

/// `--dsn` or `--memory` for the operator tools.
///
/// Not an exclusive group: `--memory` has to win over an exported
/// `VOUCH_DSN`, so the choice is resolved in dispatch.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("VOUCH_DSN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_MEMORY)
                .long("memory")
                .help("Run against a throwaway in-memory store, ignoring VOUCH_DSN")
                .action(ArgAction::SetTrue),
        )
}
