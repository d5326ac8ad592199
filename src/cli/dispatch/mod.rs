use crate::{
    cli::{
        actions::{
            server,
            tools::{
                AuditArgs, IdentityRef, ProbeArgs, ProvisionArgs, RotateArgs, SelfTestArgs,
                StoreTarget, UsersArgs, VerifyArgs,
            },
            Action,
        },
        commands::{hashing, store},
        globals::GlobalArgs,
    },
    credentials::{IdentityFields, Role},
};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::parser::ValueSource;
use secrecy::SecretString;
use std::time::Duration;
use uuid::Uuid;

fn globals(matches: &clap::ArgMatches) -> GlobalArgs {
    let defaults = GlobalArgs::default();
    GlobalArgs::new(
        matches
            .get_one::<u32>(hashing::ARG_HASH_COST)
            .copied()
            .unwrap_or(defaults.hash_cost),
        matches
            .get_one::<u32>(hashing::ARG_HASH_MEMORY_KIB)
            .copied()
            .unwrap_or(defaults.hash_memory_kib),
    )
}

fn required(matches: &clap::ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing required argument: --{name}"))
}

fn secret(matches: &clap::ArgMatches, name: &str) -> Result<SecretString> {
    required(matches, name).map(SecretString::from)
}

fn store_target(matches: &clap::ArgMatches) -> Result<StoreTarget> {
    let dsn_on_command_line =
        matches.value_source(store::ARG_DSN) == Some(ValueSource::CommandLine);

    match (matches.get_flag(store::ARG_MEMORY), dsn_on_command_line) {
        (true, true) => Err(anyhow!("--memory cannot be used with --dsn")),
        // An exported VOUCH_DSN does not override an explicit --memory.
        (true, false) => Ok(StoreTarget::Memory),
        (false, _) => matches
            .get_one::<String>(store::ARG_DSN)
            .cloned()
            .map(|dsn| StoreTarget::Dsn(SecretString::from(dsn)))
            .context("missing store: pass --dsn (or VOUCH_DSN) or --memory"),
    }
}

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let globals = globals(matches);

    match matches.subcommand() {
        Some(("server", sub)) => Ok(Action::Server(server::Args {
            port: sub.get_one::<u16>("port").copied().unwrap_or(8080),
            dsn: secret(sub, "dsn")?,
            startup_grace: Duration::from_secs(
                sub.get_one::<u64>("startup-grace-seconds")
                    .copied()
                    .unwrap_or(30),
            ),
            globals,
        })),

        Some(("users", sub)) => Ok(Action::Users(UsersArgs {
            store: store_target(sub)?,
        })),

        Some(("selftest", _)) => Ok(Action::SelfTest(SelfTestArgs { globals })),

        Some(("provision", sub)) => {
            let mut fields = IdentityFields::default()
                .with_role(sub.get_one::<Role>("role").copied().unwrap_or_default());
            if let Some(name) = sub.get_one::<String>("name") {
                fields = fields.with_display_name(name);
            }
            if let Some(image) = sub.get_one::<String>("image") {
                fields = fields.with_avatar_ref(image);
            }
            if sub.get_flag("verified") {
                fields = fields.verified_at(Utc::now());
            }

            Ok(Action::Provision(ProvisionArgs {
                globals,
                store: store_target(sub)?,
                email: required(sub, "email")?,
                password: secret(sub, "password")?,
                fields,
            }))
        }

        Some(("rotate", sub)) => {
            let identity = match (sub.get_one::<Uuid>("id"), sub.get_one::<String>("email")) {
                (Some(id), _) => IdentityRef::Id(*id),
                (None, Some(email)) => IdentityRef::Email(email.clone()),
                (None, None) => return Err(anyhow!("missing required argument: --email or --id")),
            };

            Ok(Action::Rotate(RotateArgs {
                globals,
                store: store_target(sub)?,
                identity,
                password: secret(sub, "password")?,
            }))
        }

        Some(("verify", sub)) => Ok(Action::Verify(VerifyArgs {
            globals,
            store: store_target(sub)?,
            email: required(sub, "email")?,
            password: secret(sub, "password")?,
        })),

        Some(("audit", sub)) => {
            let clients: Vec<(String, SecretString)> = sub
                .get_many::<(String, String)>("client")
                .into_iter()
                .flatten()
                .map(|(name, dsn)| (name.clone(), SecretString::from(dsn.clone())))
                .collect();

            if clients.len() < 2 {
                return Err(anyhow!("audit needs at least two --client entries"));
            }

            Ok(Action::Audit(AuditArgs {
                clients,
                email: required(sub, "email")?,
            }))
        }

        Some(("probe", sub)) => Ok(Action::Probe(ProbeArgs {
            globals,
            hash: required(sub, "hash")?,
            candidates: sub
                .get_many::<String>("candidate")
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
        })),

        Some((other, _)) => Err(anyhow!("unknown subcommand: {other}")),
        None => Err(anyhow!("missing subcommand")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    fn dispatch(args: &[&str]) -> Result<Action> {
        let matches = commands::new().try_get_matches_from(args).unwrap();
        handler(&matches)
    }

    #[test]
    fn test_server_action() {
        temp_env::with_vars(
            [
                ("VOUCH_DSN", None::<&str>),
                ("VOUCH_HASH_COST", None),
                ("VOUCH_HASH_MEMORY_KIB", None),
                ("VOUCH_STARTUP_GRACE_SECONDS", None),
                ("VOUCH_PORT", None),
            ],
            || {
                let action = dispatch(&[
                    "vouch",
                    "--cost",
                    "5",
                    "server",
                    "--dsn",
                    "postgres://vouch:pw@localhost/vouch",
                ])
                .unwrap();

                let Action::Server(args) = action else {
                    panic!("expected server action");
                };
                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn.expose_secret(), "postgres://vouch:pw@localhost/vouch");
                assert_eq!(args.startup_grace, Duration::from_secs(30));
                assert_eq!(args.globals.hash_cost, 5);
                assert_eq!(args.globals.hash_memory_kib, 19_456);
            },
        );
    }

    #[test]
    fn test_provision_action() {
        temp_env::with_vars([("VOUCH_DSN", None::<&str>)], || {
            let action = dispatch(&[
                "vouch",
                "provision",
                "--memory",
                "--email",
                "alice@example.com",
                "--password",
                "Secret123!",
                "--name",
                "Alice",
                "--role",
                "creator",
                "--verified",
            ])
            .unwrap();

            let Action::Provision(args) = action else {
                panic!("expected provision action");
            };
            assert!(matches!(args.store, StoreTarget::Memory));
            assert_eq!(args.email, "alice@example.com");
            assert_eq!(args.password.expose_secret(), "Secret123!");
            assert_eq!(args.fields.display_name.as_deref(), Some("Alice"));
            assert_eq!(args.fields.role, Role::Creator);
            assert!(args.fields.email_verified_at.is_some());
        });
    }

    #[test]
    fn test_memory_wins_over_exported_dsn() {
        temp_env::with_vars([("VOUCH_DSN", Some("postgres://vouch:pw@db/vouch"))], || {
            let Action::Users(args) = dispatch(&["vouch", "users", "--memory"]).unwrap() else {
                panic!("expected users action");
            };
            assert!(matches!(args.store, StoreTarget::Memory));

            let Action::Users(args) = dispatch(&["vouch", "users"]).unwrap() else {
                panic!("expected users action");
            };
            let StoreTarget::Dsn(dsn) = args.store else {
                panic!("expected dsn store");
            };
            assert_eq!(dsn.expose_secret(), "postgres://vouch:pw@db/vouch");
        });
    }

    #[test]
    fn test_store_target_required_and_exclusive() {
        temp_env::with_vars([("VOUCH_DSN", None::<&str>)], || {
            assert!(dispatch(&["vouch", "users"]).is_err());
            assert!(dispatch(&[
                "vouch",
                "users",
                "--memory",
                "--dsn",
                "postgres://localhost/vouch"
            ])
            .is_err());
        });
    }

    #[test]
    fn test_rotate_action_by_id() {
        temp_env::with_vars([("VOUCH_DSN", None::<&str>)], || {
            let id = Uuid::new_v4();
            let action = dispatch(&[
                "vouch",
                "rotate",
                "--dsn",
                "postgres://localhost/vouch",
                "--id",
                &id.to_string(),
                "--password",
                "n3w",
            ])
            .unwrap();

            let Action::Rotate(args) = action else {
                panic!("expected rotate action");
            };
            assert_eq!(args.identity, IdentityRef::Id(id));
            assert!(matches!(args.store, StoreTarget::Dsn(_)));
        });
    }

    #[test]
    fn test_audit_action() {
        let action = dispatch(&[
            "vouch",
            "audit",
            "--email",
            "alice@example.com",
            "--client",
            "auth=postgres://a@db1/vouch",
            "--client",
            "admin=postgres://b@db2/vouch",
        ])
        .unwrap();

        let Action::Audit(args) = action else {
            panic!("expected audit action");
        };
        assert_eq!(args.clients.len(), 2);
        assert_eq!(args.clients[1].0, "admin");
        assert_eq!(args.clients[1].1.expose_secret(), "postgres://b@db2/vouch");
    }

    #[test]
    fn test_audit_rejects_single_client() {
        let result = dispatch(&[
            "vouch",
            "audit",
            "--email",
            "alice@example.com",
            "--client",
            "auth=postgres://a@db1/vouch",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_probe_action() {
        let action = dispatch(&[
            "vouch",
            "probe",
            "--hash",
            "$argon2id$v=19$m=64,t=1,p=1$c2FsdA$aGFzaA",
            "--candidate",
            "a",
            "--candidate",
            "b",
        ])
        .unwrap();

        let Action::Probe(args) = action else {
            panic!("expected probe action");
        };
        assert_eq!(args.candidates, vec!["a".to_string(), "b".to_string()]);
    }
}
