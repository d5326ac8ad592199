use clap::{Arg, Command};

pub const ARG_HASH_COST: &str = "cost";
pub const ARG_HASH_MEMORY_KIB: &str = "memory-kib";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HASH_COST)
                .long("cost")
                .help("Argon2id time cost used for new hashes")
                .default_value("3")
                .env("VOUCH_HASH_COST")
                .global(true)
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_HASH_MEMORY_KIB)
                .long("memory-kib")
                .help("Argon2id memory cost in KiB used for new hashes")
                .default_value("19456")
                .env("VOUCH_HASH_MEMORY_KIB")
                .global(true)
                .value_parser(clap::value_parser!(u32).range(8..)),
        )
}
