use crate::credentials::{
    hasher::{DEFAULT_COST, DEFAULT_MEMORY_KIB},
    PasswordHasher,
};

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Copy)]
pub struct GlobalArgs {
    pub hash_cost: u32,
    pub hash_memory_kib: u32,
}

impl GlobalArgs {
    #[must_use]
    pub const fn new(hash_cost: u32, hash_memory_kib: u32) -> Self {
        Self {
            hash_cost,
            hash_memory_kib,
        }
    }

    #[must_use]
    pub const fn hasher(&self) -> PasswordHasher {
        PasswordHasher::new(self.hash_cost).with_memory_kib(self.hash_memory_kib)
    }
}

impl Default for GlobalArgs {
    fn default() -> Self {
        Self::new(DEFAULT_COST, DEFAULT_MEMORY_KIB)
    }
}
