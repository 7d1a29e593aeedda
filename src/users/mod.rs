#[cfg(test)]
pub mod memory;
pub mod repo;
pub mod repo_types;

#[cfg(test)]
pub use memory::{MemoryUserDirectory, StaleReads};
pub use repo::{PgUserDirectory, UserDirectory};
pub use repo_types::{Metadata, NewUser, ProfileChanges, User, UserId};
