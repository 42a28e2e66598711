//! Repository implementations for persisted state.
//!
//! - Address: watched addresses and extended keys, stored as JSON files under the
//!   data directory with soft deletion
//! - User: user definitions loaded from JSON configuration files

mod address;
mod error;
mod user;

pub use address::{AddressRepository, AddressRepositoryTrait};
pub use error::RepositoryError;
pub use user::{UserRepository, UserRepositoryTrait};
