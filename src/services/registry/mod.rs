//! Watched address registry.
//!
//! Keeps the in-memory list of watched addresses with their unspent outputs,
//! persists changes through the address repository and queues UTXO scans for
//! new addresses.

mod error;
mod scripthash;
mod service;

pub use error::RegistryError;
pub use scripthash::{parse_address, script_scripthash, scripthash};
pub use service::{AddressRegistry, AddressSource};
