//! Extended public key derivation.
//!
//! Turns xpub/ypub/zpub (and testnet tpub/upub/vpub) keys into receiving and
//! change addresses. Pure functions, no I/O.

mod error;
mod expansion;
mod key;

pub use error::DerivationError;
pub use expansion::{DerivedAddress, ExtendedKeyExpansion};
pub use key::{derive_address, AddressScheme, ExtendedPubKey};
