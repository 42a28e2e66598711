//! Mock implementations for testing purposes.
//!
//! This module contains mock implementations of the collaborator traits used
//! throughout the application. It includes mocks for:
//! - The blockchain data client
//! - The Electrum JSON-RPC transport
//! - Address storage
//!
//! The mocks are implemented using the `mockall` crate.

mod clients;
mod repositories;
#[allow(unused_imports)]
pub use clients::*;
#[allow(unused_imports)]
pub use models::*;
#[allow(unused_imports)]
pub use repositories::*;
#[allow(unused_imports)]
pub use transports::*;
