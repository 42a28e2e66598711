//! Blockchain data client interfaces and implementations.
//!
//! Provides the read-only view of the chain used by the UTXO scanner and the
//! transaction monitor. Includes:
//!
//! - The `BlockchainDataClient` capability trait
//! - An Electrum protocol client
//! - The Electrum TCP/TLS transport
//! - Error handling for blockchain operations

mod client;
mod clients;
mod error;
mod transports;

pub use client::{BlockchainDataClient, HistoryItem, TransactionInfo};
pub use clients::ElectrumClient;
pub use error::BlockChainError;
pub use transports::{BlockchainTransport, ElectrumConnection, ElectrumTransport};
