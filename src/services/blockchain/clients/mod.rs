//! Blockchain data client implementations.
//!
//! - Electrum client for address-indexed UTXO and history queries

mod electrum {
	pub mod client;
}

pub use electrum::client::ElectrumClient;
