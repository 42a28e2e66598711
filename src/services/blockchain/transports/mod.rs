//! Transport implementations for blockchain data clients.
//!
//! - Electrum protocol over TCP, optionally wrapped in TLS
//! - A reconnecting Electrum transport replacing closed connections

mod electrum {
	pub mod connection;
	pub mod session;
}

pub use electrum::{connection::ElectrumConnection, session::ElectrumTransport};

use serde_json::{json, Value};

use crate::services::blockchain::error::BlockChainError;

/// Base trait for JSON-RPC transports used by the blockchain data clients
#[async_trait::async_trait]
pub trait BlockchainTransport: Send + Sync {
	/// Address of the server this transport talks to
	fn server(&self) -> String;

	/// Sends a request and returns the `result` member of the response
	async fn send_raw_request(&self, method: &str, params: Value)
		-> Result<Value, BlockChainError>;

	/// Builds the JSON-RPC envelope for a request
	fn customize_request(&self, id: u64, method: &str, params: Value) -> Value {
		json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		})
	}
}
