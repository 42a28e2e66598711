//! Electrum blockchain data client.
//!
//! Answers UTXO, history and transaction queries keyed by scripthash through an
//! Electrum server. Nothing is retried here; callers re-trigger failed work.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bitcoin::Txid;
use serde_json::json;
use tracing::instrument;

use crate::{
	models::{ElectrumConfig, Utxo},
	services::blockchain::{
		client::{BlockchainDataClient, HistoryItem, TransactionInfo},
		transports::{BlockchainTransport, ElectrumTransport},
	},
	utils::RetryConfig,
};

/// Client for Electrum protocol servers
pub struct ElectrumClient<T: BlockchainTransport> {
	transport: Arc<T>,
}

impl<T: BlockchainTransport> Clone for ElectrumClient<T> {
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
		}
	}
}

impl<T: BlockchainTransport> ElectrumClient<T> {
	/// Creates a new client on top of an existing transport
	pub fn new_with_transport(transport: Arc<T>) -> Self {
		Self { transport }
	}

	pub fn transport(&self) -> Arc<T> {
		self.transport.clone()
	}
}

impl ElectrumClient<ElectrumTransport> {
	/// Connects to the configured Electrum server, reconnecting when it drops
	pub async fn new(config: &ElectrumConfig) -> Result<Self, anyhow::Error> {
		let connection = ElectrumTransport::connect(config, RetryConfig::default())
			.await
			.with_context(|| format!("Failed to connect to {}:{}", config.host, config.port))?;
		Ok(Self::new_with_transport(Arc::new(connection)))
	}
}

#[async_trait]
impl<T: BlockchainTransport + 'static> BlockchainDataClient for ElectrumClient<T> {
	#[instrument(skip(self), fields(server = %self.transport.server()))]
	async fn list_unspent(&self, scripthash: &str) -> Result<Vec<Utxo>, anyhow::Error> {
		let result = self
			.transport
			.send_raw_request("blockchain.scripthash.listunspent", json!([scripthash]))
			.await
			.with_context(|| format!("Failed to list unspent outputs of {}", scripthash))?;

		if result.is_null() {
			return Ok(Vec::new());
		}
		serde_json::from_value(result).with_context(|| "Failed to parse unspent outputs")
	}

	#[instrument(skip(self), fields(server = %self.transport.server()))]
	async fn get_history(&self, scripthash: &str) -> Result<Vec<HistoryItem>, anyhow::Error> {
		let result = self
			.transport
			.send_raw_request("blockchain.scripthash.get_history", json!([scripthash]))
			.await
			.with_context(|| format!("Failed to get history of {}", scripthash))?;

		if result.is_null() {
			return Ok(Vec::new());
		}
		serde_json::from_value(result).with_context(|| "Failed to parse history")
	}

	#[instrument(skip(self), fields(server = %self.transport.server()))]
	async fn get_transaction(&self, txid: &Txid) -> Result<TransactionInfo, anyhow::Error> {
		let result = self
			.transport
			.send_raw_request("blockchain.transaction.get", json!([txid.to_string(), true]))
			.await
			.with_context(|| format!("Failed to get transaction {}", txid))?;

		if result.is_null() {
			return Err(anyhow::anyhow!("Transaction {} not found", txid));
		}
		serde_json::from_value(result).with_context(|| "Failed to parse transaction")
	}
}
