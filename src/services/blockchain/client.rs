//! Blockchain data client interface.
//!
//! The scanner and the monitor only ever talk to the chain through this trait,
//! which keeps both of them testable against mocks.

use async_trait::async_trait;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

use crate::models::Utxo;

/// A transaction touching a scripthash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
	pub tx_hash: Txid,
	/// Block height; 0 for mempool, -1 for mempool with unconfirmed parents
	pub height: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fee: Option<u64>,
}

impl HistoryItem {
	pub fn is_confirmed(&self) -> bool {
		self.height > 0
	}
}

/// Confirmation details of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
	pub txid: Txid,
	/// Absent while the transaction is in the mempool
	#[serde(default)]
	pub confirmations: Option<u32>,
	#[serde(default)]
	pub blockhash: Option<String>,
	#[serde(default)]
	pub hex: Option<String>,
}

impl TransactionInfo {
	pub fn is_confirmed(&self) -> bool {
		self.confirmations.unwrap_or(0) > 0
	}
}

/// Read access to UTXO, history and transaction data keyed by scripthash.
///
/// Implementations do not retry; callers decide whether a failure is retried.
#[async_trait]
pub trait BlockchainDataClient: Send + Sync {
	/// Unspent outputs of `scripthash`, empty when there are none
	async fn list_unspent(&self, scripthash: &str) -> Result<Vec<Utxo>, anyhow::Error>;

	/// Confirmed and mempool transactions of `scripthash`
	async fn get_history(&self, scripthash: &str) -> Result<Vec<HistoryItem>, anyhow::Error>;

	/// Confirmation details of `txid`
	async fn get_transaction(&self, txid: &Txid) -> Result<TransactionInfo, anyhow::Error>;
}
