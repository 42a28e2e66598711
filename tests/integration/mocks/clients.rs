//! Mock implementation of the blockchain data client.
//!
//! - [`MockBlockchainDataClient`] - answers UTXO, history and transaction queries
//!   without an Electrum server
//! - [`MockScanQueue`] - accepts scan requests without a worker

use async_trait::async_trait;
use bitcoin::Txid;
use mockall::mock;

use satwatch_monitor::{
	models::Utxo,
	services::{
		blockchain::{BlockchainDataClient, HistoryItem, TransactionInfo},
		scanner::{ScanQueue, ScannerError},
	},
};

mock! {
	/// Mock implementation of the blockchain data client.
	pub BlockchainDataClient {}

	#[async_trait]
	impl BlockchainDataClient for BlockchainDataClient {
		async fn list_unspent(&self, scripthash: &str) -> Result<Vec<Utxo>, anyhow::Error>;
		async fn get_history(&self, scripthash: &str) -> Result<Vec<HistoryItem>, anyhow::Error>;
		async fn get_transaction(&self, txid: &Txid) -> Result<TransactionInfo, anyhow::Error>;
	}
}

/// Transaction info with the given confirmation count
pub fn transaction_info(txid: &Txid, confirmations: u32) -> TransactionInfo {
	TransactionInfo {
		txid: *txid,
		confirmations: (confirmations > 0).then_some(confirmations),
		blockhash: None,
		hex: None,
	}
}

mock! {
	/// Mock scan queue recording requested scripthashes.
	pub ScanQueue {}

	#[async_trait]
	impl ScanQueue for ScanQueue {
		fn enqueue_scan(&self, scripthash: &str) -> bool;
		async fn enqueue_scan_wait(&self, scripthash: &str) -> Result<(), ScannerError>;
	}
}
