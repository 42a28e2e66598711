use bitcoin::{Transaction, Txid};
use serde::{Deserialize, Serialize};

use crate::models::{Utxo, WatchedAddress};

/// Scripthash queued for a UTXO refresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanRequest {
	pub scripthash: String,
}

impl ScanRequest {
	pub fn new(scripthash: impl Into<String>) -> Self {
		Self {
			scripthash: scripthash.into(),
		}
	}
}

/// Unspent outputs of a scripthash at the time it was scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoResult {
	pub scripthash: String,
	pub utxos: Vec<Utxo>,
}

/// A broadcast transaction affecting at least one watched address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxNotification {
	/// Snapshots of the matched addresses, without duplicates, in match order
	pub matched_addresses: Vec<WatchedAddress>,
	pub tx: Transaction,
	/// True when an input spends a UTXO recorded for a watched address
	pub sent: bool,
	/// True when the transaction has at least one confirmation
	pub confirmed: bool,
	/// Satoshis paid to the matched addresses by the transaction outputs
	pub amount: u64,
}

impl TxNotification {
	pub fn txid(&self) -> Txid {
		self.tx.compute_txid()
	}

	/// Distinct owners of the matched addresses, in match order.
	pub fn user_ids(&self) -> Vec<&str> {
		let mut users: Vec<&str> = Vec::new();
		for address in &self.matched_addresses {
			if !users.contains(&address.user_id.as_str()) {
				users.push(&address.user_id);
			}
		}
		users
	}

	/// Matched addresses owned by `user_id`.
	pub fn addresses_for_user<'a>(
		&'a self,
		user_id: &'a str,
	) -> impl Iterator<Item = &'a WatchedAddress> + 'a {
		self.matched_addresses
			.iter()
			.filter(move |address| address.user_id == user_id)
	}
}
