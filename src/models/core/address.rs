use bitcoin::{OutPoint, Txid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::constants::{CHANGE_BRANCH, EXTERNAL_BRANCH};

/// Derivation branch of an address expanded from an extended key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
	/// Receiving addresses, child index 0
	External,
	/// Change addresses, child index 1
	Change,
}

impl Branch {
	pub const ALL: [Branch; 2] = [Branch::External, Branch::Change];

	/// Non-hardened child number of the branch.
	pub fn index(self) -> u32 {
		match self {
			Branch::External => EXTERNAL_BRANCH,
			Branch::Change => CHANGE_BRANCH,
		}
	}

	pub fn is_external(self) -> bool {
		self == Branch::External
	}
}

/// Link from a watched address back to the extended key it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
	pub extended_key_id: String,
	pub branch: Branch,
	pub index: u32,
}

/// Unspent output currently held by a watched address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
	pub tx_hash: Txid,
	pub tx_pos: u32,
	/// Value in satoshis
	pub value: u64,
	/// Confirmation height, 0 (or negative) while unconfirmed
	pub height: i64,
}

impl Utxo {
	pub fn outpoint(&self) -> OutPoint {
		OutPoint::new(self.tx_hash, self.tx_pos)
	}

	pub fn is_confirmed(&self) -> bool {
		self.height > 0
	}
}

/// An address watched on behalf of a user.
///
/// `scripthash` is always computed from `address` by the registry and is the
/// key used for UTXO queries and for routing scan results back to the address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedAddress {
	pub id: String,
	pub user_id: String,
	pub name: Option<String>,
	pub address: String,
	pub scripthash: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub derivation: Option<Derivation>,
	#[serde(default)]
	pub utxos: Vec<Utxo>,
	/// Outputs paid to the address by transactions seen on the feed that no
	/// scan has reported yet. Dropped once a scan lists them or they are spent.
	#[serde(skip)]
	pub pending: Vec<Utxo>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deleted_at: Option<DateTime<Utc>>,
}

impl WatchedAddress {
	pub fn extended_key_id(&self) -> Option<&str> {
		self.derivation
			.as_ref()
			.map(|d| d.extended_key_id.as_str())
	}

	pub fn is_deleted(&self) -> bool {
		self.deleted_at.is_some()
	}

	/// Returns true when one of the recorded or pending UTXOs is `outpoint`.
	pub fn holds_outpoint(&self, outpoint: &OutPoint) -> bool {
		self.utxos
			.iter()
			.chain(&self.pending)
			.any(|utxo| utxo.tx_hash == outpoint.txid && utxo.tx_pos == outpoint.vout)
	}

	/// Sum of the recorded UTXO values.
	pub fn balance(&self) -> u64 {
		self.utxos.iter().map(|u| u.value).sum()
	}
}

/// Request to start watching an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAddress {
	pub user_id: String,
	pub name: Option<String>,
	pub address: String,
	pub derivation: Option<Derivation>,
}

impl NewAddress {
	pub fn single(user_id: impl Into<String>, address: impl Into<String>) -> Self {
		Self {
			user_id: user_id.into(),
			name: None,
			address: address.into(),
			derivation: None,
		}
	}

	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}
}
