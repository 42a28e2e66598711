use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An extended public key registered by a user.
///
/// Only the serialized public key is stored; the derived addresses live in the
/// address registry and point back here through their derivation link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedKeyRecord {
	pub id: String,
	pub user_id: String,
	pub name: Option<String>,
	/// Base58check encoded xpub/ypub/zpub (or testnet equivalent)
	pub pubkey: String,
	/// Addresses derived per branch
	pub gap: u32,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deleted_at: Option<DateTime<Utc>>,
}

impl ExtendedKeyRecord {
	pub fn is_deleted(&self) -> bool {
		self.deleted_at.is_some()
	}
}
