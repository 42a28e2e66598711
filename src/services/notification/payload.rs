//! Per-user rendering of transaction notifications.
//!
//! A notification can concern addresses of several users; each user only sees
//! their own addresses and the amount paid to them.

use bitcoin::Network;
use serde::Serialize;
use serde_json::Value;

use crate::{
	models::TxNotification, services::registry::script_scripthash,
	utils::constants::SATOSHIS_PER_BITCOIN,
};

/// Direction of a transaction from the point of view of its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
	Received,
	Sent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressSummary {
	pub id: String,
	pub name: Option<String>,
	pub address: String,
}

/// What one user is told about a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationSummary {
	pub user_id: String,
	pub txid: String,
	pub direction: Direction,
	pub confirmed: bool,
	/// Satoshis paid to this user's matched addresses
	pub amount_sat: u64,
	pub amount_btc: String,
	pub addresses: Vec<AddressSummary>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub explorer_url: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub app_url: Option<String>,
}

impl NotificationSummary {
	/// Summarizes `notification` for `user_id`.
	///
	/// Returns None when none of the matched addresses belong to the user.
	pub fn for_user(
		notification: &TxNotification,
		user_id: &str,
		network: Network,
		app_url: Option<&str>,
	) -> Option<Self> {
		let addresses: Vec<AddressSummary> = notification
			.addresses_for_user(user_id)
			.map(|a| AddressSummary {
				id: a.id.clone(),
				name: a.name.clone(),
				address: a.address.clone(),
			})
			.collect();
		if addresses.is_empty() {
			return None;
		}

		let scripthashes: Vec<&str> = notification
			.addresses_for_user(user_id)
			.map(|a| a.scripthash.as_str())
			.collect();
		let amount_sat = notification
			.tx
			.output
			.iter()
			.filter(|o| scripthashes.contains(&script_scripthash(&o.script_pubkey).as_str()))
			.map(|o| o.value.to_sat())
			.fold(0u64, u64::saturating_add);

		// only this user's recorded outputs make the transaction outgoing for them
		let spent_by_user = notification.tx.input.iter().any(|input| {
			notification
				.addresses_for_user(user_id)
				.any(|a| a.holds_outpoint(&input.previous_output))
		});

		let txid = notification.txid().to_string();
		Some(Self {
			user_id: user_id.to_string(),
			direction: if spent_by_user {
				Direction::Sent
			} else {
				Direction::Received
			},
			confirmed: notification.confirmed,
			amount_sat,
			amount_btc: format_btc(amount_sat),
			addresses,
			explorer_url: explorer_url(network, &txid),
			app_url: app_url.map(|url| url.trim_end_matches('/').to_string()),
			txid,
		})
	}

	pub fn status(&self) -> &'static str {
		if self.confirmed {
			"confirmed"
		} else {
			"unconfirmed"
		}
	}

	/// One-line subject used by emails
	pub fn subject(&self) -> String {
		match self.direction {
			Direction::Received => format!(
				"Received {} BTC ({})",
				self.amount_btc,
				self.status()
			),
			Direction::Sent => format!("Outgoing transaction ({})", self.status()),
		}
	}

	/// Markdown body used by emails
	pub fn to_markdown(&self) -> String {
		let mut body = String::new();
		match self.direction {
			Direction::Received => body.push_str(&format!(
				"**{} BTC** received on your watched addresses.\n\n",
				self.amount_btc
			)),
			Direction::Sent => {
				body.push_str("Funds were **sent** from your watched addresses.\n\n");
				if self.amount_sat > 0 {
					body.push_str(&format!(
						"{} BTC returned to your watched addresses.\n\n",
						self.amount_btc
					));
				}
			}
		}

		body.push_str("Addresses:\n\n");
		for address in &self.addresses {
			match &address.name {
				Some(name) => body.push_str(&format!("- {} (`{}`)\n", name, address.address)),
				None => body.push_str(&format!("- `{}`\n", address.address)),
			}
		}

		body.push_str(&format!(
			"\nTransaction: `{}`\n\nStatus: {}\n",
			self.txid,
			self.status()
		));
		if let Some(url) = &self.explorer_url {
			body.push_str(&format!("\n[View transaction]({})\n", url));
		}
		if let Some(url) = &self.app_url {
			body.push_str(&format!("\n[Manage your addresses]({})\n", url));
		}
		body
	}

	/// JSON body posted to webhooks
	pub fn to_json(&self) -> Value {
		serde_json::json!({
			"event": "transaction",
			"txid": self.txid,
			"direction": self.direction,
			"confirmed": self.confirmed,
			"amount": {
				"sat": self.amount_sat,
				"btc": self.amount_btc,
			},
			"addresses": self.addresses,
			"explorer_url": self.explorer_url,
		})
	}
}

/// Formats satoshis as a decimal bitcoin amount with eight places
pub fn format_btc(sat: u64) -> String {
	format!(
		"{}.{:08}",
		sat / SATOSHIS_PER_BITCOIN,
		sat % SATOSHIS_PER_BITCOIN
	)
}

/// Public block explorer page of `txid`, when the network has one
pub fn explorer_url(network: Network, txid: &str) -> Option<String> {
	let base = match network {
		Network::Bitcoin => "https://mempool.space",
		Network::Testnet => "https://mempool.space/testnet",
		Network::Signet => "https://mempool.space/signet",
		_ => return None,
	};
	Some(format!("{}/tx/{}", base, txid))
}
