//! Matching of decoded transactions against watched addresses.

use std::collections::HashMap;

use bitcoin::{consensus, Address, Network, Transaction};

use crate::{models::WatchedAddress, services::monitor::error::MonitorError};

/// Watched addresses affected by one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
	/// Matched addresses without duplicates, in first-seen order
	pub matched: Vec<WatchedAddress>,
	/// An input spends a recorded UTXO of a matched address
	pub sent: bool,
	/// Satoshis of the outputs paying a watched address
	pub amount: u64,
}

impl MatchOutcome {
	pub fn is_empty(&self) -> bool {
		self.matched.is_empty()
	}

	fn add(&mut self, address: &WatchedAddress) {
		if !self.matched.iter().any(|m| m.id == address.id) {
			self.matched.push(address.clone());
		}
	}
}

/// Decodes a raw transaction payload.
///
/// Accepts consensus bytes, or their hex encoding when the payload is ASCII hex.
pub fn decode_transaction(payload: &[u8]) -> Result<Transaction, MonitorError> {
	let bytes = if is_hex(payload) {
		hex::decode(payload).map_err(|e| {
			MonitorError::decode_error("Malformed transaction hex", Some(Box::new(e)), None)
		})?
	} else {
		payload.to_vec()
	};

	consensus::deserialize::<Transaction>(&bytes).map_err(|e| {
		MonitorError::decode_error(
			"Malformed transaction encoding",
			Some(Box::new(e)),
			Some(HashMap::from([(
				"payload_len".to_string(),
				payload.len().to_string(),
			)])),
		)
	})
}

fn is_hex(payload: &[u8]) -> bool {
	!payload.is_empty() && payload.iter().all(u8::is_ascii_hexdigit)
}

/// Matches the outputs and inputs of `tx` against a registry snapshot.
///
/// Each output paying a watched address adds its value once to the amount,
/// however many users watch that address. Inputs spending a recorded UTXO mark
/// the transaction as sent.
pub fn match_transaction(
	tx: &Transaction,
	addresses: &[WatchedAddress],
	network: Network,
) -> MatchOutcome {
	let mut outcome = MatchOutcome::default();

	for output in &tx.output {
		let Ok(destination) = Address::from_script(&output.script_pubkey, network) else {
			continue;
		};
		let destination = destination.to_string();

		let mut paid = false;
		for address in addresses.iter().filter(|a| a.address == destination) {
			outcome.add(address);
			paid = true;
		}
		if paid {
			outcome.amount = outcome.amount.saturating_add(output.value.to_sat());
		}
	}

	for input in &tx.input {
		for address in addresses
			.iter()
			.filter(|a| a.holds_outpoint(&input.previous_output))
		{
			outcome.add(address);
			outcome.sent = true;
		}
	}

	outcome
}
