//! Electrum scripthash computation.

use std::{collections::HashMap, str::FromStr};

use bitcoin::{Address, Network, Script};
use sha2::{Digest, Sha256};

use crate::services::registry::error::RegistryError;

/// Parses `address` and checks that it belongs to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address, RegistryError> {
	let metadata = || {
		Some(HashMap::from([
			("address".to_string(), address.to_string()),
			("network".to_string(), network.to_string()),
		]))
	};

	Address::from_str(address.trim())
		.map_err(|e| RegistryError::invalid_address("Invalid address", Some(Box::new(e)), metadata()))?
		.require_network(network)
		.map_err(|e| {
			RegistryError::invalid_address(
				"Address belongs to another network",
				Some(Box::new(e)),
				metadata(),
			)
		})
}

/// SHA-256 of the locking script, byte-reversed and hex-encoded.
pub fn script_scripthash(script: &Script) -> String {
	let mut digest: [u8; 32] = Sha256::digest(script.as_bytes()).into();
	digest.reverse();
	hex::encode(digest)
}

/// Scripthash of an address string.
pub fn scripthash(address: &str, network: Network) -> Result<String, RegistryError> {
	let address = parse_address(address, network)?;
	Ok(script_scripthash(&address.script_pubkey()))
}
