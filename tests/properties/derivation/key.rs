//! Property-based tests for extended key derivation.
//!
//! Keys are generated from random seeds and serialized with every mainnet
//! public version, so the tests cover the three address schemes.

use bitcoin::{Address, Network};
use proptest::{prelude::*, test_runner::Config};
use std::{collections::HashSet, str::FromStr};

use satwatch_monitor::{
	models::Branch,
	services::derivation::{
		derive_address, AddressScheme, DerivationError, ExtendedKeyExpansion, ExtendedPubKey,
	},
};

use crate::properties::strategies::{extended_key_strategy, private_key_strategy};

fn address_type_matches(address: &str, scheme: AddressScheme) -> bool {
	let address = Address::from_str(address)
		.unwrap()
		.require_network(Network::Bitcoin)
		.unwrap();
	let kind = address.address_type();
	matches!(
		(scheme, kind),
		(AddressScheme::Legacy, Some(bitcoin::AddressType::P2pkh))
			| (AddressScheme::NestedSegwit, Some(bitcoin::AddressType::P2sh))
			| (AddressScheme::NativeSegwit, Some(bitcoin::AddressType::P2wpkh))
	)
}

proptest! {
	#![proptest_config(Config {
		cases: 32,
		failure_persistence: None,
		..Config::default()
	})]

	/// Derivation is a pure function of key, branch and index.
	#[test]
	fn test_derivation_is_deterministic(
		(key, _) in extended_key_strategy(),
		index in 0u32..50
	) {
		let first = derive_address(&key, Branch::External, index, Network::Bitcoin).unwrap();
		let second = ExtendedPubKey::parse(&key, Network::Bitcoin)
			.unwrap()
			.derive_address(Branch::External, index)
			.unwrap();
		prop_assert_eq!(first, second);
	}

	/// Receiving and change addresses never collide.
	#[test]
	fn test_branches_produce_distinct_addresses(
		(key, _) in extended_key_strategy(),
		index in 0u32..50
	) {
		let key = ExtendedPubKey::parse(&key, Network::Bitcoin).unwrap();
		let external = key.derive_address(Branch::External, index).unwrap();
		let change = key.derive_address(Branch::Change, index).unwrap();
		prop_assert_ne!(external, change);
	}

	/// The version prefix selects the address type.
	#[test]
	fn test_version_selects_scheme(
		(key, scheme) in extended_key_strategy(),
		index in 0u32..20
	) {
		let parsed = ExtendedPubKey::parse(&key, Network::Bitcoin).unwrap();
		prop_assert_eq!(parsed.scheme(), scheme);
		let address = parsed.derive_address(Branch::Change, index).unwrap();
		prop_assert!(address_type_matches(&address, scheme));
	}

	/// An expansion with gap `g` yields `2g` distinct addresses.
	#[test]
	fn test_expansion_addresses_are_unique(
		(key, _) in extended_key_strategy(),
		gap in 1u32..8
	) {
		let key = ExtendedPubKey::parse(&key, Network::Bitcoin).unwrap();
		let derived = ExtendedKeyExpansion::new(gap).derive_all(&key).unwrap();
		prop_assert_eq!(derived.len(), gap as usize * 2);

		let unique: HashSet<&str> = derived.iter().map(|d| d.address.as_str()).collect();
		prop_assert_eq!(unique.len(), derived.len());
	}

	/// Mainnet keys are refused on test networks.
	#[test]
	fn test_network_mismatch_is_rejected((key, _) in extended_key_strategy()) {
		let result = ExtendedPubKey::parse(&key, Network::Testnet);
		prop_assert!(
			matches!(result, Err(DerivationError::UnsupportedKeyVersion(_))),
			"unexpected result for {}",
			key
		);
	}

	/// Private keys are always refused.
	#[test]
	fn test_private_keys_are_rejected(key in private_key_strategy()) {
		let result = ExtendedPubKey::parse(&key, Network::Bitcoin);
		prop_assert!(matches!(result, Err(DerivationError::PrivateKeyRejected(_))));
	}

	/// Arbitrary text never panics the parser.
	#[test]
	fn test_parse_never_panics(input in "\\PC{0,120}") {
		let _ = ExtendedPubKey::parse(&input, Network::Bitcoin);
	}
}
