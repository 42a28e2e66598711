//! Property-based tests for transaction matching.

use bitcoin::{hashes::Hash, Network, ScriptBuf, Txid, WPubkeyHash};
use proptest::{prelude::*, test_runner::Config};

use satwatch_monitor::{
	services::monitor::{decode_transaction, match_transaction},
	utils::tests::builders::{address::WatchedAddressBuilder, transaction::TransactionBuilder},
};

use crate::properties::strategies::amount_strategy;

const WATCHED: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

fn unrelated_script(hash: [u8; 20]) -> ScriptBuf {
	ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(hash))
}

fn outputs_strategy() -> impl Strategy<Value = Vec<([u8; 20], u64)>> {
	prop::collection::vec((any::<[u8; 20]>(), amount_strategy()), 1..8)
}

proptest! {
	#![proptest_config(Config {
		failure_persistence: None,
		..Config::default()
	})]

	/// Transactions touching no watched address produce no match.
	#[test]
	fn test_unrelated_transactions_never_match(
		outputs in outputs_strategy(),
		input in any::<[u8; 32]>(),
		vout in 0u32..4
	) {
		prop_assume!(input != [0xee; 32]);
		let watched = vec![WatchedAddressBuilder::new()
			.utxo(Txid::from_byte_array([0xee; 32]), 0, 1000, 1)
			.build()];

		let mut builder = TransactionBuilder::new().input(Txid::from_byte_array(input), vout);
		for (hash, value) in outputs {
			builder = builder.output_script(unrelated_script(hash), value);
		}

		let outcome = match_transaction(&builder.build(), &watched, Network::Bitcoin);
		prop_assert!(outcome.is_empty());
		prop_assert!(!outcome.sent);
		prop_assert_eq!(outcome.amount, 0);
	}

	/// The amount is the sum of the outputs paying watched addresses.
	#[test]
	fn test_amount_sums_watched_outputs(
		watched_values in prop::collection::vec(0u64..1_000_000_000, 1..5),
		others in outputs_strategy()
	) {
		let watched = vec![WatchedAddressBuilder::new().build()];

		let mut builder = TransactionBuilder::new().input(Txid::from_byte_array([0x01; 32]), 0);
		for value in &watched_values {
			builder = builder.output(WATCHED, *value);
		}
		for (hash, value) in others {
			builder = builder.output_script(unrelated_script(hash), value);
		}

		let outcome = match_transaction(&builder.build(), &watched, Network::Bitcoin);
		prop_assert_eq!(outcome.matched.len(), 1);
		prop_assert_eq!(outcome.amount, watched_values.iter().sum::<u64>());
		prop_assert!(!outcome.sent);
	}

	/// Spending a recorded UTXO marks the transaction as sent.
	#[test]
	fn test_spending_recorded_utxo_is_sent(
		utxo_txid in any::<[u8; 32]>(),
		utxo_vout in 0u32..10,
		change in proptest::option::of(0u64..1_000_000)
	) {
		let txid = Txid::from_byte_array(utxo_txid);
		let watched = vec![WatchedAddressBuilder::new().utxo(txid, utxo_vout, 50_000, 1).build()];

		let mut builder = TransactionBuilder::new()
			.input(txid, utxo_vout)
			.output_script(unrelated_script([0x42; 20]), 40_000);
		if let Some(change) = change {
			builder = builder.output(WATCHED, change);
		}

		let outcome = match_transaction(&builder.build(), &watched, Network::Bitcoin);
		prop_assert!(outcome.sent);
		prop_assert_eq!(outcome.matched.len(), 1);
		prop_assert_eq!(outcome.amount, change.unwrap_or(0));
	}

	/// Arbitrary bytes never panic the decoder.
	#[test]
	fn test_decode_never_panics(payload in prop::collection::vec(any::<u8>(), 0..512)) {
		let _ = decode_transaction(&payload);
	}
}
