//! Extended public key parsing and address derivation.
//!
//! SLIP-132 version prefixes select the address type of a key: `xpub`/`tpub`
//! derive legacy P2PKH addresses, `ypub`/`upub` nested segwit P2SH-P2WPKH and
//! `zpub`/`vpub` native segwit P2WPKH. The prefix is rewritten to the plain BIP32
//! `xpub`/`tpub` version before decoding, so derivation itself is plain BIP32
//! public child derivation along `<branch>/<index>`.

use bitcoin::{
	base58,
	bip32::{ChildNumber, Xpub},
	key::CompressedPublicKey,
	secp256k1::{Secp256k1, VerifyOnly},
	Address, Network, NetworkKind,
};
use lazy_static::lazy_static;
use std::{collections::HashMap, fmt};

use crate::{models::Branch, services::derivation::error::DerivationError};

lazy_static! {
	static ref SECP: Secp256k1<VerifyOnly> = Secp256k1::verification_only();
}

/// Length of a serialized BIP32 extended key
const EXTENDED_KEY_LEN: usize = 78;

const BIP32_MAIN_PUBLIC: [u8; 4] = [0x04, 0x88, 0xb2, 0x1e];
const BIP32_TEST_PUBLIC: [u8; 4] = [0x04, 0x35, 0x87, 0xcf];

/// Address encoding selected by the key version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressScheme {
	/// P2PKH, base58check
	Legacy,
	/// P2SH wrapping `OP_0 <pubkey hash>`, base58check
	NestedSegwit,
	/// P2WPKH, bech32
	NativeSegwit,
}

impl fmt::Display for AddressScheme {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			AddressScheme::Legacy => "p2pkh",
			AddressScheme::NestedSegwit => "p2sh-p2wpkh",
			AddressScheme::NativeSegwit => "p2wpkh",
		};
		write!(f, "{}", name)
	}
}

struct KeyVersion {
	bytes: [u8; 4],
	prefix: &'static str,
	scheme: AddressScheme,
	kind: NetworkKind,
	private: bool,
}

const fn version(
	bytes: [u8; 4],
	prefix: &'static str,
	scheme: AddressScheme,
	kind: NetworkKind,
	private: bool,
) -> KeyVersion {
	KeyVersion {
		bytes,
		prefix,
		scheme,
		kind,
		private,
	}
}

const KEY_VERSIONS: [KeyVersion; 12] = [
	version(BIP32_MAIN_PUBLIC, "xpub", AddressScheme::Legacy, NetworkKind::Main, false),
	version([0x04, 0x9d, 0x7c, 0xb2], "ypub", AddressScheme::NestedSegwit, NetworkKind::Main, false),
	version([0x04, 0xb2, 0x47, 0x46], "zpub", AddressScheme::NativeSegwit, NetworkKind::Main, false),
	version(BIP32_TEST_PUBLIC, "tpub", AddressScheme::Legacy, NetworkKind::Test, false),
	version([0x04, 0x4a, 0x52, 0x62], "upub", AddressScheme::NestedSegwit, NetworkKind::Test, false),
	version([0x04, 0x5f, 0x1c, 0xf6], "vpub", AddressScheme::NativeSegwit, NetworkKind::Test, false),
	version([0x04, 0x88, 0xad, 0xe4], "xprv", AddressScheme::Legacy, NetworkKind::Main, true),
	version([0x04, 0x9d, 0x78, 0x78], "yprv", AddressScheme::NestedSegwit, NetworkKind::Main, true),
	version([0x04, 0xb2, 0x43, 0x0c], "zprv", AddressScheme::NativeSegwit, NetworkKind::Main, true),
	version([0x04, 0x35, 0x83, 0x94], "tprv", AddressScheme::Legacy, NetworkKind::Test, true),
	version([0x04, 0x4a, 0x4e, 0x28], "uprv", AddressScheme::NestedSegwit, NetworkKind::Test, true),
	version([0x04, 0x5f, 0x18, 0xbc], "vprv", AddressScheme::NativeSegwit, NetworkKind::Test, true),
];

/// Short, non-sensitive label of a key for logs and error metadata.
fn key_label(key: &str) -> String {
	key.chars().take(12).collect::<String>() + "..."
}

/// A parsed extended public key bound to a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPubKey {
	xpub: Xpub,
	scheme: AddressScheme,
	network: Network,
	prefix: &'static str,
}

impl ExtendedPubKey {
	/// Decodes `key`, rejecting private keys and keys of another network.
	pub fn parse(key: &str, network: Network) -> Result<Self, DerivationError> {
		let key = key.trim();
		let meta = || Some(HashMap::from([("key".to_string(), key_label(key))]));

		let mut data = base58::decode_check(key).map_err(|e| {
			DerivationError::invalid_key("extended key is not valid base58check", Some(Box::new(e)), meta())
		})?;
		if data.len() != EXTENDED_KEY_LEN {
			return Err(DerivationError::invalid_key(
				format!("extended key must be {} bytes, got {}", EXTENDED_KEY_LEN, data.len()),
				None,
				meta(),
			));
		}

		let version = KEY_VERSIONS
			.iter()
			.find(|v| data[..4] == v.bytes)
			.ok_or_else(|| {
				DerivationError::unsupported_key_version(
					format!("unknown extended key version {}", hex::encode(&data[..4])),
					None,
					meta(),
				)
			})?;

		if version.private {
			return Err(DerivationError::private_key_rejected(
				format!("{} keys carry private key material", version.prefix),
				None,
				meta(),
			));
		}

		if version.kind != NetworkKind::from(network) {
			return Err(DerivationError::unsupported_key_version(
				format!("{} keys cannot be used on {}", version.prefix, network),
				None,
				meta(),
			));
		}

		let bip32_version = if version.kind == NetworkKind::Main {
			BIP32_MAIN_PUBLIC
		} else {
			BIP32_TEST_PUBLIC
		};
		data[..4].copy_from_slice(&bip32_version);

		let xpub = Xpub::decode(&data).map_err(|e| {
			DerivationError::invalid_key("malformed extended key payload", Some(Box::new(e)), meta())
		})?;

		Ok(Self {
			xpub,
			scheme: version.scheme,
			network,
			prefix: version.prefix,
		})
	}

	pub fn scheme(&self) -> AddressScheme {
		self.scheme
	}

	/// Version prefix the key was supplied with, for example "zpub".
	pub fn prefix(&self) -> &'static str {
		self.prefix
	}

	/// Derives the address at `<branch>/<index>`.
	///
	/// Only non-hardened derivation is possible from a public key, so indices
	/// at or above 2^31 fail.
	pub fn derive_address(&self, branch: Branch, index: u32) -> Result<String, DerivationError> {
		let meta = || {
			Some(HashMap::from([
				("prefix".to_string(), self.prefix.to_string()),
				("branch".to_string(), branch.index().to_string()),
				("index".to_string(), index.to_string()),
			]))
		};

		let to_child = |idx: u32| {
			ChildNumber::from_normal_idx(idx).map_err(|e| {
				DerivationError::derivation_failed(
					"index out of range for non-hardened derivation",
					Some(Box::new(e)),
					meta(),
				)
			})
		};
		let path = [to_child(branch.index())?, to_child(index)?];

		let child = self.xpub.derive_pub(&SECP, &path).map_err(|e| {
			DerivationError::derivation_failed("child key derivation failed", Some(Box::new(e)), meta())
		})?;
		let pubkey = CompressedPublicKey(child.public_key);

		let address = match self.scheme {
			AddressScheme::Legacy => Address::p2pkh(pubkey.pubkey_hash(), self.network),
			AddressScheme::NestedSegwit => Address::p2shwpkh(&pubkey, self.network),
			AddressScheme::NativeSegwit => Address::p2wpkh(&pubkey, self.network),
		};

		Ok(address.to_string())
	}
}

/// Derives a single address from an extended public key string.
pub fn derive_address(
	key: &str,
	branch: Branch,
	index: u32,
	network: Network,
) -> Result<String, DerivationError> {
	ExtendedPubKey::parse(key, network)?.derive_address(branch, index)
}
