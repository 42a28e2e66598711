//! OpenPGP encryption of alert emails.
//!
//! Users may register an armored public key. Their alerts are then sent as
//! PGP/MIME: the HTML part is encrypted to the key and wrapped in a
//! `multipart/encrypted` message.

use pgp::{
	crypto::sym::SymmetricKeyAlgorithm, types::PublicKeyTrait, ArmorOptions, Deserializable,
	Message, SignedPublicKey,
};

use crate::services::notification::NotificationError;

/// Parses and verifies an armored public key.
///
/// The key must carry self-signatures that verify and at least one key usable
/// for encryption.
pub fn parse_public_key(armored: &str) -> Result<SignedPublicKey, NotificationError> {
	let (key, _headers) = SignedPublicKey::from_string(armored.trim()).map_err(|e| {
		NotificationError::config_error("Invalid OpenPGP public key", Some(Box::new(e)), None)
	})?;

	key.verify().map_err(|e| {
		NotificationError::config_error(
			"OpenPGP public key signatures do not verify",
			Some(Box::new(e)),
			None,
		)
	})?;

	if !key.is_encryption_key()
		&& !key.public_subkeys.iter().any(|sub| sub.is_encryption_key())
	{
		return Err(NotificationError::config_error(
			"OpenPGP public key cannot encrypt",
			None,
			None,
		));
	}

	Ok(key)
}

/// Encrypts `plaintext` to `key` and returns the ASCII-armored message.
///
/// The first encryption subkey is used, the primary key otherwise.
pub fn encrypt_armored(key: &SignedPublicKey, plaintext: &[u8]) -> Result<String, NotificationError> {
	let message = Message::new_literal_bytes("", plaintext);
	let mut rng = rand::thread_rng();

	let encrypted = match key
		.public_subkeys
		.iter()
		.find(|sub| sub.is_encryption_key())
	{
		Some(subkey) => {
			message.encrypt_to_keys_seipdv1(&mut rng, SymmetricKeyAlgorithm::AES128, &[subkey])
		}
		None => message.encrypt_to_keys_seipdv1(&mut rng, SymmetricKeyAlgorithm::AES128, &[key]),
	}
	.map_err(|e| {
		NotificationError::internal_error("Failed to encrypt email", Some(Box::new(e)), None)
	})?;

	encrypted
		.to_armored_string(ArmorOptions::default())
		.map_err(|e| {
			NotificationError::internal_error(
				"Failed to armor encrypted email",
				Some(Box::new(e)),
				None,
			)
		})
}
