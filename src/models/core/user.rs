use serde::{Deserialize, Serialize};

use crate::models::SecretValue;

/// Owner of watched addresses and the destinations their alerts go to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct User {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub email: Option<String>,
	/// Armored OpenPGP public key; alert emails are encrypted to it when set
	#[serde(default)]
	pub pgp_pubkey: Option<String>,
	#[serde(default)]
	pub webhooks: Vec<WebhookTarget>,
}

/// HTTP endpoint receiving JSON notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookTarget {
	pub url: String,
	/// Key used to sign the request body with HMAC-SHA256
	#[serde(default)]
	pub secret: Option<SecretValue>,
}
