//! Secret values for webhook signing keys and SMTP credentials.
//!
//! Secrets are zeroized when dropped and never printed by `Debug`.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, env, fmt};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::ConfigError;

/// A string that wipes its contents on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Exposes the secret. Do not keep the returned reference around.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl PartialEq for SecretString {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretString(****)")
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

/// Where a secret comes from.
///
/// In JSON: `{"type": "plain", "value": "..."}` or
/// `{"type": "environment", "value": "ENV_VAR_NAME"}`.
#[derive(Debug, Clone, Serialize, Deserialize, ZeroizeOnDrop)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SecretValue {
	Plain(SecretString),
	Environment(String),
}

impl SecretValue {
	/// Produces the secret itself, reading the environment for `Environment`.
	pub fn resolve(&self) -> Result<SecretString, ConfigError> {
		match self {
			SecretValue::Plain(secret) => Ok(secret.clone()),
			SecretValue::Environment(var) => env::var(var).map(SecretString::new).map_err(|e| {
				ConfigError::validation_error(
					format!("environment variable {} is not set", var),
					Some(Box::new(e)),
					Some(HashMap::from([("variable".to_string(), var.clone())])),
				)
			}),
		}
	}
}

impl PartialEq for SecretValue {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Plain(l), Self::Plain(r)) => l == r,
			(Self::Environment(l), Self::Environment(r)) => l == r,
			_ => false,
		}
	}
}

impl Zeroize for SecretValue {
	fn zeroize(&mut self) {
		match self {
			SecretValue::Plain(secret) => secret.zeroize(),
			SecretValue::Environment(var) => var.zeroize(),
		}
	}
}
