//! Key derivation error types.

use crate::utils::logging::error::{ErrorContext, ErrorSource, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;

/// Failures while expanding an extended public key into addresses
#[derive(ThisError, Debug)]
pub enum DerivationError {
	/// The key is not valid base58check or has the wrong length
	#[error("Invalid key: {0}")]
	InvalidKey(ErrorContext),

	/// The version prefix is unknown or belongs to another network
	#[error("Unsupported key version: {0}")]
	UnsupportedKeyVersion(ErrorContext),

	/// The key carries private key material
	#[error("Private key rejected: {0}")]
	PrivateKeyRejected(ErrorContext),

	/// Child key derivation failed
	#[error("Derivation error: {0}")]
	DerivationFailed(ErrorContext),
}

impl DerivationError {
	// Key material is never logged, only a prefix of it in the metadata.
	pub fn invalid_key(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::InvalidKey(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn unsupported_key_version(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::UnsupportedKeyVersion(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn private_key_rejected(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::PrivateKeyRejected(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn derivation_failed(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::DerivationFailed(ErrorContext::new_with_log(msg, source, metadata))
	}
}

impl TraceableError for DerivationError {
	fn trace_id(&self) -> String {
		match self {
			Self::InvalidKey(ctx)
			| Self::UnsupportedKeyVersion(ctx)
			| Self::PrivateKeyRejected(ctx)
			| Self::DerivationFailed(ctx) => ctx.trace_id.clone(),
		}
	}
}
