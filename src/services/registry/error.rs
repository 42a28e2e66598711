//! Address registry error types.

use crate::{
	repositories::RepositoryError,
	services::derivation::DerivationError,
	utils::logging::error::{ErrorContext, ErrorSource, TraceableError},
};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

#[derive(ThisError, Debug)]
pub enum RegistryError {
	/// The address string does not parse or belongs to another network
	#[error("Invalid address: {0}")]
	InvalidAddress(ErrorContext),

	/// The extended key was rejected by the key deriver
	#[error("Invalid extended key: {0}")]
	InvalidExtendedKey(ErrorContext),

	/// The user already watches this address
	#[error("Duplicate address: {0}")]
	DuplicateAddress(ErrorContext),

	/// No address or key with this id is owned by the user
	#[error("Not found: {0}")]
	NotFound(ErrorContext),

	#[error("Persistence error: {0}")]
	PersistenceError(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl RegistryError {
	pub fn invalid_address(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::InvalidAddress(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn invalid_extended_key(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::InvalidExtendedKey(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn duplicate_address(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::DuplicateAddress(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn not_found(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::NotFound(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn persistence_error(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::PersistenceError(ErrorContext::new_with_log(msg, source, metadata))
	}
}

impl From<RepositoryError> for RegistryError {
	fn from(error: RepositoryError) -> Self {
		Self::persistence_error("Address repository operation failed", Some(Box::new(error)), None)
	}
}

impl From<DerivationError> for RegistryError {
	fn from(error: DerivationError) -> Self {
		Self::invalid_extended_key("Extended key rejected", Some(Box::new(error)), None)
	}
}

impl TraceableError for RegistryError {
	fn trace_id(&self) -> String {
		match self {
			Self::InvalidAddress(ctx)
			| Self::InvalidExtendedKey(ctx)
			| Self::DuplicateAddress(ctx)
			| Self::NotFound(ctx)
			| Self::PersistenceError(ctx) => ctx.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
