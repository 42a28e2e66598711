//! Transaction monitor error types.

use crate::utils::logging::error::{ErrorContext, ErrorSource, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

#[derive(ThisError, Debug)]
pub enum MonitorError {
	/// The payload is not a serialized transaction
	#[error("Decode error: {0}")]
	DecodeError(ErrorContext),

	/// The confirmation count of a matched transaction could not be fetched
	#[error("Confirmation lookup failed: {0}")]
	ConfirmationLookupFailed(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl MonitorError {
	pub fn decode_error(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::DecodeError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn confirmation_lookup_failed(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ConfirmationLookupFailed(ErrorContext::new_with_log(msg, source, metadata))
	}

	/// Transaction id recorded in the error metadata
	pub fn txid(&self) -> Option<&str> {
		match self {
			Self::DecodeError(ctx) | Self::ConfirmationLookupFailed(ctx) => ctx
				.metadata
				.as_ref()
				.and_then(|m| m.get("txid"))
				.map(String::as_str),
			Self::Other(_) => None,
		}
	}
}

impl TraceableError for MonitorError {
	fn trace_id(&self) -> String {
		match self {
			Self::DecodeError(ctx) | Self::ConfirmationLookupFailed(ctx) => ctx.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
