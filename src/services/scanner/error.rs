//! UTXO scanner error types.

use crate::utils::logging::error::{ErrorContext, ErrorSource, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

#[derive(ThisError, Debug)]
pub enum ScannerError {
	/// The blockchain data client failed to list unspent outputs
	#[error("Query failed: {0}")]
	QueryFailed(ErrorContext),

	/// The scan worker has stopped and no longer accepts requests
	#[error("Queue closed: {0}")]
	QueueClosed(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl ScannerError {
	pub fn query_failed(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::QueryFailed(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn queue_closed(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::QueueClosed(ErrorContext::new_with_log(msg, source, metadata))
	}

	/// Scripthash the failure refers to, when known
	pub fn scripthash(&self) -> Option<&str> {
		match self {
			Self::QueryFailed(ctx) | Self::QueueClosed(ctx) => ctx
				.metadata
				.as_ref()
				.and_then(|m| m.get("scripthash"))
				.map(String::as_str),
			Self::Other(_) => None,
		}
	}
}

impl TraceableError for ScannerError {
	fn trace_id(&self) -> String {
		match self {
			Self::QueryFailed(ctx) | Self::QueueClosed(ctx) => ctx.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
