//! Blockchain data client error types.
//!
//! Covers the Electrum connection itself (connect, TLS, socket I/O), malformed
//! or failed JSON-RPC exchanges and request timeouts.

use crate::utils::logging::error::{ErrorContext, ErrorSource, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

#[derive(ThisError, Debug)]
pub enum BlockChainError {
	/// The server could not be reached or the connection dropped
	#[error("Connection error: {0}")]
	ConnectionError(ErrorContext),

	/// The server answered with a JSON-RPC error
	#[error("Request error: {0}")]
	RequestError(ErrorContext),

	/// The server answer could not be decoded
	#[error("Response error: {0}")]
	ResponseError(ErrorContext),

	/// No answer arrived in time
	#[error("Timeout: {0}")]
	Timeout(ErrorContext),

	#[error("Internal error: {0}")]
	InternalError(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl BlockChainError {
	pub fn connection_error(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ConnectionError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn request_error(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::RequestError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn response_error(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ResponseError(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn timeout(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::Timeout(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn internal_error(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::InternalError(ErrorContext::new_with_log(msg, source, metadata))
	}
}

impl TraceableError for BlockChainError {
	fn trace_id(&self) -> String {
		match self {
			Self::ConnectionError(ctx)
			| Self::RequestError(ctx)
			| Self::ResponseError(ctx)
			| Self::Timeout(ctx)
			| Self::InternalError(ctx) => ctx.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
