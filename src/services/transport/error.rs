//! Raw transaction feed error types.

use crate::utils::logging::error::{ErrorContext, ErrorSource, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

#[derive(ThisError, Debug)]
pub enum TransportError {
	/// The initial subscription could not be established
	#[error("Subscription failed: {0}")]
	SubscriptionFailed(ErrorContext),

	/// A message could not be received from an established subscription
	#[error("Stream error: {0}")]
	StreamError(ErrorContext),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl TransportError {
	pub fn subscription_failed(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::SubscriptionFailed(ErrorContext::new_with_log(msg, source, metadata))
	}

	pub fn stream_error(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::StreamError(ErrorContext::new_with_log(msg, source, metadata))
	}
}

impl TraceableError for TransportError {
	fn trace_id(&self) -> String {
		match self {
			Self::SubscriptionFailed(ctx) | Self::StreamError(ctx) => ctx.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
