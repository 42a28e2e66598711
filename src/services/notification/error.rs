//! Notification error types.
//!
//! Covers building and delivering emails and webhook requests.

use crate::utils::logging::error::{ErrorContext, ErrorSource, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;

/// Represents errors that can occur during notification delivery
#[derive(ThisError, Debug)]
pub enum NotificationError {
	/// The destination could not be reached
	#[error("Network error: {0}")]
	NetworkError(Box<ErrorContext>),

	/// A destination or the mail server is misconfigured
	#[error("Config error: {0}")]
	ConfigError(Box<ErrorContext>),

	#[error("Internal error: {0}")]
	InternalError(Box<ErrorContext>),

	/// A delivery client could not be created
	#[error("Execution error: {0}")]
	ExecutionError(Box<ErrorContext>),

	/// The destination rejected the message or the message could not be built
	#[error("Notification failed: {0}")]
	NotifyFailed(Box<ErrorContext>),
}

impl NotificationError {
	pub fn network_error(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::NetworkError(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}

	pub fn config_error(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ConfigError(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}

	pub fn internal_error(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::InternalError(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}

	pub fn execution_error(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ExecutionError(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}

	pub fn notify_failed(
		msg: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::NotifyFailed(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}
}

impl TraceableError for NotificationError {
	fn trace_id(&self) -> String {
		match self {
			Self::NetworkError(ctx)
			| Self::ConfigError(ctx)
			| Self::InternalError(ctx)
			| Self::ExecutionError(ctx)
			| Self::NotifyFailed(ctx) => ctx.trace_id.clone(),
		}
	}
}
