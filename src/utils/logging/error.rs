//! Structured error context shared by every subsystem error type.
//!
//! Each error enum in the crate wraps an [`ErrorContext`] so that a failure
//! carries its message, the underlying cause, key/value metadata (for example the
//! scripthash or txid involved), a timestamp and a trace id that survives wrapping.

use chrono::Utc;
use std::{collections::HashMap, fmt};
use uuid::Uuid;

/// Boxed cause accepted by every error constructor.
pub type ErrorSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message, cause and metadata of a failure, stamped with time and trace id.
///
/// When the source chain already contains a traceable error, its trace id is
/// reused so a single failure can be followed through the logs.
#[derive(Debug)]
pub struct ErrorContext {
	pub message: String,
	pub source: Option<ErrorSource>,
	pub metadata: Option<HashMap<String, String>>,
	/// RFC 3339 timestamp of creation
	pub timestamp: String,
	/// UUID v4, inherited from the source chain when available
	pub trace_id: String,
}

impl ErrorContext {
	pub fn new(
		message: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let trace_id = match source.as_ref() {
			Some(src) => TraceableError::trace_id(src.as_ref()),
			None => Uuid::new_v4().to_string(),
		};

		Self {
			message: message.into(),
			source,
			metadata,
			timestamp: Utc::now().to_rfc3339(),
			trace_id,
		}
	}

	/// Same as [`ErrorContext::new`], and emits the error through `tracing`.
	pub fn new_with_log(
		message: impl Into<String>,
		source: Option<ErrorSource>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let context = Self::new(message, source, metadata);
		log_error(&context);
		context
	}

	pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.metadata
			.get_or_insert_with(HashMap::new)
			.insert(key.into(), value.into());
		self
	}

	/// Renders `"message [k1=v1, k2=v2]"` with keys in sorted order.
	pub fn format_with_metadata(&self) -> String {
		let Some(metadata) = self.metadata.as_ref().filter(|m| !m.is_empty()) else {
			return self.message.clone();
		};

		let mut pairs: Vec<_> = metadata.iter().collect();
		pairs.sort_by(|a, b| a.0.cmp(b.0));
		let rendered: Vec<String> = pairs
			.into_iter()
			.map(|(key, value)| format!("{}={}", key, value))
			.collect();

		format!("{} [{}]", self.message, rendered.join(", "))
	}
}

impl fmt::Display for ErrorContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.format_with_metadata())
	}
}

impl std::error::Error for ErrorContext {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.source
			.as_ref()
			.map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
	}
}

/// Errors that expose the trace id of their context.
pub trait TraceableError: std::error::Error + Send + Sync {
	fn trace_id(&self) -> String;
}

impl TraceableError for dyn std::error::Error + Send + Sync + 'static {
	fn trace_id(&self) -> String {
		const MAX_DEPTH: usize = 4;

		let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
		let mut depth = 0;
		while let Some(err) = current {
			if depth > MAX_DEPTH {
				break;
			}
			if let Some(id) = try_extract_trace_id(err) {
				return id;
			}
			current = err.source();
			depth += 1;
		}

		Uuid::new_v4().to_string()
	}
}

fn try_extract_trace_id(err: &(dyn std::error::Error + 'static)) -> Option<String> {
	if let Some(ctx) = err.downcast_ref::<ErrorContext>() {
		return Some(ctx.trace_id.clone());
	}

	macro_rules! try_downcast {
		($($ty:path),*) => {
			$(
				if let Some(e) = err.downcast_ref::<$ty>() {
					return Some(e.trace_id());
				}
			)*
		}
	}

	try_downcast!(
		crate::services::derivation::DerivationError,
		crate::services::scanner::ScannerError,
		crate::services::registry::RegistryError,
		crate::services::monitor::MonitorError,
		crate::services::transport::TransportError,
		crate::services::blockchain::BlockChainError,
		crate::services::notification::NotificationError,
		crate::repositories::RepositoryError,
		crate::models::ConfigError
	);

	None
}

/// Cuts off HTML bodies that some upstream servers put in error messages.
fn sanitize_error_message(message: &str) -> String {
	if message.contains("<html>") || message.contains("<head>") || message.contains("<body>") {
		if let Some(pos) = message.find('<') {
			return message[..pos].trim().to_string();
		}
	}
	message.to_string()
}

fn format_error_chain(err: &dyn std::error::Error) -> String {
	let mut result = sanitize_error_message(&err.to_string());
	let mut source = err.source();

	while let Some(err) = source {
		result.push_str("\n\tCaused by: ");
		result.push_str(&sanitize_error_message(&err.to_string()));
		source = err.source();
	}

	result
}

fn log_error(error: &ErrorContext) {
	match &error.source {
		Some(err) => tracing::error!(
			message = error.format_with_metadata(),
			trace_id = %error.trace_id,
			timestamp = %error.timestamp,
			error.chain = %format_error_chain(&**err),
			"Error occurred"
		),
		None => tracing::error!(
			message = error.format_with_metadata(),
			trace_id = %error.trace_id,
			timestamp = %error.timestamp,
			"Error occurred"
		),
	}
}
