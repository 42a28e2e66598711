//! Webhook notification implementation.
//!
//! Posts JSON notifications to the webhook targets of a user. Requests carrying
//! a secret are signed with HMAC-SHA256 over the serialized body followed by
//! the millisecond timestamp sent alongside it.

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest_middleware::ClientWithMiddleware;
use sha2::Sha256;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, instrument};

use crate::{
	models::WebhookTarget,
	services::notification::NotificationError,
	utils::constants::{WEBHOOK_SIGNATURE_HEADER, WEBHOOK_TIMESTAMP_HEADER},
};

/// HMAC SHA256 type alias
type HmacSha256 = Hmac<Sha256>;

/// Sends JSON notifications to webhook targets
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
	/// Configured HTTP client for webhook requests with retry capabilities
	client: Arc<ClientWithMiddleware>,
}

/// Signs `payload` with `secret`.
///
/// Returns the hex-encoded signature and the timestamp that was signed.
pub fn sign_payload(
	secret: &str,
	payload: &serde_json::Value,
) -> Result<(String, String), NotificationError> {
	let timestamp = Utc::now().timestamp_millis().to_string();
	let signature = sign_payload_at(secret, payload, &timestamp)?;
	Ok((signature, timestamp))
}

/// Signature of `payload` for a given timestamp
pub fn sign_payload_at(
	secret: &str,
	payload: &serde_json::Value,
	timestamp: &str,
) -> Result<String, NotificationError> {
	// `new_from_slice` accepts empty keys
	if secret.is_empty() {
		return Err(NotificationError::notify_failed(
			"Invalid secret: cannot be empty.",
			None,
			None,
		));
	}

	let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
		NotificationError::config_error(format!("Invalid secret: {}", e), None, None)
	})?;

	let serialized_payload = serde_json::to_string(payload).map_err(|e| {
		NotificationError::internal_error(
			format!("Failed to serialize payload: {}", e),
			Some(e.into()),
			None,
		)
	})?;
	mac.update(format!("{}{}", serialized_payload, timestamp).as_bytes());

	Ok(hex::encode(mac.finalize().into_bytes()))
}

impl WebhookNotifier {
	pub fn new(client: Arc<ClientWithMiddleware>) -> Self {
		Self { client }
	}

	/// Posts `payload` to `target`
	#[instrument(skip_all, fields(url = %target.url))]
	pub async fn notify_json(
		&self,
		target: &WebhookTarget,
		payload: &serde_json::Value,
	) -> Result<(), NotificationError> {
		let metadata = || HashMap::from([("url".to_string(), target.url.clone())]);

		let url = url::Url::parse(&target.url).map_err(|e| {
			NotificationError::config_error(
				"Invalid webhook URL",
				Some(e.into()),
				Some(metadata()),
			)
		})?;

		let mut headers = HeaderMap::new();
		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		if let Some(secret) = &target.secret {
			let secret = secret.resolve().map_err(|e| {
				NotificationError::config_error(
					"Failed to resolve webhook secret",
					Some(e.into()),
					Some(metadata()),
				)
			})?;
			let (signature, timestamp) = sign_payload(secret.as_str(), payload)?;

			headers.insert(
				HeaderName::from_static("x-signature"),
				HeaderValue::from_str(&signature).map_err(|e| {
					NotificationError::notify_failed(
						format!("Invalid {} value", WEBHOOK_SIGNATURE_HEADER),
						Some(e.into()),
						Some(metadata()),
					)
				})?,
			);
			headers.insert(
				HeaderName::from_static("x-timestamp"),
				HeaderValue::from_str(&timestamp).map_err(|e| {
					NotificationError::notify_failed(
						format!("Invalid {} value", WEBHOOK_TIMESTAMP_HEADER),
						Some(e.into()),
						Some(metadata()),
					)
				})?,
			);
		}

		let response = self
			.client
			.post(url)
			.headers(headers)
			.json(payload)
			.send()
			.await
			.map_err(|e| {
				NotificationError::network_error(
					format!("Failed to send webhook request: {}", e),
					Some(e.into()),
					Some(metadata()),
				)
			})?;

		let status = response.status();
		if !status.is_success() {
			return Err(NotificationError::notify_failed(
				format!("Webhook request failed with status: {}", status),
				None,
				Some(metadata()),
			));
		}

		debug!(status = %status, "Webhook delivered");
		Ok(())
	}
}
