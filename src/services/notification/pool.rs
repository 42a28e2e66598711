//! Shared HTTP and SMTP clients for notification delivery.

use lettre::{transport::smtp::authentication::Credentials, AsyncSmtpTransport, Tokio1Executor};
use reqwest::Client as ReqwestClient;
use reqwest_middleware::ClientWithMiddleware;
use std::{sync::Arc, time::Duration};
use thiserror::Error;

use crate::{
	models::SmtpConfig,
	utils::{client_storage::ClientStorage, create_retryable_http_client, RetryConfig},
};

/// Port of SMTP servers expecting TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Error)]
pub enum NotificationPoolError {
	#[error("Failed to create HTTP client: {0}")]
	HttpClientBuildError(String),

	#[error("Failed to create SMTP client: {0}")]
	SmtpClientBuildError(String),
}

/// Notification client pool that manages HTTP and SMTP clients.
///
/// Clients are keyed by the configuration they were built from, so deliveries
/// sharing a retry policy or a mail server reuse the same connections.
#[derive(Default)]
pub struct NotificationClientPool {
	http_clients: ClientStorage<ClientWithMiddleware>,
	smtp_clients: ClientStorage<AsyncSmtpTransport<Tokio1Executor>>,
}

impl NotificationClientPool {
	pub fn new() -> Self {
		Self::default()
	}

	/// Get or create an HTTP client with retry capabilities.
	pub async fn get_or_create_http_client(
		&self,
		retry_policy: &RetryConfig,
	) -> Result<Arc<ClientWithMiddleware>, NotificationPoolError> {
		let key = format!("{:?}", retry_policy);
		self.http_clients
			.get_or_create(&key, || {
				let base_client = ReqwestClient::builder()
					.pool_max_idle_per_host(10)
					.pool_idle_timeout(Some(Duration::from_secs(90)))
					.connect_timeout(Duration::from_secs(10))
					.build()
					.map_err(|e| NotificationPoolError::HttpClientBuildError(e.to_string()))?;

				Ok(create_retryable_http_client(retry_policy, base_client))
			})
			.await
	}

	/// Get or create an SMTP client for `smtp_config`.
	///
	/// Port 465 uses implicit TLS, any other port STARTTLS. Credentials are only
	/// sent when both user and password are configured.
	pub async fn get_or_create_smtp_client(
		&self,
		smtp_config: &SmtpConfig,
	) -> Result<Arc<AsyncSmtpTransport<Tokio1Executor>>, NotificationPoolError> {
		let key = format!(
			"{}:{}:{}",
			smtp_config.host,
			smtp_config.port,
			smtp_config.username.as_deref().unwrap_or_default()
		);

		self.smtp_clients
			.get_or_create(&key, || {
				let builder = if smtp_config.port == IMPLICIT_TLS_PORT {
					AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp_config.host)
				} else {
					AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_config.host)
				}
				.map_err(|e| NotificationPoolError::SmtpClientBuildError(e.to_string()))?
				.port(smtp_config.port);

				let builder = match (&smtp_config.username, &smtp_config.password) {
					(Some(username), Some(password)) => builder.credentials(Credentials::new(
						username.clone(),
						password.as_str().to_string(),
					)),
					_ => builder,
				};

				Ok(builder.build())
			})
			.await
	}

	/// Get the number of active HTTP clients in the pool
	pub async fn get_active_http_client_count(&self) -> usize {
		self.http_clients.len().await
	}

	/// Get the number of active SMTP clients in the pool
	pub async fn get_active_smtp_client_count(&self) -> usize {
		self.smtp_clients.len().await
	}
}
