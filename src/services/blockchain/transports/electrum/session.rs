//! Electrum transport that survives server disconnects.
//!
//! Holds the active [`ElectrumConnection`] and replaces it once its reader has
//! seen the stream close. Reconnection attempts back off exponentially; when
//! they are exhausted the request fails and the next request starts over.

use std::{
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};

use backon::{BackoffBuilder, ExponentialBuilder, Retryable};
use serde_json::{json, Value};
use tokio::{
	sync::{watch, Mutex, RwLock},
	task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
	models::ElectrumConfig,
	services::blockchain::{
		error::BlockChainError,
		transports::{BlockchainTransport, ElectrumConnection},
	},
	utils::{JitterSetting, RetryConfig},
};

/// Reconnecting transport to a single Electrum server
pub struct ElectrumTransport {
	config: ElectrumConfig,
	retry_policy: RetryConfig,
	active: RwLock<Arc<ElectrumConnection>>,
	reconnect_lock: Mutex<()>,
	reconnects: AtomicU64,
}

impl ElectrumTransport {
	/// Opens the first connection. Fails if the server cannot be reached.
	pub async fn connect(
		config: &ElectrumConfig,
		retry_policy: RetryConfig,
	) -> Result<Self, BlockChainError> {
		let connection = ElectrumConnection::connect(config).await?;
		Ok(Self {
			config: config.clone(),
			retry_policy,
			active: RwLock::new(Arc::new(connection)),
			reconnect_lock: Mutex::new(()),
			reconnects: AtomicU64::new(0),
		})
	}

	/// Number of times the connection has been replaced
	pub fn reconnects(&self) -> u64 {
		self.reconnects.load(Ordering::SeqCst)
	}

	/// Returns a live connection, reconnecting if the current one is closed
	async fn connection(&self) -> Result<Arc<ElectrumConnection>, BlockChainError> {
		let current = self.active.read().await.clone();
		if !current.is_closed() {
			return Ok(current);
		}

		let _guard = self.reconnect_lock.lock().await;
		let current = self.active.read().await.clone();
		if !current.is_closed() {
			return Ok(current);
		}

		warn!(server = %self.server(), "Electrum connection lost, reconnecting");

		let backoff = ExponentialBuilder::default()
			.with_min_delay(self.retry_policy.initial_backoff)
			.with_max_delay(self.retry_policy.max_backoff);
		let backoff_with_jitter = match self.retry_policy.jitter {
			JitterSetting::Full => backoff.with_jitter(),
			JitterSetting::None => backoff,
		};

		let connection = (|| ElectrumConnection::connect(&self.config))
			.retry(
				backoff_with_jitter
					.build()
					.take(self.retry_policy.max_retries as usize),
			)
			.notify(|e: &BlockChainError, delay: Duration| {
				debug!(error = %e, ?delay, "Electrum reconnect attempt failed");
			})
			.await?;

		let connection = Arc::new(connection);
		*self.active.write().await = connection.clone();
		self.reconnects.fetch_add(1, Ordering::SeqCst);
		info!(server = %self.server(), "Reconnected to Electrum server");

		Ok(connection)
	}

	pub async fn ping(&self) -> Result<(), BlockChainError> {
		self.send_raw_request("server.ping", json!([])).await?;
		Ok(())
	}

	/// Pings the server every `interval` until `shutdown` fires.
	///
	/// An idle service notices a lost connection here first.
	pub fn spawn_keep_alive(
		self: Arc<Self>,
		interval: Duration,
		mut shutdown: watch::Receiver<bool>,
	) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			// the first tick completes immediately
			ticker.tick().await;
			loop {
				tokio::select! {
					_ = ticker.tick() => {
						if let Err(e) = self.ping().await {
							warn!(server = %self.server(), error = %e, "Electrum keep-alive ping failed");
						}
					}
					_ = shutdown.changed() => {
						debug!(server = %self.server(), "Stopping Electrum keep-alive");
						break;
					}
				}
			}
		})
	}
}

#[async_trait::async_trait]
impl BlockchainTransport for ElectrumTransport {
	fn server(&self) -> String {
		format!("{}:{}", self.config.host, self.config.port)
	}

	async fn send_raw_request(
		&self,
		method: &str,
		params: Value,
	) -> Result<Value, BlockChainError> {
		self.connection()
			.await?
			.send_raw_request(method, params)
			.await
	}
}
