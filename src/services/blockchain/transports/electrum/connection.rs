//! Electrum protocol connection.
//!
//! Newline-delimited JSON-RPC over a single TCP (or TLS) stream. Requests are
//! multiplexed by id; a reader task routes each response to the request that
//! is waiting for it.

use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};

use serde_json::{json, Value};
use tokio::{
	io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, WriteHalf},
	net::TcpStream,
	sync::{oneshot, Mutex},
	task::JoinHandle,
};
use tokio_native_tls::native_tls;
use tracing::{debug, info, instrument, warn};

use crate::{
	models::ElectrumConfig,
	services::blockchain::{error::BlockChainError, transports::BlockchainTransport},
	utils::constants::{ELECTRUM_CLIENT_NAME, ELECTRUM_PROTOCOL_VERSION},
};

type PendingRequests = HashMap<u64, oneshot::Sender<Result<Value, BlockChainError>>>;

trait ElectrumStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> ElectrumStream for T {}

/// A live connection to an Electrum server
pub struct ElectrumConnection {
	server: String,
	writer: Mutex<WriteHalf<Box<dyn ElectrumStream>>>,
	pending: Arc<Mutex<PendingRequests>>,
	closed: Arc<AtomicBool>,
	next_id: AtomicU64,
	request_timeout: Duration,
	reader: JoinHandle<()>,
}

impl ElectrumConnection {
	/// Connects to the configured server and negotiates the protocol version
	///
	/// TLS certificates are not verified; Electrum servers commonly use
	/// self-signed certificates.
	#[instrument(skip_all, fields(host = %config.host, port = config.port, ssl = config.ssl))]
	pub async fn connect(config: &ElectrumConfig) -> Result<Self, BlockChainError> {
		let server = format!("{}:{}", config.host, config.port);
		let metadata = || Some(HashMap::from([("server".to_string(), server.clone())]));

		let tcp = TcpStream::connect(&server).await.map_err(|e| {
			BlockChainError::connection_error(
				"Failed to connect to Electrum server",
				Some(Box::new(e)),
				metadata(),
			)
		})?;

		let stream: Box<dyn ElectrumStream> = if config.ssl {
			let connector = native_tls::TlsConnector::builder()
				.danger_accept_invalid_certs(true)
				.danger_accept_invalid_hostnames(true)
				.build()
				.map_err(|e| {
					BlockChainError::connection_error(
						"Failed to build TLS connector",
						Some(Box::new(e)),
						metadata(),
					)
				})?;
			let tls = tokio_native_tls::TlsConnector::from(connector)
				.connect(&config.host, tcp)
				.await
				.map_err(|e| {
					BlockChainError::connection_error(
						"TLS handshake with Electrum server failed",
						Some(Box::new(e)),
						metadata(),
					)
				})?;
			Box::new(tls)
		} else {
			Box::new(tcp)
		};

		let connection = Self::from_stream(stream, server, config.request_timeout);
		connection.negotiate().await?;
		Ok(connection)
	}

	/// Wraps an already established stream. Must be called inside a tokio runtime.
	pub fn from_stream<S>(stream: S, server: impl Into<String>, request_timeout: Duration) -> Self
	where
		S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	{
		let server = server.into();
		let stream: Box<dyn ElectrumStream> = Box::new(stream);
		let (read_half, write_half) = tokio::io::split(stream);

		let pending = Arc::new(Mutex::new(PendingRequests::new()));
		let closed = Arc::new(AtomicBool::new(false));
		let reader = tokio::spawn(read_responses(
			BufReader::new(read_half),
			pending.clone(),
			closed.clone(),
			server.clone(),
		));

		Self {
			server,
			writer: Mutex::new(write_half),
			pending,
			closed,
			next_id: AtomicU64::new(0),
			request_timeout,
			reader,
		}
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	async fn negotiate(&self) -> Result<(), BlockChainError> {
		let version = self
			.send_raw_request(
				"server.version",
				json!([ELECTRUM_CLIENT_NAME, ELECTRUM_PROTOCOL_VERSION]),
			)
			.await?;
		info!(server = %self.server, version = %version, "Connected to Electrum server");
		Ok(())
	}

	fn metadata(&self, method: &str, id: u64) -> Option<HashMap<String, String>> {
		Some(HashMap::from([
			("server".to_string(), self.server.clone()),
			("method".to_string(), method.to_string()),
			("id".to_string(), id.to_string()),
		]))
	}
}

impl Drop for ElectrumConnection {
	fn drop(&mut self) {
		self.reader.abort();
	}
}

#[async_trait::async_trait]
impl BlockchainTransport for ElectrumConnection {
	fn server(&self) -> String {
		self.server.clone()
	}

	async fn send_raw_request(
		&self,
		method: &str,
		params: Value,
	) -> Result<Value, BlockChainError> {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		if self.is_closed() {
			return Err(BlockChainError::connection_error(
				"Electrum connection is closed",
				None,
				self.metadata(method, id),
			));
		}

		let mut line = serde_json::to_vec(&self.customize_request(id, method, params))
			.map_err(|e| {
				BlockChainError::internal_error(
					"Failed to encode request",
					Some(Box::new(e)),
					self.metadata(method, id),
				)
			})?;
		line.push(b'\n');

		let (sender, receiver) = oneshot::channel();
		self.pending.lock().await.insert(id, sender);

		let written = {
			let mut writer = self.writer.lock().await;
			match writer.write_all(&line).await {
				Ok(()) => writer.flush().await,
				Err(e) => Err(e),
			}
		};
		if let Err(e) = written {
			self.pending.lock().await.remove(&id);
			return Err(BlockChainError::connection_error(
				"Failed to send request to Electrum server",
				Some(Box::new(e)),
				self.metadata(method, id),
			));
		}

		match tokio::time::timeout(self.request_timeout, receiver).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(BlockChainError::connection_error(
				"Electrum connection closed before a response arrived",
				None,
				self.metadata(method, id),
			)),
			Err(_) => {
				self.pending.lock().await.remove(&id);
				Err(BlockChainError::timeout(
					format!("No response within {:?}", self.request_timeout),
					None,
					self.metadata(method, id),
				))
			}
		}
	}
}

async fn read_responses<R>(
	reader: BufReader<R>,
	pending: Arc<Mutex<PendingRequests>>,
	closed: Arc<AtomicBool>,
	server: String,
) where
	R: AsyncRead + Unpin,
{
	let mut lines = reader.lines();
	loop {
		match lines.next_line().await {
			Ok(Some(line)) => route_response(&line, &pending).await,
			Ok(None) => {
				info!(server = %server, "Electrum server closed the connection");
				break;
			}
			Err(e) => {
				warn!(server = %server, error = %e, "Failed to read from Electrum server");
				break;
			}
		}
	}

	closed.store(true, Ordering::SeqCst);
	let mut pending = pending.lock().await;
	for (id, sender) in pending.drain() {
		let _ = sender.send(Err(BlockChainError::connection_error(
			"Electrum connection closed",
			None,
			Some(HashMap::from([
				("server".to_string(), server.clone()),
				("id".to_string(), id.to_string()),
			])),
		)));
	}
}

async fn route_response(line: &str, pending: &Mutex<PendingRequests>) {
	let line = line.trim();
	if line.is_empty() {
		return;
	}

	let response: Value = match serde_json::from_str(line) {
		Ok(value) => value,
		Err(e) => {
			warn!(error = %e, "Discarding undecodable Electrum response");
			return;
		}
	};

	let Some(id) = response.get("id").and_then(Value::as_u64) else {
		// subscription notifications carry no id
		let method = response
			.get("method")
			.and_then(|m| m.as_str())
			.unwrap_or_default();
		debug!(method, "Ignoring Electrum notification");
		return;
	};

	let Some(sender) = pending.lock().await.remove(&id) else {
		debug!(id, "No pending request for Electrum response");
		return;
	};

	let result = match response.get("error") {
		Some(error) if !error.is_null() => {
			let message = error
				.get("message")
				.and_then(Value::as_str)
				.map(str::to_string)
				.unwrap_or_else(|| error.to_string());
			Err(BlockChainError::request_error(
				message,
				None,
				Some(HashMap::from([("id".to_string(), id.to_string())])),
			))
		}
		_ => Ok(response.get("result").cloned().unwrap_or(Value::Null)),
	};
	let _ = sender.send(result);
}
