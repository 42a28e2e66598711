//! Scan queue and worker.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::{
	sync::{
		mpsc::{self, error::TrySendError},
		watch,
	},
	task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};

use crate::{
	models::{ScanRequest, UtxoResult},
	services::{blockchain::BlockchainDataClient, scanner::error::ScannerError},
	utils::metrics::{UTXO_SCANS_COMPLETED, UTXO_SCANS_DROPPED, UTXO_SCANS_FAILED},
};

/// Outcome of one scan, in the order the worker completed them
pub type ScanResult = Result<UtxoResult, ScannerError>;

/// Accepts scripthashes whose unspent outputs should be refreshed.
///
/// Duplicate requests are not coalesced.
#[async_trait]
pub trait ScanQueue: Send + Sync {
	/// Queues a scan without waiting. Returns false when the request was dropped.
	fn enqueue_scan(&self, scripthash: &str) -> bool;

	/// Queues a scan, waiting for room in the queue
	async fn enqueue_scan_wait(&self, scripthash: &str) -> Result<(), ScannerError>;
}

/// Handle to the running scan worker
#[derive(Clone)]
pub struct UtxoScanner {
	requests: mpsc::Sender<ScanRequest>,
	capacity: usize,
}

impl UtxoScanner {
	/// Starts the scan worker.
	///
	/// Returns the queue handle, the result stream and the worker task. The
	/// worker stops on shutdown, or once every queue handle is dropped.
	pub fn start<C>(
		client: Arc<C>,
		capacity: usize,
		shutdown: watch::Receiver<bool>,
	) -> (Self, mpsc::UnboundedReceiver<ScanResult>, JoinHandle<()>)
	where
		C: BlockchainDataClient + ?Sized + 'static,
	{
		let capacity = capacity.max(1);
		let (request_tx, request_rx) = mpsc::channel(capacity);
		let (result_tx, result_rx) = mpsc::unbounded_channel();

		let handle = tokio::spawn(run_worker(client, request_rx, result_tx, shutdown));
		info!(capacity, "UTXO scanner started");

		(
			Self {
				requests: request_tx,
				capacity,
			},
			result_rx,
			handle,
		)
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Requests currently waiting in the queue
	pub fn pending(&self) -> usize {
		self.capacity - self.requests.capacity()
	}
}

#[async_trait]
impl ScanQueue for UtxoScanner {
	fn enqueue_scan(&self, scripthash: &str) -> bool {
		match self.requests.try_send(ScanRequest::new(scripthash)) {
			Ok(()) => true,
			Err(TrySendError::Full(_)) => {
				UTXO_SCANS_DROPPED.inc();
				warn!(
					scripthash,
					capacity = self.capacity,
					"Scan queue is full, dropping scan request"
				);
				false
			}
			Err(TrySendError::Closed(_)) => {
				warn!(scripthash, "Scan worker has stopped, dropping scan request");
				false
			}
		}
	}

	async fn enqueue_scan_wait(&self, scripthash: &str) -> Result<(), ScannerError> {
		self.requests
			.send(ScanRequest::new(scripthash))
			.await
			.map_err(|_| {
				ScannerError::queue_closed(
					"Scan worker has stopped",
					None,
					Some(HashMap::from([(
						"scripthash".to_string(),
						scripthash.to_string(),
					)])),
				)
			})
	}
}

async fn run_worker<C>(
	client: Arc<C>,
	mut requests: mpsc::Receiver<ScanRequest>,
	results: mpsc::UnboundedSender<ScanResult>,
	mut shutdown: watch::Receiver<bool>,
) where
	C: BlockchainDataClient + ?Sized,
{
	if *shutdown.borrow() {
		return;
	}

	loop {
		let request = tokio::select! {
			request = requests.recv() => match request {
				Some(request) => request,
				None => {
					debug!("All scan queue handles dropped");
					break;
				}
			},
			_ = shutdown.changed() => break,
		};

		let result = tokio::select! {
			result = scan(client.as_ref(), &request) => result,
			_ = shutdown.changed() => break,
		};

		if results.send(result).is_err() {
			debug!("Scan result receiver dropped");
			break;
		}
	}

	info!("UTXO scanner stopped");
}

#[instrument(skip_all, fields(scripthash = %request.scripthash))]
async fn scan<C>(client: &C, request: &ScanRequest) -> ScanResult
where
	C: BlockchainDataClient + ?Sized,
{
	match client.list_unspent(&request.scripthash).await {
		Ok(utxos) => {
			UTXO_SCANS_COMPLETED.inc();
			debug!(utxos = utxos.len(), "Scan completed");
			Ok(UtxoResult {
				scripthash: request.scripthash.clone(),
				utxos,
			})
		}
		Err(e) => {
			UTXO_SCANS_FAILED.inc();
			Err(ScannerError::query_failed(
				"Failed to list unspent outputs",
				Some(e.into()),
				Some(HashMap::from([(
					"scripthash".to_string(),
					request.scripthash.clone(),
				)])),
			))
		}
	}
}
