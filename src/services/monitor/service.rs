//! Live transaction monitor.
//!
//! Consumes raw transactions from the feed in delivery order, matches them
//! against a snapshot of the watched addresses, resolves the confirmation state
//! of matched transactions and fans the resulting notifications out. Outputs
//! paid to watched addresses are recorded as pending in the address source and
//! every matched address is queued for a UTXO rescan, so outputs received after
//! startup are recognized when they are spent.

use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

use bitcoin::{Network, Transaction};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::{
	models::{FanOutMode, TxNotification, WatchedAddress},
	services::{
		blockchain::BlockchainDataClient,
		monitor::{
			broadcaster::NotificationBroadcaster,
			error::MonitorError,
			matcher::{decode_transaction, match_transaction},
		},
		registry::AddressSource,
		scanner::ScanQueue,
		transport::{FeedMessage, RawTxFeed},
	},
	utils::metrics::{
		CONFIRMATION_LOOKUP_FAILURES, TRANSACTIONS_MATCHED, TRANSACTIONS_PROCESSED,
		TRANSACTIONS_UNDECODABLE,
	},
};

/// Matches broadcast transactions against the watched addresses
pub struct TxMonitor<C: BlockchainDataClient + ?Sized, A: AddressSource + ?Sized> {
	network: Network,
	client: Arc<C>,
	addresses: Arc<A>,
	broadcaster: NotificationBroadcaster,
	scan_queue: Option<Arc<dyn ScanQueue>>,
}

impl<C: BlockchainDataClient + ?Sized, A: AddressSource + ?Sized> TxMonitor<C, A> {
	pub fn new(
		network: Network,
		client: Arc<C>,
		addresses: Arc<A>,
		subscriber_buffer: usize,
		mode: FanOutMode,
	) -> Self {
		Self {
			network,
			client,
			addresses,
			broadcaster: NotificationBroadcaster::new(subscriber_buffer, mode),
			scan_queue: None,
		}
	}

	/// Rescans the UTXOs of matched addresses through `queue`
	pub fn with_scan_queue(mut self, queue: Arc<dyn ScanQueue>) -> Self {
		self.scan_queue = Some(queue);
		self
	}

	/// Registers a new notification channel.
	///
	/// The channel receives every notification produced after this call.
	pub async fn subscribe(&self) -> mpsc::Receiver<TxNotification> {
		self.broadcaster.subscribe().await
	}

	pub fn broadcaster(&self) -> &NotificationBroadcaster {
		&self.broadcaster
	}

	/// Decodes and processes one raw transaction payload
	pub async fn process_payload(
		&self,
		payload: &[u8],
	) -> Result<Option<TxNotification>, MonitorError> {
		let tx = decode_transaction(payload).inspect_err(|_| TRANSACTIONS_UNDECODABLE.inc())?;
		self.process_transaction(tx).await
	}

	/// Builds the notification for `tx`, or None when nothing matched.
	///
	/// Transactions without a match never trigger a confirmation lookup. A
	/// failed lookup is returned as an error and no notification is built.
	#[instrument(skip_all, fields(txid = %tx.compute_txid()))]
	pub async fn process_transaction(
		&self,
		tx: Transaction,
	) -> Result<Option<TxNotification>, MonitorError> {
		TRANSACTIONS_PROCESSED.inc();

		let snapshot = self.addresses.get_addresses().await;
		let outcome = match_transaction(&tx, &snapshot, self.network);
		if outcome.is_empty() {
			return Ok(None);
		}
		TRANSACTIONS_MATCHED.inc();
		self.addresses.record_transaction(&tx).await;

		let txid = tx.compute_txid();
		let lookup = self.client.get_transaction(&txid).await;
		// the server has seen the transaction by now, or failed to answer
		self.queue_rescans(&outcome.matched);
		let info = lookup.map_err(|e| {
			CONFIRMATION_LOOKUP_FAILURES.inc();
			MonitorError::confirmation_lookup_failed(
				"Failed to fetch transaction confirmations",
				Some(e.into()),
				Some(HashMap::from([("txid".to_string(), txid.to_string())])),
			)
		})?;

		debug!(
			matched = outcome.matched.len(),
			sent = outcome.sent,
			amount = outcome.amount,
			"Transaction matched"
		);

		Ok(Some(TxNotification {
			matched_addresses: outcome.matched,
			tx,
			sent: outcome.sent,
			confirmed: info.is_confirmed(),
			amount: outcome.amount,
		}))
	}

	/// Queues one scan per distinct scripthash among `matched`
	fn queue_rescans(&self, matched: &[WatchedAddress]) {
		let Some(queue) = &self.scan_queue else {
			return;
		};
		let mut seen = HashSet::new();
		for address in matched {
			if seen.insert(address.scripthash.as_str()) {
				queue.enqueue_scan(&address.scripthash);
			}
		}
	}

	/// Processes one feed message and fans out its notification.
	///
	/// Returns the number of subscribers reached.
	pub async fn handle_message(
		&self,
		message: &FeedMessage,
		shutdown: &mut watch::Receiver<bool>,
	) -> usize {
		if !message.is_raw_tx() {
			debug!(topic = %message.topic, "Ignoring message on unrelated topic");
			return 0;
		}

		match self.process_payload(&message.payload).await {
			Ok(Some(notification)) => self.broadcaster.broadcast(&notification, shutdown).await,
			Ok(None) => 0,
			Err(MonitorError::DecodeError(_)) => {
				debug!(payload_len = message.payload.len(), "Dropped undecodable message");
				0
			}
			Err(e) => {
				warn!(error = %e, txid = e.txid().unwrap_or_default(), "Transaction skipped");
				0
			}
		}
	}

	/// Runs until the feed ends or shutdown is signalled
	pub async fn run<F: RawTxFeed + ?Sized>(
		&self,
		feed: &mut F,
		mut shutdown: watch::Receiver<bool>,
	) {
		info!(network = %self.network, mode = ?self.broadcaster.mode(), "Transaction monitor started");

		loop {
			if *shutdown.borrow() {
				break;
			}

			let message = tokio::select! {
				message = feed.next_message() => message,
				_ = shutdown.changed() => break,
			};

			match message {
				Some(Ok(message)) => {
					self.handle_message(&message, &mut shutdown).await;
				}
				Some(Err(e)) => {
					warn!(error = %e, "Raw transaction feed error");
				}
				None => {
					warn!("Raw transaction feed ended");
					break;
				}
			}
		}

		info!("Transaction monitor stopped");
	}
}
