//! Feed to subscriber tests running the registry, scanner and monitor together.

use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use bitcoin::Network;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use satwatch_monitor::{
	models::{FanOutMode, NewAddress, TxNotification, Utxo},
	repositories::AddressRepository,
	services::{
		monitor::TxMonitor,
		registry::AddressRegistry,
		scanner::UtxoScanner,
		transport::{ChannelFeed, FeedMessage},
	},
	utils::tests::builders::transaction::TransactionBuilder,
};

use crate::integration::mocks::{
	raw_tx_message, transaction_info, txid, wait_until, MockBlockchainDataClient, ADDRESS_A,
	ADDRESS_B, ADDRESS_C, SCRIPTHASH_A,
};

type Registry = AddressRegistry<AddressRepository, UtxoScanner>;

struct Pipeline {
	registry: Arc<Registry>,
	feed: mpsc::Sender<FeedMessage>,
	subscribers: Vec<mpsc::Receiver<TxNotification>>,
	shutdown: watch::Sender<bool>,
	_dir: TempDir,
}

/// Chain where ADDRESS_A holds `aa..aa:0` worth 5000 sat
fn chain(confirmations: u32) -> MockBlockchainDataClient {
	let mut client = MockBlockchainDataClient::new();
	client.expect_list_unspent().returning(|scripthash| {
		if scripthash == SCRIPTHASH_A {
			Ok(vec![Utxo {
				tx_hash: txid(0xaa),
				tx_pos: 0,
				value: 5000,
				height: 800_000,
			}])
		} else {
			Ok(Vec::new())
		}
	});
	client
		.expect_get_transaction()
		.returning(move |id| Ok(transaction_info(id, confirmations)));
	client
}

async fn start(client: MockBlockchainDataClient, subscribers: usize) -> Pipeline {
	let dir = TempDir::new().unwrap();
	let client = Arc::new(client);
	let (shutdown, shutdown_rx) = watch::channel(false);

	let (scanner, results, _worker) = UtxoScanner::start(client.clone(), 16, shutdown_rx.clone());
	let scanner = Arc::new(scanner);
	let repository = Arc::new(AddressRepository::new(dir.path()).await.unwrap());
	let registry = Arc::new(AddressRegistry::new(
		Network::Bitcoin,
		repository,
		scanner.clone(),
	));
	{
		let registry = registry.clone();
		let shutdown_rx = shutdown_rx.clone();
		tokio::spawn(async move { registry.consume_scan_results(results, shutdown_rx).await });
	}

	let monitor = Arc::new(
		TxMonitor::new(
			Network::Bitcoin,
			client,
			registry.clone(),
			4,
			FanOutMode::Blocking,
		)
		.with_scan_queue(scanner),
	);
	let mut receivers = Vec::new();
	for _ in 0..subscribers {
		receivers.push(monitor.subscribe().await);
	}

	let (sender, mut feed) = ChannelFeed::channel(16);
	tokio::spawn(async move { monitor.run(&mut feed, shutdown_rx).await });

	Pipeline {
		registry,
		feed: sender,
		subscribers: receivers,
		shutdown,
		_dir: dir,
	}
}

async fn watch_address_a(pipeline: &Pipeline) {
	pipeline
		.registry
		.create_addresses(vec![NewAddress::single("alice", ADDRESS_A)])
		.await
		.unwrap();

	let registry = pipeline.registry.clone();
	assert!(
		wait_until(|| {
			let registry = registry.clone();
			async move {
				registry
					.get_address(ADDRESS_A)
					.await
					.is_some_and(|a| !a.utxos.is_empty())
			}
		})
		.await,
		"scan result was never applied"
	);
}

async fn next(receiver: &mut mpsc::Receiver<TxNotification>) -> Option<TxNotification> {
	tokio::time::timeout(Duration::from_millis(500), receiver.recv())
		.await
		.ok()
		.flatten()
}

#[tokio::test]
async fn test_spend_from_watched_address() {
	let mut pipeline = start(chain(1), 1).await;
	watch_address_a(&pipeline).await;

	let tx = TransactionBuilder::new()
		.input(txid(0xaa), 0)
		.output(ADDRESS_B, 4000)
		.build();
	pipeline.feed.send(raw_tx_message(&tx)).await.unwrap();

	let notification = next(&mut pipeline.subscribers[0]).await.unwrap();
	assert_eq!(notification.txid(), tx.compute_txid());
	assert_eq!(notification.matched_addresses.len(), 1);
	assert_eq!(notification.matched_addresses[0].address, ADDRESS_A);
	assert!(notification.sent);
	assert!(notification.confirmed);
	assert_eq!(notification.amount, 0);

	pipeline.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_spend_of_output_received_after_startup() {
	let received = TransactionBuilder::new()
		.input(txid(0x07), 0)
		.output(ADDRESS_A, 50_000)
		.build();
	let received_txid = received.compute_txid();

	// the first scan runs when the address is added, later ones see the payment
	let scans = Arc::new(AtomicUsize::new(0));
	let mut client = MockBlockchainDataClient::new();
	{
		let scans = scans.clone();
		client.expect_list_unspent().returning(move |scripthash| {
			let n = scans.fetch_add(1, Ordering::SeqCst);
			if scripthash == SCRIPTHASH_A && n > 0 {
				Ok(vec![Utxo {
					tx_hash: received_txid,
					tx_pos: 0,
					value: 50_000,
					height: 0,
				}])
			} else {
				Ok(Vec::new())
			}
		});
	}
	client
		.expect_get_transaction()
		.returning(|id| Ok(transaction_info(id, 0)));

	let mut pipeline = start(client, 1).await;
	pipeline
		.registry
		.create_addresses(vec![NewAddress::single("alice", ADDRESS_A)])
		.await
		.unwrap();

	pipeline.feed.send(raw_tx_message(&received)).await.unwrap();
	let first = next(&mut pipeline.subscribers[0]).await.unwrap();
	assert!(!first.sent);
	assert_eq!(first.amount, 50_000);

	let registry = pipeline.registry.clone();
	assert!(
		wait_until(|| {
			let registry = registry.clone();
			async move {
				registry
					.get_address(ADDRESS_A)
					.await
					.is_some_and(|a| a.utxos.iter().any(|u| u.tx_hash == received_txid))
			}
		})
		.await,
		"received output never reached the registry"
	);

	let spend = TransactionBuilder::new()
		.input(received_txid, 0)
		.output(ADDRESS_B, 49_000)
		.build();
	pipeline.feed.send(raw_tx_message(&spend)).await.unwrap();

	let second = next(&mut pipeline.subscribers[0]).await.unwrap();
	assert_eq!(second.txid(), spend.compute_txid());
	assert_eq!(second.matched_addresses[0].address, ADDRESS_A);
	assert!(second.sent);
	assert_eq!(second.amount, 0);
	assert!(scans.load(Ordering::SeqCst) >= 2);

	pipeline.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_spend_detected_while_indexer_lags() {
	let received = TransactionBuilder::new()
		.input(txid(0x08), 1)
		.output(ADDRESS_A, 30_000)
		.build();
	let received_txid = received.compute_txid();

	// the server has not indexed the payment for any of the scans
	let scans = Arc::new(AtomicUsize::new(0));
	let mut client = MockBlockchainDataClient::new();
	{
		let scans = scans.clone();
		client.expect_list_unspent().returning(move |_| {
			scans.fetch_add(1, Ordering::SeqCst);
			Ok(Vec::new())
		});
	}
	client
		.expect_get_transaction()
		.returning(|id| Ok(transaction_info(id, 0)));

	let mut pipeline = start(client, 1).await;
	pipeline
		.registry
		.create_addresses(vec![NewAddress::single("alice", ADDRESS_A)])
		.await
		.unwrap();

	pipeline.feed.send(raw_tx_message(&received)).await.unwrap();
	let first = next(&mut pipeline.subscribers[0]).await.unwrap();
	assert_eq!(first.amount, 30_000);

	let counter = scans.clone();
	assert!(
		wait_until(|| {
			let counter = counter.clone();
			async move { counter.load(Ordering::SeqCst) >= 2 }
		})
		.await,
		"no rescan after the payment"
	);
	tokio::time::sleep(Duration::from_millis(50)).await;

	let address = pipeline.registry.get_address(ADDRESS_A).await.unwrap();
	assert!(address.utxos.is_empty());
	assert_eq!(address.pending.len(), 1);

	let spend = TransactionBuilder::new()
		.input(received_txid, 0)
		.output(ADDRESS_B, 29_000)
		.build();
	pipeline.feed.send(raw_tx_message(&spend)).await.unwrap();

	let second = next(&mut pipeline.subscribers[0]).await.unwrap();
	assert_eq!(second.txid(), spend.compute_txid());
	assert_eq!(second.matched_addresses[0].address, ADDRESS_A);
	assert!(second.sent);

	let address = pipeline.registry.get_address(ADDRESS_A).await.unwrap();
	assert!(address.pending.is_empty());

	pipeline.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_payment_to_watched_address() {
	let mut pipeline = start(chain(0), 1).await;
	pipeline
		.registry
		.create_addresses(vec![NewAddress::single("carol", ADDRESS_C)])
		.await
		.unwrap();

	let tx = TransactionBuilder::new()
		.input(txid(0x01), 0)
		.output(ADDRESS_C, 1200)
		.output(ADDRESS_B, 300)
		.build();
	pipeline.feed.send(raw_tx_message(&tx)).await.unwrap();

	let notification = next(&mut pipeline.subscribers[0]).await.unwrap();
	assert_eq!(notification.user_ids(), vec!["carol"]);
	assert!(!notification.sent);
	assert!(!notification.confirmed);
	assert_eq!(notification.amount, 1200);

	pipeline.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_every_subscriber_receives_a_copy() {
	let mut pipeline = start(chain(0), 2).await;
	watch_address_a(&pipeline).await;

	let tx = TransactionBuilder::new()
		.input(txid(0x02), 1)
		.output(ADDRESS_A, 700)
		.build();
	pipeline.feed.send(raw_tx_message(&tx)).await.unwrap();

	let first = next(&mut pipeline.subscribers[0]).await.unwrap();
	let second = next(&mut pipeline.subscribers[1]).await.unwrap();
	assert_eq!(first, second);
	assert_eq!(first.amount, 700);

	pipeline.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_unrelated_and_invalid_messages_are_ignored() {
	let mut pipeline = start(chain(0), 1).await;
	watch_address_a(&pipeline).await;

	let unrelated = TransactionBuilder::new()
		.input(txid(0x03), 0)
		.output(ADDRESS_B, 100)
		.build();
	let empty = TransactionBuilder::new().build();
	pipeline.feed.send(raw_tx_message(&unrelated)).await.unwrap();
	pipeline.feed.send(raw_tx_message(&empty)).await.unwrap();
	pipeline
		.feed
		.send(FeedMessage::raw_tx(vec![0xde, 0xad]))
		.await
		.unwrap();
	pipeline
		.feed
		.send(FeedMessage::new("hashblock", vec![0; 32]))
		.await
		.unwrap();

	// The monitor keeps running after the noise
	let relevant = TransactionBuilder::new()
		.input(txid(0x04), 0)
		.output(ADDRESS_A, 900)
		.build();
	pipeline.feed.send(raw_tx_message(&relevant)).await.unwrap();

	let notification = next(&mut pipeline.subscribers[0]).await.unwrap();
	assert_eq!(notification.txid(), relevant.compute_txid());
	assert!(next(&mut pipeline.subscribers[0]).await.is_none());

	pipeline.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_confirmation_lookup_failure_drops_notification() {
	let mut client = MockBlockchainDataClient::new();
	client
		.expect_list_unspent()
		.returning(|_| Ok(Vec::new()));
	client
		.expect_get_transaction()
		.times(1)
		.returning(|_| Err(anyhow::anyhow!("electrum unavailable")));

	let mut pipeline = start(client, 1).await;
	pipeline
		.registry
		.create_addresses(vec![NewAddress::single("alice", ADDRESS_A)])
		.await
		.unwrap();

	let tx = TransactionBuilder::new()
		.input(txid(0x05), 0)
		.output(ADDRESS_A, 100)
		.build();
	pipeline.feed.send(raw_tx_message(&tx)).await.unwrap();

	assert!(next(&mut pipeline.subscribers[0]).await.is_none());

	pipeline.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_deleted_address_no_longer_matches() {
	let mut pipeline = start(chain(0), 1).await;
	let created = pipeline
		.registry
		.create_addresses(vec![NewAddress::single("alice", ADDRESS_C)])
		.await
		.unwrap();
	pipeline
		.registry
		.delete_address("alice", &created[0].id)
		.await
		.unwrap();

	let tx = TransactionBuilder::new()
		.input(txid(0x06), 0)
		.output(ADDRESS_C, 100)
		.build();
	pipeline.feed.send(raw_tx_message(&tx)).await.unwrap();

	assert!(next(&mut pipeline.subscribers[0]).await.is_none());

	pipeline.shutdown.send(true).unwrap();
}
