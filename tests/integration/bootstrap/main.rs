//! Wiring tests for the service bootstrap.

use std::{path::Path, sync::Arc, time::Duration};

use bitcoin::Network;
use mockito::Matcher;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::watch;

use satwatch_monitor::{
	bootstrap::{initialize_services, load_users, spawn_monitor},
	models::{ElectrumConfig, FanOutMode, NewAddress, ServiceConfig, ZmqConfig},
	repositories::UserRepositoryTrait,
	services::{blockchain::BlockchainDataClient, transport::ChannelFeed},
	utils::tests::builders::transaction::TransactionBuilder,
};

use crate::integration::mocks::{
	raw_tx_message, transaction_info, txid, wait_until, MockBlockchainDataClient, ADDRESS_B,
	ADDRESS_C,
};

fn config(data_dir: &Path, users_dir: &Path) -> ServiceConfig {
	ServiceConfig {
		network: Network::Bitcoin,
		zmq: ZmqConfig {
			host: "127.0.0.1".to_string(),
			port: 28332,
		},
		electrum: ElectrumConfig {
			host: "127.0.0.1".to_string(),
			port: 50001,
			ssl: false,
			ping_interval: Duration::from_secs(60),
			request_timeout: Duration::from_secs(5),
		},
		gap: 5,
		scan_queue_capacity: 8,
		subscriber_buffer: 4,
		fanout_mode: FanOutMode::Blocking,
		data_dir: data_dir.to_path_buf(),
		users_config_dir: users_dir.to_path_buf(),
		app_url: None,
		smtp: None,
		metrics_enabled: false,
		metrics_port: 8081,
	}
}

fn client() -> Arc<dyn BlockchainDataClient> {
	let mut client = MockBlockchainDataClient::new();
	client.expect_list_unspent().returning(|_| Ok(Vec::new()));
	client
		.expect_get_transaction()
		.returning(|id| Ok(transaction_info(id, 3)));
	Arc::new(client)
}

#[tokio::test]
async fn test_transaction_reaches_user_webhook() {
	let mut server = mockito::Server::new_async().await;
	let hook = server
		.mock("POST", "/alice")
		.match_body(Matcher::PartialJson(json!({
			"direction": "received",
			"confirmed": true,
			"amount": { "sat": 21000 }
		})))
		.with_status(200)
		.expect(1)
		.create_async()
		.await;

	let data_dir = TempDir::new().unwrap();
	let users_dir = TempDir::new().unwrap();
	std::fs::write(
		users_dir.path().join("alice.json"),
		json!({
			"id": "alice",
			"name": "Alice",
			"webhooks": [{ "url": format!("{}/alice", server.url()) }]
		})
		.to_string(),
	)
	.unwrap();

	let config = config(data_dir.path(), users_dir.path());
	let users = load_users(&config).await.unwrap();
	assert_eq!(users.get_all().len(), 1);

	let (shutdown_tx, shutdown) = watch::channel(false);
	let services = initialize_services(&config, client(), users, shutdown.clone())
		.await
		.unwrap();
	services
		.registry
		.create_addresses(vec![NewAddress::single("alice", ADDRESS_C)])
		.await
		.unwrap();

	let (feed_tx, feed) = ChannelFeed::channel(4);
	let monitor_task = spawn_monitor(services.monitor.clone(), feed, shutdown);

	let tx = TransactionBuilder::new()
		.input(txid(0x20), 0)
		.output(ADDRESS_C, 21000)
		.output(ADDRESS_B, 500)
		.build();
	feed_tx.send(raw_tx_message(&tx)).await.unwrap();

	assert!(wait_until(|| hook.matched_async()).await, "webhook was not called");

	shutdown_tx.send(true).unwrap();
	tokio::time::timeout(Duration::from_secs(5), async {
		monitor_task.await.unwrap();
		for task in services.tasks {
			task.await.unwrap();
		}
	})
	.await
	.unwrap();
}

#[tokio::test]
async fn test_missing_users_directory_fails() {
	let data_dir = TempDir::new().unwrap();
	let config = config(data_dir.path(), &data_dir.path().join("missing"));
	assert!(load_users(&config).await.is_err());
}

#[tokio::test]
async fn test_monitor_stops_when_feed_ends() {
	let data_dir = TempDir::new().unwrap();
	let users_dir = TempDir::new().unwrap();
	let config = config(data_dir.path(), users_dir.path());

	let (_shutdown_tx, shutdown) = watch::channel(false);
	let services = initialize_services(
		&config,
		client(),
		load_users(&config).await.unwrap(),
		shutdown.clone(),
	)
	.await
	.unwrap();

	let (feed_tx, feed) = ChannelFeed::channel(1);
	let monitor_task = spawn_monitor(services.monitor.clone(), feed, shutdown);
	drop(feed_tx);

	tokio::time::timeout(Duration::from_secs(2), monitor_task)
		.await
		.unwrap()
		.unwrap();
}
