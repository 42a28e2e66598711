use mockall::predicate;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::{
	io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
	net::{TcpListener, TcpStream},
};

use satwatch_monitor::{
	models::ElectrumConfig,
	services::blockchain::{BlockChainError, BlockchainDataClient, ElectrumClient},
};

use crate::integration::mocks::{txid, MockElectrumTransport, SCRIPTHASH_A};

fn client(transport: MockElectrumTransport) -> ElectrumClient<MockElectrumTransport> {
	ElectrumClient::new_with_transport(Arc::new(transport))
}

fn mock_transport() -> MockElectrumTransport {
	let mut transport = MockElectrumTransport::new();
	transport
		.expect_server()
		.returning(|| "electrum.test:50001".to_string());
	transport
}

#[tokio::test]
async fn test_list_unspent_parses_outputs() {
	let mut transport = mock_transport();
	transport
		.expect_send_raw_request()
		.with(
			predicate::eq("blockchain.scripthash.listunspent"),
			predicate::eq(json!([SCRIPTHASH_A])),
		)
		.times(1)
		.returning(|_, _| {
			Ok(json!([
				{ "tx_hash": "11".repeat(32), "tx_pos": 0, "value": 5000, "height": 820000 },
				{ "tx_hash": "22".repeat(32), "tx_pos": 3, "value": 700, "height": 0 }
			]))
		});

	let utxos = client(transport).list_unspent(SCRIPTHASH_A).await.unwrap();
	assert_eq!(utxos.len(), 2);
	assert_eq!(utxos[0].tx_hash, txid(0x11));
	assert_eq!(utxos[0].value, 5000);
	assert!(utxos[0].is_confirmed());
	assert_eq!(utxos[1].tx_pos, 3);
	assert!(!utxos[1].is_confirmed());
}

#[tokio::test]
async fn test_list_unspent_null_is_empty() {
	let mut transport = mock_transport();
	transport
		.expect_send_raw_request()
		.returning(|_, _| Ok(Value::Null));

	let utxos = client(transport).list_unspent(SCRIPTHASH_A).await.unwrap();
	assert!(utxos.is_empty());
}

#[tokio::test]
async fn test_list_unspent_propagates_transport_error() {
	let mut transport = mock_transport();
	transport.expect_send_raw_request().returning(|_, _| {
		Err(BlockChainError::request_error("connection reset", None, None))
	});

	let error = client(transport)
		.list_unspent(SCRIPTHASH_A)
		.await
		.unwrap_err();
	assert!(error.to_string().contains(SCRIPTHASH_A));
}

#[tokio::test]
async fn test_get_history() {
	let mut transport = mock_transport();
	transport
		.expect_send_raw_request()
		.with(
			predicate::eq("blockchain.scripthash.get_history"),
			predicate::always(),
		)
		.returning(|_, _| {
			Ok(json!([
				{ "tx_hash": "33".repeat(32), "height": 800000 },
				{ "tx_hash": "44".repeat(32), "height": 0, "fee": 250 }
			]))
		});

	let history = client(transport).get_history(SCRIPTHASH_A).await.unwrap();
	assert_eq!(history.len(), 2);
	assert!(history[0].is_confirmed());
	assert_eq!(history[1].fee, Some(250));
}

#[tokio::test]
async fn test_get_transaction_requests_verbose_form() {
	let id = txid(0x55);
	let mut transport = mock_transport();
	transport
		.expect_send_raw_request()
		.with(
			predicate::eq("blockchain.transaction.get"),
			predicate::eq(json!([id.to_string(), true])),
		)
		.returning(move |_, _| {
			Ok(json!({
				"txid": id.to_string(),
				"confirmations": 2,
				"blockhash": "00".repeat(32)
			}))
		});

	let info = client(transport).get_transaction(&id).await.unwrap();
	assert_eq!(info.txid, id);
	assert_eq!(info.confirmations, Some(2));
	assert!(info.is_confirmed());
}

#[tokio::test]
async fn test_get_transaction_not_found() {
	let mut transport = mock_transport();
	transport
		.expect_send_raw_request()
		.returning(|_, _| Ok(Value::Null));

	assert!(client(transport).get_transaction(&txid(0x66)).await.is_err());
}

/// Answers `server.version` and `listunspent` like an Electrum server would.
///
/// With `hang_up`, the connection is closed right after version negotiation.
async fn serve_client(socket: TcpStream, hang_up: bool) {
	let (read_half, mut write_half) = socket.into_split();
	let mut lines = BufReader::new(read_half).lines();

	while let Ok(Some(line)) = lines.next_line().await {
		let request: Value = serde_json::from_str(&line).unwrap();
		let method = request["method"].as_str().unwrap().to_string();
		let result = match method.as_str() {
			"server.version" => json!(["FakeElectrum 1.0", "1.4"]),
			"blockchain.scripthash.listunspent" => json!([
				{ "tx_hash": "77".repeat(32), "tx_pos": 1, "value": 42, "height": 10 }
			]),
			_ => Value::Null,
		};
		let response = json!({ "jsonrpc": "2.0", "id": request["id"], "result": result });
		write_half
			.write_all(format!("{}\n", response).as_bytes())
			.await
			.unwrap();
		if hang_up && method == "server.version" {
			return;
		}
	}
}

/// Serves every client; the first one is dropped after negotiation when
/// `drop_first` is set
async fn serve_clients(listener: TcpListener, drop_first: bool) {
	let mut first = true;
	while let Ok((socket, _)) = listener.accept().await {
		tokio::spawn(serve_client(socket, drop_first && first));
		first = false;
	}
}

fn tcp_config(port: u16) -> ElectrumConfig {
	ElectrumConfig {
		host: "127.0.0.1".to_string(),
		port,
		ssl: false,
		ping_interval: Duration::from_secs(60),
		request_timeout: Duration::from_secs(5),
	}
}

#[tokio::test]
async fn test_client_over_tcp() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();
	let server = tokio::spawn(serve_clients(listener, false));

	let client = ElectrumClient::new(&tcp_config(port)).await.unwrap();

	let utxos = client.list_unspent(SCRIPTHASH_A).await.unwrap();
	assert_eq!(utxos.len(), 1);
	assert_eq!(utxos[0].value, 42);

	drop(client);
	server.abort();
}

#[tokio::test]
async fn test_client_recovers_after_server_hangs_up() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();
	let server = tokio::spawn(serve_clients(listener, true));

	let client = ElectrumClient::new(&tcp_config(port)).await.unwrap();

	// requests racing the hang-up may fail; later ones use a new connection
	let utxos = tokio::time::timeout(Duration::from_secs(10), async {
		loop {
			match client.list_unspent(SCRIPTHASH_A).await {
				Ok(utxos) => break utxos,
				Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
			}
		}
	})
	.await
	.unwrap();

	assert_eq!(utxos.len(), 1);
	assert_eq!(client.transport().reconnects(), 1);

	server.abort();
}

#[tokio::test]
async fn test_client_connection_refused() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();
	drop(listener);

	let config = ElectrumConfig {
		host: "127.0.0.1".to_string(),
		port,
		ssl: false,
		ping_interval: Duration::from_secs(60),
		request_timeout: Duration::from_secs(1),
	};
	assert!(ElectrumClient::new(&config).await.is_err());
}
