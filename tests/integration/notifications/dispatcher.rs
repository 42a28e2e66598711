use std::{sync::Arc, time::Duration};

use bitcoin::Network;
use lettre::transport::stub::AsyncStubTransport;
use mockito::Matcher;
use serde_json::json;
use tokio::sync::{mpsc, watch};

use satwatch_monitor::{
	repositories::UserRepository,
	services::notification::{
		EmailNotifier, NotificationDispatcher, Notifier, WebhookNotifier,
	},
	utils::{
		tests::{builders::user::UserBuilder, get_http_client_from_notification_pool},
		RetryConfig,
	},
};

use super::common::shared_payment;

#[tokio::test]
async fn test_each_channel_delivers_independently() {
	let mut server = mockito::Server::new_async().await;
	let alice_hook = server
		.mock("POST", "/alice")
		.match_body(Matcher::PartialJson(json!({ "amount": { "sat": 1500 } })))
		.with_status(200)
		.expect(2)
		.create_async()
		.await;
	let bob_hook = server
		.mock("POST", "/bob")
		.match_body(Matcher::PartialJson(json!({ "amount": { "sat": 2500 } })))
		.with_status(200)
		.expect(2)
		.create_async()
		.await;

	let users = UserRepository::from_users(vec![
		UserBuilder::new()
			.id("alice")
			.email("alice@example.com")
			.webhook(&format!("{}/alice", server.url()))
			.build(),
		UserBuilder::new()
			.id("bob")
			.webhook(&format!("{}/bob", server.url()))
			.build(),
	]);
	let dispatcher = Arc::new(NotificationDispatcher::new(
		users,
		Network::Bitcoin,
		Some("https://satwatch.example.com/".to_string()),
	));

	let transport = AsyncStubTransport::new_ok();
	let channels: Vec<Arc<dyn Notifier>> = vec![
		Arc::new(WebhookNotifier::new(
			get_http_client_from_notification_pool().await,
		)),
		Arc::new(
			EmailNotifier::with_transport(
				transport.clone(),
				"alerts@example.com",
				RetryConfig::default(),
			)
			.unwrap(),
		),
	];

	let (shutdown_tx, shutdown) = watch::channel(false);
	let mut senders = Vec::new();
	let mut tasks = Vec::new();
	for channel in channels {
		let (sender, receiver) = mpsc::channel(4);
		senders.push(sender);
		let dispatcher = dispatcher.clone();
		let shutdown = shutdown.clone();
		tasks.push(tokio::spawn(async move {
			dispatcher.run(channel, receiver, shutdown).await
		}));
	}

	for sender in &senders {
		sender.send(shared_payment(false)).await.unwrap();
		sender.send(shared_payment(true)).await.unwrap();
	}
	drop(senders);

	for task in tasks {
		tokio::time::timeout(Duration::from_secs(5), task)
			.await
			.unwrap()
			.unwrap();
	}

	alice_hook.assert_async().await;
	bob_hook.assert_async().await;

	let messages = transport.messages().await;
	assert_eq!(messages.len(), 2);
	assert!(messages[0].1.contains("Subject: Received 0.00001500 BTC (unconfirmed)"));
	assert!(messages[1].1.contains("Subject: Received 0.00001500 BTC (confirmed)"));

	shutdown_tx.send(true).unwrap();
}

#[tokio::test]
async fn test_failing_user_does_not_block_others() {
	let mut server = mockito::Server::new_async().await;
	let broken = server
		.mock("POST", "/broken")
		.with_status(404)
		.create_async()
		.await;
	let working = server
		.mock("POST", "/working")
		.with_status(200)
		.expect(1)
		.create_async()
		.await;

	let users = UserRepository::from_users(vec![
		UserBuilder::new()
			.id("alice")
			.webhook(&format!("{}/broken", server.url()))
			.build(),
		UserBuilder::new()
			.id("bob")
			.webhook(&format!("{}/working", server.url()))
			.build(),
	]);
	let dispatcher = NotificationDispatcher::new(users, Network::Bitcoin, None);
	let notifier = WebhookNotifier::new(get_http_client_from_notification_pool().await);

	let report = dispatcher.deliver(&notifier, &shared_payment(true)).await;
	assert_eq!(report.failed, 1);
	assert_eq!(report.delivered, 1);

	broken.assert_async().await;
	working.assert_async().await;
}
