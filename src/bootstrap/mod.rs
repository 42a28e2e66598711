//! Bootstrap module for initializing services and wiring the pipeline.
//!
//! The pipeline is assembled leaves first:
//! - the UTXO scanner and its result consumer
//! - the address registry, loaded from storage with a scan queued per address
//! - the transaction monitor reading the watched addresses from the registry
//!   and queueing a rescan for every address a transaction touches
//! - one notification dispatcher task per delivery channel, each with its own
//!   monitor subscription
//!
//! Every spawned task observes the shared shutdown signal.

use std::{error::Error, sync::Arc};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{info, warn};

use crate::{
	models::ServiceConfig,
	repositories::{AddressRepository, UserRepository, UserRepositoryTrait},
	services::{
		blockchain::BlockchainDataClient,
		monitor::TxMonitor,
		notification::{
			EmailNotifier, NotificationClientPool, NotificationDispatcher, Notifier,
			WebhookNotifier,
		},
		registry::AddressRegistry,
		scanner::UtxoScanner,
		transport::RawTxFeed,
	},
	utils::RetryConfig,
};

/// Type alias for handling ServiceResult
pub type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// Registry backed by the JSON repository and the UTXO scanner
pub type Registry = AddressRegistry<AddressRepository, UtxoScanner>;

/// Monitor reading addresses from [`Registry`]
pub type Monitor = TxMonitor<dyn BlockchainDataClient, Registry>;

/// Running services and their background tasks
pub struct Services {
	pub registry: Arc<Registry>,
	pub monitor: Arc<Monitor>,
	pub dispatcher: Arc<NotificationDispatcher<UserRepository>>,
	/// Channels receiving notifications, in subscription order
	pub notifiers: Vec<Arc<dyn Notifier>>,
	pub tasks: Vec<JoinHandle<()>>,
}

/// Initializes every service of the pipeline.
///
/// The monitor itself is not started; see [`spawn_monitor`].
///
/// # Errors
/// Returns an error if storage cannot be opened, stored addresses cannot be
/// loaded or a notification client cannot be built
pub async fn initialize_services(
	config: &ServiceConfig,
	client: Arc<dyn BlockchainDataClient>,
	users: UserRepository,
	shutdown: watch::Receiver<bool>,
) -> Result<Services> {
	let repository = Arc::new(AddressRepository::new(&config.data_dir).await?);

	let (scanner, scan_results, scan_worker) =
		UtxoScanner::start(client.clone(), config.scan_queue_capacity, shutdown.clone());
	let scanner = Arc::new(scanner);
	let registry = Arc::new(AddressRegistry::new(
		config.network,
		repository,
		scanner.clone(),
	));

	let mut tasks = vec![scan_worker];
	{
		let registry = registry.clone();
		let shutdown = shutdown.clone();
		tasks.push(tokio::spawn(async move {
			registry.consume_scan_results(scan_results, shutdown).await;
		}));
	}

	let loaded = registry.load().await?;
	info!(addresses = loaded, "Watched addresses loaded");

	let monitor = Arc::new(
		TxMonitor::new(
			config.network,
			client,
			registry.clone(),
			config.subscriber_buffer,
			config.fanout_mode,
		)
		.with_scan_queue(scanner),
	);

	let notifiers = create_notifiers(config, &NotificationClientPool::new()).await?;
	let dispatcher = Arc::new(NotificationDispatcher::new(
		users,
		config.network,
		config.app_url.clone(),
	));

	for notifier in &notifiers {
		let receiver = monitor.subscribe().await;
		let dispatcher = dispatcher.clone();
		let notifier = notifier.clone();
		let shutdown = shutdown.clone();
		tasks.push(tokio::spawn(async move {
			dispatcher.run(notifier, receiver, shutdown).await;
		}));
	}

	Ok(Services {
		registry,
		monitor,
		dispatcher,
		notifiers,
		tasks,
	})
}

/// Builds the delivery channels available with `config`.
///
/// Webhooks are always delivered; email only when SMTP is configured.
pub async fn create_notifiers(
	config: &ServiceConfig,
	pool: &NotificationClientPool,
) -> Result<Vec<Arc<dyn Notifier>>> {
	let retry_policy = RetryConfig::default();
	let http_client = pool.get_or_create_http_client(&retry_policy).await?;

	let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(WebhookNotifier::new(http_client))];

	match &config.smtp {
		Some(smtp) => {
			let smtp_client = pool.get_or_create_smtp_client(smtp).await?;
			notifiers.push(Arc::new(EmailNotifier::with_client(
				smtp_client,
				&smtp.from,
				retry_policy,
			)?));
		}
		None => warn!("SMTP is not configured, email notifications are disabled"),
	}

	Ok(notifiers)
}

/// Starts the monitor on `feed` in a background task
pub fn spawn_monitor<F>(
	monitor: Arc<Monitor>,
	mut feed: F,
	shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
	F: RawTxFeed + 'static,
{
	tokio::spawn(async move {
		monitor.run(&mut feed, shutdown).await;
	})
}

/// Loads the user definitions of `config`
pub async fn load_users(config: &ServiceConfig) -> Result<UserRepository> {
	let users = UserRepository::new(Some(&config.users_config_dir)).await?;
	info!(users = users.get_all().len(), "Users loaded");
	Ok(users)
}
