//! Bitcoin address monitoring service entry point.
//!
//! This binary watches the addresses registered by users and notifies them
//! whenever a broadcast transaction pays to or spends from one of them.
//!
//! # Architecture
//! The service is built around several key components:
//! - Transaction monitor: matches raw transactions from the node's ZMQ feed
//! - UTXO scanner: keeps the unspent outputs of every watched address current
//! - Address registry: the watched addresses, persisted under the data directory
//! - Notification dispatchers: email and webhook delivery per matched user
//!
//! # Flow
//! 1. Loads configuration from the environment and user definitions from disk
//! 2. Connects to the Electrum server and loads the watched addresses
//! 3. Subscribes to the raw transaction feed
//! 4. Matches transactions and delivers notifications
//! 5. Handles graceful shutdown on Ctrl+C

pub mod bootstrap;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

use crate::{
	bootstrap::{initialize_services, load_users, spawn_monitor, Result},
	models::ServiceConfig,
	repositories::UserRepositoryTrait,
	services::{blockchain::ElectrumClient, registry::AddressSource, transport::ZmqFeed},
	utils::{
		logging::setup_logging, metrics::server::create_metrics_server, parse_string_to_bytes_size,
	},
};

use clap::Parser;
use dotenvy::dotenv_override;
use std::env::{set_var, var};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Time granted to background tasks to finish after shutdown is signalled
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
	name = "satwatch-monitor",
	about = "Watches Bitcoin addresses and notifies their owners of incoming and outgoing transactions.",
	version
)]
struct Cli {
	/// Write logs to file instead of stdout
	#[arg(long)]
	log_file: bool,

	/// Set log level (trace, debug, info, warn, error)
	#[arg(long, value_name = "LEVEL")]
	log_level: Option<String>,

	/// Path to store log files (default: logs/)
	#[arg(long, value_name = "PATH")]
	log_path: Option<String>,

	/// Maximum log file size before rolling (e.g., "1GB", "500MB", "1024KB")
	#[arg(long, value_name = "SIZE", value_parser = parse_string_to_bytes_size)]
	log_max_size: Option<u64>,

	/// Address to start the metrics server on (default: 127.0.0.1:8081)
	#[arg(long, value_name = "HOST:PORT")]
	metrics_address: Option<String>,

	/// Enable metrics server
	#[arg(long)]
	metrics: bool,

	/// Bitcoin network (bitcoin, testnet, signet, regtest)
	#[arg(long, value_name = "NETWORK")]
	network: Option<String>,

	/// Validate configuration without starting the service
	#[arg(long)]
	check: bool,
}

impl Cli {
	/// Apply CLI options to environment variables, overriding any existing values
	fn apply_to_env(&self) {
		// Reload environment variables from .env file
		dotenv_override().ok();

		if self.log_file {
			set_var("LOG_MODE", "file");
		}

		if let Ok(level) = var("RUST_LOG") {
			set_var("LOG_LEVEL", level);
		}

		if let Some(level) = &self.log_level {
			set_var("LOG_LEVEL", level);
			set_var("RUST_LOG", level);
		}

		if let Some(path) = &self.log_path {
			set_var("LOG_DATA_DIR", path);
		}

		if let Some(max_size) = &self.log_max_size {
			set_var("LOG_MAX_SIZE", max_size.to_string());
		}

		if self.metrics {
			set_var("METRICS_ENABLED", "true");
		}

		if let Some(address) = &self.metrics_address {
			if let Some(port) = address.split(':').nth(1) {
				set_var("METRICS_PORT", port);
			}
		}

		if let Some(network) = &self.network {
			set_var("BITCOIN_NETWORK", network);
		}
	}
}

/// Main entry point for the address monitoring service.
///
/// # Errors
/// Returns an error if the configuration is invalid, a required service cannot
/// be initialized or the raw transaction subscription cannot be established.
#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	cli.apply_to_env();

	setup_logging().unwrap_or_else(|e| {
		error!("Failed to setup logging: {}", e);
	});

	if cli.check {
		validate_configuration().await;
		return Ok(());
	}

	let config = ServiceConfig::from_env()?;
	info!(
		network = %config.network,
		electrum = %format!("{}:{}", config.electrum.host, config.electrum.port),
		zmq = %config.zmq.endpoint(),
		fanout_mode = ?config.fanout_mode,
		email = config.smtp.is_some(),
		"Configuration loaded"
	);

	let users = load_users(&config).await?;
	let (shutdown_tx, shutdown_rx) = watch::channel(false);

	let client = ElectrumClient::new(&config.electrum).await?;
	let keep_alive = client
		.transport()
		.spawn_keep_alive(config.electrum.ping_interval, shutdown_rx.clone());

	let services =
		initialize_services(&config, Arc::new(client), users, shutdown_rx.clone()).await?;

	// Without the feed nothing can be observed
	let feed = ZmqFeed::subscribe(&config.zmq)?;
	let mut monitor_task = spawn_monitor(services.monitor.clone(), feed, shutdown_rx.clone());

	let metrics_server = if config.metrics_enabled {
		let metrics_address = cli
			.metrics_address
			.clone()
			.unwrap_or_else(|| format!("127.0.0.1:{}", config.metrics_port));
		info!("Metrics server enabled, starting on {}", metrics_address);

		let addresses: Arc<dyn AddressSource> = services.registry.clone();
		match create_metrics_server(metrics_address, addresses) {
			Ok(server) => Some(server),
			Err(e) => {
				error!("Failed to create metrics server: {}", e);
				None
			}
		}
	} else {
		info!("Metrics server disabled. Use --metrics flag or METRICS_ENABLED=true to enable");
		None
	};

	info!("Service started. Press Ctrl+C to shutdown");

	let ctrl_c = tokio::signal::ctrl_c();
	let metrics_future = async {
		match metrics_server {
			Some(server) => server.await,
			None => std::future::pending().await,
		}
	};

	tokio::select! {
		result = ctrl_c => {
			if let Err(e) = result {
				error!("Error waiting for Ctrl+C: {}", e);
			}
			info!("Shutdown signal received, stopping services...");
		}
		result = metrics_future => {
			if let Err(e) = result {
				error!("Metrics server error: {}", e);
			}
			info!("Metrics server stopped, shutting down services...");
		}
		_ = &mut monitor_task => {
			error!("Transaction monitor stopped unexpectedly, shutting down services...");
		}
	}

	let _ = shutdown_tx.send(true);

	let mut tasks = services.tasks;
	tasks.push(keep_alive);
	if !monitor_task.is_finished() {
		tasks.push(monitor_task);
	}

	if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, futures::future::join_all(tasks))
		.await
		.is_err()
	{
		error!("Background tasks did not stop in time");
	}

	info!("Shutdown complete");
	Ok(())
}

/// Validates the service configuration and the user definitions
async fn validate_configuration() {
	info!("Validating configuration...");

	let config = match ServiceConfig::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("{}", e);
			return;
		}
	};
	info!("✓ Service configuration is valid");

	match load_users(&config).await {
		Ok(users) => {
			info!("✓ Found {} user definition(s)", users.get_all().len());
		}
		Err(e) => {
			error!("{}", e);
			return;
		}
	}

	if config.smtp.is_none() {
		info!("SMTP is not configured, only webhook notifications will be delivered");
	}

	info!("Configuration validation completed successfully!");
}
