//! Metrics module for the application.
//!
//! - This module contains the global Prometheus registry.
//! - Defines specific metrics for the application.

pub mod server;
use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::collections::HashSet;
use sysinfo::{Disks, System};

use crate::models::WatchedAddress;

lazy_static! {
	/// Global Prometheus registry.
	///
	/// This registry holds all metrics defined in this module and is used
	/// to gather metrics for exposure via the metrics endpoint.
	pub static ref REGISTRY: Registry = Registry::new();

	/// Gauge for CPU usage percentage.
	///
	/// Tracks the current CPU usage as a percentage (0-100) across all cores.
	pub static ref CPU_USAGE: Gauge = {
		let gauge = Gauge::new("cpu_usage_percentage", "Current CPU usage percentage").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Gauge for memory usage percentage.
	pub static ref MEMORY_USAGE_PERCENT: Gauge = {
		let gauge = Gauge::new("memory_usage_percentage", "Memory usage percentage").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Gauge for memory usage in bytes.
	pub static ref MEMORY_USAGE: Gauge = {
		let gauge = Gauge::new("memory_usage_bytes", "Memory usage in bytes").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Gauge for total memory in bytes.
	pub static ref TOTAL_MEMORY: Gauge = {
		let gauge = Gauge::new("total_memory_bytes", "Total memory in bytes").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Gauge for available memory in bytes.
	pub static ref AVAILABLE_MEMORY: Gauge = {
		let gauge = Gauge::new("available_memory_bytes", "Available memory in bytes").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Gauge for used disk space in bytes, summed over all mounted filesystems.
	pub static ref DISK_USAGE: Gauge = {
		let gauge = Gauge::new("disk_usage_bytes", "Used disk space in bytes").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Gauge for disk usage percentage.
	pub static ref DISK_USAGE_PERCENT: Gauge = {
		let gauge = Gauge::new("disk_usage_percentage", "Disk usage percentage").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Raw transactions received from the feed, decodable or not.
	pub static ref TRANSACTIONS_PROCESSED: IntCounter = {
		let counter = IntCounter::new("transactions_processed_total", "Raw transactions received from the feed").unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Raw transactions dropped because they could not be decoded.
	pub static ref TRANSACTIONS_UNDECODABLE: IntCounter = {
		let counter = IntCounter::new("transactions_undecodable_total", "Raw transactions that failed to decode").unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Transactions that matched at least one watched address.
	pub static ref TRANSACTIONS_MATCHED: IntCounter = {
		let counter = IntCounter::new("transactions_matched_total", "Transactions matching a watched address").unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Matched transactions abandoned because the confirmation lookup failed.
	pub static ref CONFIRMATION_LOOKUP_FAILURES: IntCounter = {
		let counter = IntCounter::new("confirmation_lookup_failures_total", "Failed confirmation lookups").unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Notifications produced by the monitor.
	pub static ref NOTIFICATIONS_EMITTED: IntCounter = {
		let counter = IntCounter::new("notifications_emitted_total", "Notifications produced by the monitor").unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Per-subscriber sends skipped by the non-blocking fan-out.
	pub static ref NOTIFICATIONS_DROPPED: IntCounter = {
		let counter = IntCounter::new("notifications_dropped_total", "Notifications dropped for a full subscriber").unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Deliveries by channel (`email`, `webhook`) and outcome (`sent`, `failed`, `skipped`).
	pub static ref NOTIFICATION_DELIVERIES: IntCounterVec = {
		let counter = IntCounterVec::new(
			Opts::new("notification_deliveries_total", "Notification deliveries by channel and outcome"),
			&["channel", "status"]
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	pub static ref UTXO_SCANS_COMPLETED: IntCounter = {
		let counter = IntCounter::new("utxo_scans_completed_total", "Completed UTXO scans").unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	pub static ref UTXO_SCANS_FAILED: IntCounter = {
		let counter = IntCounter::new("utxo_scans_failed_total", "Failed UTXO scans").unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Scan requests refused because the queue was full.
	pub static ref UTXO_SCANS_DROPPED: IntCounter = {
		let counter = IntCounter::new("utxo_scans_dropped_total", "Scan requests dropped by a full queue").unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Non-deleted watched addresses.
	pub static ref WATCHED_ADDRESSES: IntGauge = {
		let gauge = IntGauge::new("watched_addresses", "Number of watched addresses").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Users owning at least one watched address.
	pub static ref WATCHED_USERS: IntGauge = {
		let gauge = IntGauge::new("watched_users", "Number of users with watched addresses").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Extended keys with at least one derived address in the registry.
	pub static ref WATCHED_EXTENDED_KEYS: IntGauge = {
		let gauge = IntGauge::new("watched_extended_keys", "Number of watched extended keys").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Unspent outputs currently recorded across all watched addresses.
	pub static ref TRACKED_UTXOS: IntGauge = {
		let gauge = IntGauge::new("tracked_utxos", "Number of recorded unspent outputs").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};
}

/// Gather all metrics and encode into the provided format.
pub fn gather_metrics() -> Result<Vec<u8>, Box<dyn std::error::Error>> {
	let encoder = TextEncoder::new();
	let metric_families = REGISTRY.gather();
	let mut buffer = Vec::new();
	encoder.encode(&metric_families, &mut buffer)?;
	Ok(buffer)
}

/// Updates the system metrics for CPU and memory usage.
pub fn update_system_metrics() {
	let mut sys = System::new_all();
	sys.refresh_all();

	CPU_USAGE.set(sys.global_cpu_usage() as f64);

	let total_memory = sys.total_memory();
	TOTAL_MEMORY.set(total_memory as f64);
	AVAILABLE_MEMORY.set(sys.available_memory() as f64);

	let memory_usage = sys.used_memory();
	MEMORY_USAGE.set(memory_usage as f64);

	let memory_percentage = if total_memory > 0 {
		(memory_usage as f64 / total_memory as f64) * 100.0
	} else {
		0.0
	};
	MEMORY_USAGE_PERCENT.set(memory_percentage);

	let disks = Disks::new_with_refreshed_list();
	let mut total_disk_space: u64 = 0;
	let mut total_disk_available: u64 = 0;
	for disk in disks.list() {
		total_disk_space += disk.total_space();
		total_disk_available += disk.available_space();
	}
	let used_disk_space = total_disk_space.saturating_sub(total_disk_available);
	DISK_USAGE.set(used_disk_space as f64);

	let disk_percentage = if total_disk_space > 0 {
		(used_disk_space as f64 / total_disk_space as f64) * 100.0
	} else {
		0.0
	};
	DISK_USAGE_PERCENT.set(disk_percentage);
}

/// Updates the gauges describing the watched address book.
pub fn update_address_metrics(addresses: &[WatchedAddress]) {
	let live: Vec<&WatchedAddress> = addresses.iter().filter(|a| !a.is_deleted()).collect();

	let users: HashSet<&str> = live.iter().map(|a| a.user_id.as_str()).collect();
	let extended_keys: HashSet<&str> = live.iter().filter_map(|a| a.extended_key_id()).collect();
	let utxos: usize = live.iter().map(|a| a.utxos.len()).sum();

	WATCHED_ADDRESSES.set(live.len() as i64);
	WATCHED_USERS.set(users.len() as i64);
	WATCHED_EXTENDED_KEYS.set(extended_keys.len() as i64);
	TRACKED_UTXOS.set(utxos as i64);
}
