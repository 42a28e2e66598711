//! In-memory address registry.
//!
//! Owns the list of watched addresses and their latest UTXO sets. Readers always
//! get copies. Mutations are serialized by a writer lock and persisted through
//! the address repository before they become visible; the address list itself
//! is only write-locked to apply a change that is already stored.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bitcoin::{Network, OutPoint, Transaction};
use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
	models::{Branch, Derivation, ExtendedKeyRecord, NewAddress, Utxo, WatchedAddress},
	repositories::AddressRepositoryTrait,
	services::{
		derivation::{ExtendedKeyExpansion, ExtendedPubKey},
		registry::{
			error::RegistryError,
			scripthash::{parse_address, script_scripthash},
		},
		scanner::{ScanQueue, ScanResult},
	},
	utils::metrics::update_address_metrics,
};

/// Snapshot access to the watched addresses
#[async_trait]
pub trait AddressSource: Send + Sync {
	/// Copy of every non-deleted watched address
	async fn get_addresses(&self) -> Vec<WatchedAddress>;

	/// Notes a matched transaction seen on the feed, so its outputs can be
	/// recognized when spent before a scan reports them
	async fn record_transaction(&self, _tx: &Transaction) {}
}

/// Registry of watched addresses
pub struct AddressRegistry<R: AddressRepositoryTrait + ?Sized, Q: ScanQueue + ?Sized> {
	network: Network,
	repository: Arc<R>,
	scan_queue: Arc<Q>,
	addresses: RwLock<Vec<WatchedAddress>>,
	/// Held by persisted mutations for their whole duration
	writer: Mutex<()>,
}

impl<R: AddressRepositoryTrait + ?Sized, Q: ScanQueue + ?Sized> AddressRegistry<R, Q> {
	pub fn new(network: Network, repository: Arc<R>, scan_queue: Arc<Q>) -> Self {
		Self {
			network,
			repository,
			scan_queue,
			addresses: RwLock::new(Vec::new()),
			writer: Mutex::new(()),
		}
	}

	pub fn network(&self) -> Network {
		self.network
	}

	/// Loads every stored address and queues a scan for each of them.
	///
	/// Scripthashes are recomputed from the address strings; stored addresses
	/// that no longer parse for the configured network are skipped.
	#[instrument(skip(self))]
	pub async fn load(&self) -> Result<usize, RegistryError> {
		let writer = self.writer.lock().await;
		let stored = self.repository.load_addresses().await?;

		let mut loaded = Vec::with_capacity(stored.len());
		for mut address in stored.into_iter().filter(|a| !a.is_deleted()) {
			match parse_address(&address.address, self.network) {
				Ok(parsed) => {
					let scripthash = script_scripthash(&parsed.script_pubkey());
					if address.scripthash != scripthash {
						warn!(address_id = %address.id, "Recomputing stale scripthash");
						address.scripthash = scripthash;
					}
					address.utxos.clear();
					loaded.push(address);
				}
				Err(e) => {
					warn!(address_id = %address.id, error = %e, "Skipping stored address");
				}
			}
		}

		let scripthashes: Vec<String> = loaded.iter().map(|a| a.scripthash.clone()).collect();
		let count = loaded.len();
		{
			let mut addresses = self.addresses.write().await;
			*addresses = loaded;
			update_address_metrics(&addresses);
		}
		drop(writer);

		for scripthash in &scripthashes {
			if let Err(e) = self.scan_queue.enqueue_scan_wait(scripthash).await {
				warn!(error = %e, "Initial scan backlog interrupted");
				break;
			}
		}

		info!(count, "Address registry loaded");
		Ok(count)
	}

	/// Starts watching a batch of addresses.
	///
	/// The batch is validated as a whole; nothing is stored when one address is
	/// invalid or already watched by the same user. A scan is queued for every
	/// created address.
	#[instrument(skip_all, fields(count = batch.len()))]
	pub async fn create_addresses(
		&self,
		batch: Vec<NewAddress>,
	) -> Result<Vec<WatchedAddress>, RegistryError> {
		if batch.is_empty() {
			return Ok(Vec::new());
		}

		let now = Utc::now();
		let mut created: Vec<WatchedAddress> = Vec::with_capacity(batch.len());
		for new_address in batch {
			let parsed = parse_address(&new_address.address, self.network)?;
			let address = parsed.to_string();

			if created
				.iter()
				.any(|c| c.user_id == new_address.user_id && c.address == address)
			{
				return Err(duplicate(&new_address.user_id, &address));
			}

			created.push(WatchedAddress {
				id: Uuid::new_v4().to_string(),
				user_id: new_address.user_id,
				name: new_address.name,
				scripthash: script_scripthash(&parsed.script_pubkey()),
				address,
				derivation: new_address.derivation,
				utxos: Vec::new(),
				pending: Vec::new(),
				created_at: now,
				updated_at: now,
				deleted_at: None,
			});
		}

		{
			let _writer = self.writer.lock().await;
			if let Some(existing) = {
				let addresses = self.addresses.read().await;
				created
					.iter()
					.find(|c| {
						addresses
							.iter()
							.any(|a| a.user_id == c.user_id && a.address == c.address)
					})
					.cloned()
			} {
				return Err(duplicate(&existing.user_id, &existing.address));
			}

			self.repository.insert_addresses(&created).await?;

			let mut addresses = self.addresses.write().await;
			addresses.extend(created.iter().cloned());
			update_address_metrics(&addresses);
		}

		for address in &created {
			self.scan_queue.enqueue_scan(&address.scripthash);
		}

		debug!(count = created.len(), "Addresses created");
		Ok(created)
	}

	/// Registers an extended public key and watches `gap` addresses on both
	/// the external and the change branch.
	#[instrument(skip(self, pubkey, name))]
	pub async fn add_extended_key(
		&self,
		user_id: &str,
		pubkey: &str,
		name: Option<String>,
		gap: u32,
	) -> Result<(ExtendedKeyRecord, Vec<WatchedAddress>), RegistryError> {
		if gap == 0 {
			return Err(RegistryError::invalid_extended_key(
				"Gap must be greater than zero",
				None,
				Some(HashMap::from([("user_id".to_string(), user_id.to_string())])),
			));
		}

		let key = ExtendedPubKey::parse(pubkey, self.network)?;
		key.derive_address(Branch::External, 0)?;
		let derived = ExtendedKeyExpansion::new(gap).derive_all(&key)?;

		let now = Utc::now();
		let record = ExtendedKeyRecord {
			id: Uuid::new_v4().to_string(),
			user_id: user_id.to_string(),
			name: name.clone(),
			pubkey: pubkey.trim().to_string(),
			gap,
			created_at: now,
			updated_at: now,
			deleted_at: None,
		};
		self.repository.insert_extended_key(&record).await?;

		let batch = derived
			.into_iter()
			.map(|d| NewAddress {
				user_id: user_id.to_string(),
				name: name
					.as_ref()
					.map(|n| format!("{} {}/{}", n, d.branch.index(), d.index)),
				address: d.address,
				derivation: Some(Derivation {
					extended_key_id: record.id.clone(),
					branch: d.branch,
					index: d.index,
				}),
			})
			.collect();

		match self.create_addresses(batch).await {
			Ok(addresses) => {
				info!(
					extended_key_id = %record.id,
					scheme = %key.scheme(),
					addresses = addresses.len(),
					"Extended key added"
				);
				Ok((record, addresses))
			}
			Err(e) => {
				if let Err(rollback) = self.repository.soft_delete_extended_key(&record.id).await {
					warn!(error = %rollback, "Failed to roll back extended key");
				}
				Err(e)
			}
		}
	}

	pub async fn get_addresses(&self) -> Vec<WatchedAddress> {
		self.addresses.read().await.clone()
	}

	/// First watched address with this address string
	pub async fn get_address(&self, address: &str) -> Option<WatchedAddress> {
		self.addresses
			.read()
			.await
			.iter()
			.find(|a| a.address == address)
			.cloned()
	}

	pub async fn get_address_by_id(&self, id: &str, user_id: &str) -> Option<WatchedAddress> {
		self.addresses
			.read()
			.await
			.iter()
			.find(|a| a.id == id && a.user_id == user_id)
			.cloned()
	}

	/// Address currently holding `outpoint` as an unspent output
	pub async fn find_by_outpoint(&self, outpoint: &OutPoint) -> Option<WatchedAddress> {
		self.addresses
			.read()
			.await
			.iter()
			.find(|a| a.holds_outpoint(outpoint))
			.cloned()
	}

	/// Addresses of `user_id`, oldest first
	pub async fn get_addresses_for_user(&self, user_id: &str) -> Vec<WatchedAddress> {
		let mut addresses: Vec<WatchedAddress> = self
			.addresses
			.read()
			.await
			.iter()
			.filter(|a| a.user_id == user_id)
			.cloned()
			.collect();
		addresses.sort_by_key(|a| a.created_at);
		addresses
	}

	pub async fn get_addresses_for_extended_key(&self, extended_key_id: &str) -> Vec<WatchedAddress> {
		self.addresses
			.read()
			.await
			.iter()
			.filter(|a| a.extended_key_id() == Some(extended_key_id))
			.cloned()
			.collect()
	}

	/// Addresses of `user_id` that were added one by one
	pub async fn get_addresses_without_extended_key(&self, user_id: &str) -> Vec<WatchedAddress> {
		self.addresses
			.read()
			.await
			.iter()
			.filter(|a| a.user_id == user_id && a.derivation.is_none())
			.cloned()
			.collect()
	}

	/// Replaces the UTXO set of every address with this scripthash.
	///
	/// Returns the number of addresses updated.
	pub async fn update_utxos(&self, scripthash: &str, utxos: Vec<Utxo>) -> usize {
		let mut addresses = self.addresses.write().await;
		let now = Utc::now();
		let mut updated = 0;
		for address in addresses.iter_mut().filter(|a| a.scripthash == scripthash) {
			address
				.pending
				.retain(|p| !utxos.iter().any(|u| u.outpoint() == p.outpoint()));
			address.utxos = utxos.clone();
			address.updated_at = now;
			updated += 1;
		}

		if updated == 0 {
			debug!(scripthash, "Scan result for an address that is no longer watched");
		}
		updated
	}

	/// Tracks the outputs `tx` pays to watched addresses as pending and forgets
	/// pending outputs that `tx` spends.
	///
	/// The UTXO sets themselves are left to the scanner. The Electrum server may
	/// index a mempool transaction well after the node announced it, so a scan
	/// queued for the payment can come back without the new output.
	///
	/// Returns the number of pending outputs added.
	pub async fn record_transaction(&self, tx: &Transaction) -> usize {
		let txid = tx.compute_txid();
		let paid: Vec<(String, Utxo)> = tx
			.output
			.iter()
			.enumerate()
			.map(|(vout, output)| {
				(
					script_scripthash(&output.script_pubkey),
					Utxo {
						tx_hash: txid,
						tx_pos: vout as u32,
						value: output.value.to_sat(),
						height: 0,
					},
				)
			})
			.collect();

		let mut addresses = self.addresses.write().await;
		let mut added = 0;
		for address in addresses.iter_mut() {
			address
				.pending
				.retain(|p| !tx.input.iter().any(|i| i.previous_output == p.outpoint()));

			for (scripthash, utxo) in &paid {
				if *scripthash == address.scripthash && !address.holds_outpoint(&utxo.outpoint()) {
					address.pending.push(utxo.clone());
					added += 1;
				}
			}
		}

		if added > 0 {
			debug!(%txid, added, "Recorded pending outputs");
		}
		added
	}

	/// Applies scan results until the stream ends or shutdown is signalled
	pub async fn consume_scan_results(
		&self,
		mut results: mpsc::UnboundedReceiver<ScanResult>,
		mut shutdown: watch::Receiver<bool>,
	) {
		loop {
			tokio::select! {
				result = results.recv() => match result {
					Some(Ok(result)) => {
						self.update_utxos(&result.scripthash, result.utxos).await;
					}
					Some(Err(e)) => {
						debug!(scripthash = e.scripthash().unwrap_or_default(), "Skipping failed scan");
					}
					None => break,
				},
				_ = shutdown.changed() => break,
			}
		}
		info!("Scan result consumer stopped");
	}

	/// Stops watching an address of `user_id`
	#[instrument(skip(self))]
	pub async fn delete_address(
		&self,
		user_id: &str,
		address_id: &str,
	) -> Result<WatchedAddress, RegistryError> {
		let _writer = self.writer.lock().await;
		let not_found = || {
			RegistryError::not_found(
				"Address not found",
				None,
				Some(HashMap::from([
					("user_id".to_string(), user_id.to_string()),
					("address_id".to_string(), address_id.to_string()),
				])),
			)
		};
		let owned = |a: &WatchedAddress| a.id == address_id && a.user_id == user_id;

		if !self.addresses.read().await.iter().any(owned) {
			return Err(not_found());
		}
		self.repository
			.soft_delete_addresses(&[address_id.to_string()])
			.await?;

		let mut addresses = self.addresses.write().await;
		let position = addresses.iter().position(owned).ok_or_else(not_found)?;
		let removed = addresses.remove(position);
		update_address_metrics(&addresses);
		Ok(removed)
	}

	/// Deletes an extended key of `user_id` together with every address derived from it.
	///
	/// Returns the number of addresses removed.
	#[instrument(skip(self))]
	pub async fn delete_extended_key(
		&self,
		user_id: &str,
		extended_key_id: &str,
	) -> Result<usize, RegistryError> {
		self.repository
			.get_extended_key(extended_key_id)
			.await?
			.filter(|k| k.user_id == user_id)
			.ok_or_else(|| {
				RegistryError::not_found(
					"Extended key not found",
					None,
					Some(HashMap::from([
						("user_id".to_string(), user_id.to_string()),
						("extended_key_id".to_string(), extended_key_id.to_string()),
					])),
				)
			})?;

		let _writer = self.writer.lock().await;
		let ids: Vec<String> = self
			.addresses
			.read()
			.await
			.iter()
			.filter(|a| a.extended_key_id() == Some(extended_key_id))
			.map(|a| a.id.clone())
			.collect();

		if !ids.is_empty() {
			self.repository.soft_delete_addresses(&ids).await?;
		}
		self.repository
			.soft_delete_extended_key(extended_key_id)
			.await?;

		let mut addresses = self.addresses.write().await;
		addresses.retain(|a| a.extended_key_id() != Some(extended_key_id));
		update_address_metrics(&addresses);
		Ok(ids.len())
	}

	/// Deletes every address and extended key of `user_id`.
	///
	/// Returns the number of addresses removed.
	#[instrument(skip(self))]
	pub async fn delete_user_addresses(&self, user_id: &str) -> Result<usize, RegistryError> {
		let _writer = self.writer.lock().await;
		let ids: Vec<String> = self
			.addresses
			.read()
			.await
			.iter()
			.filter(|a| a.user_id == user_id)
			.map(|a| a.id.clone())
			.collect();

		if !ids.is_empty() {
			self.repository.soft_delete_addresses(&ids).await?;
		}
		for key in self.repository.get_extended_keys_for_user(user_id).await? {
			self.repository.soft_delete_extended_key(&key.id).await?;
		}

		let mut addresses = self.addresses.write().await;
		addresses.retain(|a| a.user_id != user_id);
		update_address_metrics(&addresses);
		Ok(ids.len())
	}
}

#[async_trait]
impl<R, Q> AddressSource for AddressRegistry<R, Q>
where
	R: AddressRepositoryTrait + ?Sized,
	Q: ScanQueue + ?Sized,
{
	async fn get_addresses(&self) -> Vec<WatchedAddress> {
		AddressRegistry::get_addresses(self).await
	}

	async fn record_transaction(&self, tx: &Transaction) {
		AddressRegistry::record_transaction(self, tx).await;
	}
}

fn duplicate(user_id: &str, address: &str) -> RegistryError {
	RegistryError::duplicate_address(
		"Address is already watched",
		None,
		Some(HashMap::from([
			("user_id".to_string(), user_id.to_string()),
			("address".to_string(), address.to_string()),
		])),
	)
}
