//! Watched address and extended key storage.
//!
//! Records are kept in two JSON files under the data directory and rewritten
//! in full on every change (write to a temporary file, then rename). Deleted
//! records are kept with their identifying fields blanked.

#![allow(clippy::result_large_err)]

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
	models::{ExtendedKeyRecord, WatchedAddress},
	repositories::error::RepositoryError,
};

const ADDRESSES_FILE: &str = "addresses.json";
const EXTENDED_KEYS_FILE: &str = "extended_keys.json";

/// Interface for address storage backends
#[async_trait]
pub trait AddressRepositoryTrait: Send + Sync {
	/// All non-deleted addresses, in creation order
	async fn load_addresses(&self) -> Result<Vec<WatchedAddress>, RepositoryError>;

	async fn insert_addresses(&self, addresses: &[WatchedAddress]) -> Result<(), RepositoryError>;

	/// Marks the addresses deleted and blanks their address and scripthash
	async fn soft_delete_addresses(&self, ids: &[String]) -> Result<(), RepositoryError>;

	async fn insert_extended_key(&self, key: &ExtendedKeyRecord) -> Result<(), RepositoryError>;

	/// Returns None for unknown or deleted keys
	async fn get_extended_key(&self, id: &str)
		-> Result<Option<ExtendedKeyRecord>, RepositoryError>;

	async fn get_extended_keys_for_user(
		&self,
		user_id: &str,
	) -> Result<Vec<ExtendedKeyRecord>, RepositoryError>;

	/// Marks the key deleted and blanks its public key and name
	async fn soft_delete_extended_key(&self, id: &str) -> Result<(), RepositoryError>;
}

#[derive(Default)]
struct Store {
	addresses: Vec<WatchedAddress>,
	extended_keys: Vec<ExtendedKeyRecord>,
}

/// JSON file backed address repository
pub struct AddressRepository {
	addresses_path: PathBuf,
	extended_keys_path: PathBuf,
	store: Mutex<Store>,
}

impl AddressRepository {
	/// Opens (or creates) the store under `data_dir`
	pub async fn new(data_dir: &Path) -> Result<Self, RepositoryError> {
		tokio::fs::create_dir_all(data_dir).await.map_err(|e| {
			RepositoryError::load_error(
				"Failed to create data directory",
				Some(Box::new(e)),
				path_metadata(data_dir),
			)
		})?;

		let addresses_path = data_dir.join(ADDRESSES_FILE);
		let extended_keys_path = data_dir.join(EXTENDED_KEYS_FILE);
		let store = Store {
			addresses: read_records(&addresses_path).await?,
			extended_keys: read_records(&extended_keys_path).await?,
		};
		info!(
			addresses = store.addresses.len(),
			extended_keys = store.extended_keys.len(),
			path = %data_dir.display(),
			"Address store opened"
		);

		Ok(Self {
			addresses_path,
			extended_keys_path,
			store: Mutex::new(store),
		})
	}
}

#[async_trait]
impl AddressRepositoryTrait for AddressRepository {
	async fn load_addresses(&self) -> Result<Vec<WatchedAddress>, RepositoryError> {
		let store = self.store.lock().await;
		Ok(store
			.addresses
			.iter()
			.filter(|a| !a.is_deleted())
			.cloned()
			.collect())
	}

	async fn insert_addresses(&self, addresses: &[WatchedAddress]) -> Result<(), RepositoryError> {
		let mut store = self.store.lock().await;
		for address in addresses {
			if store.addresses.iter().any(|a| a.id == address.id) {
				return Err(RepositoryError::validation_error(
					"Address id already exists",
					None,
					Some(HashMap::from([("address_id".to_string(), address.id.clone())])),
				));
			}
		}

		let mut updated = store.addresses.clone();
		updated.extend(addresses.iter().map(|a| WatchedAddress {
			// unspent outputs are refreshed by scanning, never persisted
			utxos: Vec::new(),
			pending: Vec::new(),
			..a.clone()
		}));
		write_records(&self.addresses_path, &updated).await?;
		store.addresses = updated;
		debug!(count = addresses.len(), "Addresses stored");
		Ok(())
	}

	async fn soft_delete_addresses(&self, ids: &[String]) -> Result<(), RepositoryError> {
		let mut store = self.store.lock().await;
		let now = Utc::now();
		let mut updated = store.addresses.clone();
		for address in updated
			.iter_mut()
			.filter(|a| !a.is_deleted() && ids.contains(&a.id))
		{
			address.address.clear();
			address.scripthash.clear();
			address.updated_at = now;
			address.deleted_at = Some(now);
		}
		write_records(&self.addresses_path, &updated).await?;
		store.addresses = updated;
		Ok(())
	}

	async fn insert_extended_key(&self, key: &ExtendedKeyRecord) -> Result<(), RepositoryError> {
		let mut store = self.store.lock().await;
		if store.extended_keys.iter().any(|k| k.id == key.id) {
			return Err(RepositoryError::validation_error(
				"Extended key id already exists",
				None,
				Some(HashMap::from([("extended_key_id".to_string(), key.id.clone())])),
			));
		}

		let mut updated = store.extended_keys.clone();
		updated.push(key.clone());
		write_records(&self.extended_keys_path, &updated).await?;
		store.extended_keys = updated;
		Ok(())
	}

	async fn get_extended_key(
		&self,
		id: &str,
	) -> Result<Option<ExtendedKeyRecord>, RepositoryError> {
		let store = self.store.lock().await;
		Ok(store
			.extended_keys
			.iter()
			.find(|k| k.id == id && !k.is_deleted())
			.cloned())
	}

	async fn get_extended_keys_for_user(
		&self,
		user_id: &str,
	) -> Result<Vec<ExtendedKeyRecord>, RepositoryError> {
		let store = self.store.lock().await;
		Ok(store
			.extended_keys
			.iter()
			.filter(|k| k.user_id == user_id && !k.is_deleted())
			.cloned()
			.collect())
	}

	async fn soft_delete_extended_key(&self, id: &str) -> Result<(), RepositoryError> {
		let mut store = self.store.lock().await;
		let now = Utc::now();
		let mut updated = store.extended_keys.clone();
		for key in updated.iter_mut().filter(|k| k.id == id && !k.is_deleted()) {
			key.pubkey.clear();
			key.name = None;
			key.updated_at = now;
			key.deleted_at = Some(now);
		}
		write_records(&self.extended_keys_path, &updated).await?;
		store.extended_keys = updated;
		Ok(())
	}
}

fn path_metadata(path: &Path) -> Option<HashMap<String, String>> {
	Some(HashMap::from([(
		"path".to_string(),
		path.display().to_string(),
	)]))
}

async fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, RepositoryError> {
	let bytes = match tokio::fs::read(path).await {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
		Err(e) => {
			return Err(RepositoryError::load_error(
				"Failed to read store file",
				Some(Box::new(e)),
				path_metadata(path),
			))
		}
	};

	serde_json::from_slice(&bytes).map_err(|e| {
		RepositoryError::load_error(
			"Failed to parse store file",
			Some(Box::new(e)),
			path_metadata(path),
		)
	})
}

async fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), RepositoryError> {
	let body = serde_json::to_vec_pretty(records).map_err(|e| {
		RepositoryError::internal_error(
			"Failed to encode records",
			Some(Box::new(e)),
			path_metadata(path),
		)
	})?;

	let temp_path = path.with_extension("json.tmp");
	tokio::fs::write(&temp_path, body).await.map_err(|e| {
		RepositoryError::save_error(
			"Failed to write store file",
			Some(Box::new(e)),
			path_metadata(&temp_path),
		)
	})?;
	tokio::fs::rename(&temp_path, path).await.map_err(|e| {
		RepositoryError::save_error(
			"Failed to replace store file",
			Some(Box::new(e)),
			path_metadata(path),
		)
	})
}
