//! Keyed storage of shared clients.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// Clients indexed by the configuration they were built from.
///
/// A client is created at most once per key and shared afterwards.
pub struct ClientStorage<T> {
	clients: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> Default for ClientStorage<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> ClientStorage<T> {
	pub fn new() -> Self {
		Self {
			clients: RwLock::new(HashMap::new()),
		}
	}

	/// Returns the client stored under `key`, creating it with `create_fn` when absent
	pub async fn get_or_create<E, F>(&self, key: &str, create_fn: F) -> Result<Arc<T>, E>
	where
		F: FnOnce() -> Result<T, E>,
	{
		if let Some(client) = self.clients.read().await.get(key) {
			return Ok(client.clone());
		}

		let mut clients = self.clients.write().await;
		// Another task may have created it while we waited for the write lock
		if let Some(client) = clients.get(key) {
			return Ok(client.clone());
		}

		let client = Arc::new(create_fn()?);
		clients.insert(key.to_string(), client.clone());
		Ok(client)
	}

	pub async fn len(&self) -> usize {
		self.clients.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.clients.read().await.is_empty()
	}
}
