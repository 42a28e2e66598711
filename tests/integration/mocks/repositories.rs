//! Mock implementation of address storage.
//!
//! - [`MockAddressRepository`] - fails or records writes without touching disk

use async_trait::async_trait;
use mockall::mock;

use satwatch_monitor::{
	models::{ExtendedKeyRecord, WatchedAddress},
	repositories::{AddressRepositoryTrait, RepositoryError},
};

mock! {
	pub AddressRepository {}

	#[async_trait]
	impl AddressRepositoryTrait for AddressRepository {
		async fn load_addresses(&self) -> Result<Vec<WatchedAddress>, RepositoryError>;
		async fn insert_addresses(&self, addresses: &[WatchedAddress]) -> Result<(), RepositoryError>;
		async fn soft_delete_addresses(&self, ids: &[String]) -> Result<(), RepositoryError>;
		async fn insert_extended_key(&self, key: &ExtendedKeyRecord) -> Result<(), RepositoryError>;
		async fn get_extended_key(&self, id: &str) -> Result<Option<ExtendedKeyRecord>, RepositoryError>;
		async fn get_extended_keys_for_user(&self, user_id: &str) -> Result<Vec<ExtendedKeyRecord>, RepositoryError>;
		async fn soft_delete_extended_key(&self, id: &str) -> Result<(), RepositoryError>;
	}
}
