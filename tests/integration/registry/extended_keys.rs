use std::sync::Arc;

use bitcoin::Network;
use chrono::Utc;

use satwatch_monitor::{
	models::{Branch, ExtendedKeyRecord, NewAddress},
	repositories::RepositoryError,
	services::registry::{AddressRegistry, RegistryError},
};

use crate::integration::mocks::{MockAddressRepository, MockScanQueue, ADDRESS_A, ADDRESS_C, ZPUB};

fn accepting_queue() -> MockScanQueue {
	let mut queue = MockScanQueue::new();
	queue.expect_enqueue_scan().returning(|_| true);
	queue
}

#[tokio::test]
async fn test_extended_key_expands_both_branches() {
	let mut repository = MockAddressRepository::new();
	repository
		.expect_insert_extended_key()
		.withf(|key: &ExtendedKeyRecord| key.user_id == "alice" && key.gap == 2)
		.times(1)
		.returning(|_| Ok(()));
	repository
		.expect_insert_addresses()
		.withf(|addresses| addresses.len() == 4)
		.times(1)
		.returning(|_| Ok(()));

	let registry = AddressRegistry::new(
		Network::Bitcoin,
		Arc::new(repository),
		Arc::new(accepting_queue()),
	);
	let (record, addresses) = registry
		.add_extended_key("alice", ZPUB, Some("hardware".to_string()), 2)
		.await
		.unwrap();

	assert_eq!(addresses.len(), 4);
	assert_eq!(addresses[0].address, ADDRESS_C);
	assert_eq!(addresses[0].name.as_deref(), Some("hardware 0/0"));
	let external = addresses
		.iter()
		.filter(|a| a.derivation.as_ref().unwrap().branch == Branch::External)
		.count();
	assert_eq!(external, 2);
	assert!(addresses
		.iter()
		.all(|a| a.extended_key_id() == Some(record.id.as_str())));
	assert_eq!(
		registry.get_addresses_for_extended_key(&record.id).await.len(),
		4
	);
	assert!(registry
		.get_addresses_without_extended_key("alice")
		.await
		.is_empty());
}

#[tokio::test]
async fn test_failed_address_insert_rolls_back_key() {
	let mut repository = MockAddressRepository::new();
	repository.expect_insert_extended_key().returning(|_| Ok(()));
	repository
		.expect_insert_addresses()
		.returning(|_| Err(RepositoryError::save_error("disk full", None, None)));
	repository
		.expect_soft_delete_extended_key()
		.times(1)
		.returning(|_| Ok(()));

	let registry = AddressRegistry::new(
		Network::Bitcoin,
		Arc::new(repository),
		Arc::new(accepting_queue()),
	);
	let result = registry.add_extended_key("alice", ZPUB, None, 3).await;

	assert!(matches!(result, Err(RegistryError::PersistenceError(_))));
	assert!(registry.get_addresses().await.is_empty());
}

#[tokio::test]
async fn test_invalid_keys_are_rejected_before_storage() {
	let mut repository = MockAddressRepository::new();
	repository.expect_insert_extended_key().never();
	repository.expect_insert_addresses().never();

	let registry = AddressRegistry::new(
		Network::Bitcoin,
		Arc::new(repository),
		Arc::new(accepting_queue()),
	);

	let garbage = registry.add_extended_key("alice", "xpub-not-a-key", None, 5).await;
	assert!(matches!(garbage, Err(RegistryError::InvalidExtendedKey(_))));

	let zero_gap = registry.add_extended_key("alice", ZPUB, None, 0).await;
	assert!(matches!(zero_gap, Err(RegistryError::InvalidExtendedKey(_))));
}

#[tokio::test]
async fn test_key_of_another_network_is_rejected() {
	let mut repository = MockAddressRepository::new();
	repository.expect_insert_extended_key().never();

	let registry = AddressRegistry::new(
		Network::Testnet,
		Arc::new(repository),
		Arc::new(accepting_queue()),
	);
	let result = registry.add_extended_key("alice", ZPUB, None, 5).await;
	assert!(matches!(result, Err(RegistryError::InvalidExtendedKey(_))));
}

#[tokio::test]
async fn test_delete_extended_key_removes_derived_addresses() {
	let mut repository = MockAddressRepository::new();
	repository.expect_insert_extended_key().returning(|_| Ok(()));
	repository.expect_insert_addresses().returning(|_| Ok(()));
	repository.expect_get_extended_key().returning(|id| {
		let now = Utc::now();
		Ok(Some(ExtendedKeyRecord {
			id: id.to_string(),
			user_id: "alice".to_string(),
			name: None,
			pubkey: ZPUB.to_string(),
			gap: 1,
			created_at: now,
			updated_at: now,
			deleted_at: None,
		}))
	});
	repository
		.expect_soft_delete_addresses()
		.withf(|ids| ids.len() == 2)
		.times(1)
		.returning(|_| Ok(()));
	repository
		.expect_soft_delete_extended_key()
		.times(1)
		.returning(|_| Ok(()));

	let registry = AddressRegistry::new(
		Network::Bitcoin,
		Arc::new(repository),
		Arc::new(accepting_queue()),
	);
	let (record, _) = registry
		.add_extended_key("alice", ZPUB, None, 1)
		.await
		.unwrap();
	registry
		.create_addresses(vec![NewAddress::single("alice", ADDRESS_A)])
		.await
		.unwrap();

	let other_user = registry.delete_extended_key("bob", &record.id).await;
	assert!(matches!(other_user, Err(RegistryError::NotFound(_))));

	assert_eq!(registry.delete_extended_key("alice", &record.id).await.unwrap(), 2);
	let remaining = registry.get_addresses().await;
	assert_eq!(remaining.len(), 1);
	assert_eq!(remaining[0].address, ADDRESS_A);
}
