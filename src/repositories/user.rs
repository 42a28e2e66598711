//! User repository implementation.
//!
//! Users are read once at startup from the JSON files of the users directory.

#![allow(clippy::result_large_err)]

use std::{collections::HashMap, path::Path};

use async_trait::async_trait;

use crate::{
	models::{ConfigLoader, User},
	repositories::error::RepositoryError,
};

/// Repository for storing and retrieving users
#[derive(Clone, Default)]
pub struct UserRepository {
	pub users: HashMap<String, User>,
}

impl UserRepository {
	/// Loads every user file of `path` (or `config/users` when None)
	pub async fn new(path: Option<&Path>) -> Result<Self, RepositoryError> {
		let users = Self::load_all(path).await?;
		Ok(UserRepository { users })
	}

	pub fn from_users(users: impl IntoIterator<Item = User>) -> Self {
		Self {
			users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
		}
	}
}

/// Interface for user repository implementations
#[async_trait]
pub trait UserRepositoryTrait: Clone + Send + Sync {
	async fn new(path: Option<&Path>) -> Result<Self, RepositoryError>
	where
		Self: Sized;

	async fn load_all(path: Option<&Path>) -> Result<HashMap<String, User>, RepositoryError>;

	/// Returns None if the user doesn't exist.
	fn get(&self, user_id: &str) -> Option<User>;

	fn get_all(&self) -> HashMap<String, User>;
}

#[async_trait]
impl UserRepositoryTrait for UserRepository {
	async fn new(path: Option<&Path>) -> Result<Self, RepositoryError> {
		UserRepository::new(path).await
	}

	async fn load_all(path: Option<&Path>) -> Result<HashMap<String, User>, RepositoryError> {
		User::load_all(path).await.map_err(|e| {
			RepositoryError::load_error(
				"Failed to load users",
				Some(Box::new(e)),
				Some(HashMap::from([(
					"path".to_string(),
					path.map_or_else(|| "default".to_string(), |p| p.display().to_string()),
				)])),
			)
		})
	}

	fn get(&self, user_id: &str) -> Option<User> {
		self.users.get(user_id).cloned()
	}

	fn get_all(&self) -> HashMap<String, User> {
		self.users.clone()
	}
}
