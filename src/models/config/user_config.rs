//! User definition loading and validation.
//!
//! Each JSON file under the users directory describes one user together with
//! the email address and webhooks alerts are delivered to.

use async_trait::async_trait;
use email_address::EmailAddress;
use std::{collections::HashMap, path::Path};

use crate::{
	models::{config::error::ConfigError, ConfigLoader, User},
	services::notification::parse_public_key,
};

fn path_metadata(path: &Path) -> Option<HashMap<String, String>> {
	Some(HashMap::from([(
		"path".to_string(),
		path.display().to_string(),
	)]))
}

#[async_trait]
impl ConfigLoader for User {
	async fn load_all<T>(path: Option<&Path>) -> Result<T, ConfigError>
	where
		T: FromIterator<(String, Self)>,
	{
		let users_dir = path.unwrap_or(Path::new("config/users"));
		if !users_dir.exists() {
			return Err(ConfigError::file_error(
				"users directory not found",
				None,
				path_metadata(users_dir),
			));
		}

		let entries = std::fs::read_dir(users_dir).map_err(|e| {
			ConfigError::file_error(
				format!("failed to read users directory: {}", e),
				Some(Box::new(e)),
				path_metadata(users_dir),
			)
		})?;

		let mut users: Vec<(String, User)> = Vec::new();
		for entry in entries {
			let path = entry
				.map_err(|e| {
					ConfigError::file_error(
						format!("failed to read directory entry: {}", e),
						Some(Box::new(e)),
						path_metadata(users_dir),
					)
				})?
				.path();
			if !Self::is_json_file(&path) {
				continue;
			}

			let user = Self::load_from_path(&path).await?;
			if users.iter().any(|(id, _)| *id == user.id) {
				return Err(ConfigError::validation_error(
					format!("duplicate user id '{}'", user.id),
					None,
					path_metadata(&path),
				));
			}
			users.push((user.id.clone(), user));
		}

		Ok(T::from_iter(users))
	}

	async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
		let file = std::fs::File::open(path).map_err(|e| {
			ConfigError::file_error(
				format!("failed to open user file: {}", e),
				Some(Box::new(e)),
				path_metadata(path),
			)
		})?;
		let user: User = serde_json::from_reader(file).map_err(|e| {
			ConfigError::parse_error(
				format!("failed to parse user file: {}", e),
				Some(Box::new(e)),
				path_metadata(path),
			)
		})?;

		user.validate()?;
		Ok(user)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		let meta = Some(HashMap::from([("user_id".to_string(), self.id.clone())]));

		if self.id.trim().is_empty() {
			return Err(ConfigError::validation_error("user id is required", None, None));
		}
		if let Some(email) = &self.email {
			if !EmailAddress::is_valid(email) {
				return Err(ConfigError::validation_error(
					format!("invalid email address '{}'", email),
					None,
					meta,
				));
			}
		}
		if let Some(pubkey) = &self.pgp_pubkey {
			if self.email.is_none() {
				return Err(ConfigError::validation_error(
					"pgp_pubkey requires an email address",
					None,
					meta,
				));
			}
			parse_public_key(pubkey).map_err(|e| {
				ConfigError::validation_error(
					"invalid pgp_pubkey",
					Some(Box::new(e)),
					meta.clone(),
				)
			})?;
		}
		for webhook in &self.webhooks {
			let parsed = url::Url::parse(&webhook.url).map_err(|e| {
				ConfigError::validation_error(
					format!("invalid webhook url '{}'", webhook.url),
					Some(Box::new(e)),
					meta.clone(),
				)
			})?;
			if parsed.scheme() != "http" && parsed.scheme() != "https" {
				return Err(ConfigError::validation_error(
					"webhook url must use http or https",
					None,
					meta,
				));
			}
		}
		Ok(())
	}
}
