//! Test helper utilities for users
//!
//! - `UserBuilder`: Builder for creating test User instances

use crate::models::{SecretString, SecretValue, User, WebhookTarget};

/// Builder for creating test User instances
pub struct UserBuilder {
	id: String,
	name: String,
	email: Option<String>,
	pgp_pubkey: Option<String>,
	webhooks: Vec<WebhookTarget>,
}

impl Default for UserBuilder {
	fn default() -> Self {
		Self {
			id: "user-1".to_string(),
			name: "Test User".to_string(),
			email: None,
			pgp_pubkey: None,
			webhooks: Vec::new(),
		}
	}
}

impl UserBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn id(mut self, id: &str) -> Self {
		self.id = id.to_string();
		self
	}

	pub fn name(mut self, name: &str) -> Self {
		self.name = name.to_string();
		self
	}

	pub fn email(mut self, email: &str) -> Self {
		self.email = Some(email.to_string());
		self
	}

	pub fn pgp_pubkey(mut self, armored: &str) -> Self {
		self.pgp_pubkey = Some(armored.to_string());
		self
	}

	pub fn webhook(mut self, url: &str) -> Self {
		self.webhooks.push(WebhookTarget {
			url: url.to_string(),
			secret: None,
		});
		self
	}

	pub fn signed_webhook(mut self, url: &str, secret: &str) -> Self {
		self.webhooks.push(WebhookTarget {
			url: url.to_string(),
			secret: Some(SecretValue::Plain(SecretString::new(secret))),
		});
		self
	}

	pub fn build(self) -> User {
		User {
			id: self.id,
			name: self.name,
			email: self.email,
			pgp_pubkey: self.pgp_pubkey,
			webhooks: self.webhooks,
		}
	}
}
