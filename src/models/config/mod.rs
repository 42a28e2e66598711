//! Configuration loading and validation.
//!
//! The service itself is configured from the environment ([`ServiceConfig`]);
//! users are loaded from JSON files through [`ConfigLoader`].

#![allow(clippy::result_large_err)]

use async_trait::async_trait;
use std::path::Path;

mod error;
mod service_config;
mod user_config;

pub use error::ConfigError;
pub use service_config::{
	parse_network, ElectrumConfig, FanOutMode, ServiceConfig, SmtpConfig, ZmqConfig,
};

/// Common interface for configuration read from a directory of JSON files
#[async_trait]
pub trait ConfigLoader: Sized {
	/// Load every JSON file of `path` (or the default directory), keyed by id
	async fn load_all<T>(path: Option<&Path>) -> Result<T, ConfigError>
	where
		T: FromIterator<(String, Self)>;

	/// Load and validate a single file
	async fn load_from_path(path: &Path) -> Result<Self, ConfigError>;

	fn validate(&self) -> Result<(), ConfigError>;

	fn is_json_file(path: &Path) -> bool {
		path.extension()
			.map(|ext| ext.to_string_lossy().to_lowercase() == "json")
			.unwrap_or(false)
	}
}
