//! Service configuration read from the environment.
//!
//! Every key has a default except `ELECTRUM_HOST`. Values are validated once at
//! startup so the long-running loops never see a half-configured service.

use bitcoin::Network;
use std::{collections::HashMap, env, path::PathBuf, str::FromStr, time::Duration};

use crate::{
	models::{config::error::ConfigError, SecretString},
	utils::{
		constants::{DEFAULT_GAP, DEFAULT_SCAN_QUEUE_CAPACITY, DEFAULT_SUBSCRIBER_BUFFER},
		normalize_string, parse_bool_flag,
	},
};

/// Delivery policy of the notification broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanOutMode {
	/// Wait for room in every subscriber channel, in registration order
	#[default]
	Blocking,
	/// Skip (and log) subscribers whose channel is full
	NonBlocking,
}

impl FromStr for FanOutMode {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match normalize_string(s).replace('-', "_").as_str() {
			"blocking" => Ok(FanOutMode::Blocking),
			"non_blocking" | "nonblocking" => Ok(FanOutMode::NonBlocking),
			other => Err(ConfigError::parse_error(
				format!("unknown fan-out mode '{}'", other),
				None,
				Some(HashMap::from([("key".to_string(), "FANOUT_MODE".to_string())])),
			)),
		}
	}
}

/// Bitcoin Core ZMQ publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZmqConfig {
	pub host: String,
	pub port: u16,
}

impl ZmqConfig {
	pub fn endpoint(&self) -> String {
		format!("tcp://{}:{}", self.host, self.port)
	}
}

/// Electrum server connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectrumConfig {
	pub host: String,
	pub port: u16,
	pub ssl: bool,
	pub ping_interval: Duration,
	pub request_timeout: Duration,
}

/// Outgoing mail server.
#[derive(Debug, Clone, PartialEq)]
pub struct SmtpConfig {
	pub host: String,
	pub port: u16,
	pub username: Option<String>,
	pub password: Option<SecretString>,
	pub from: String,
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
	pub network: Network,
	pub zmq: ZmqConfig,
	pub electrum: ElectrumConfig,
	/// Addresses derived per branch of an extended key
	pub gap: u32,
	pub scan_queue_capacity: usize,
	pub subscriber_buffer: usize,
	pub fanout_mode: FanOutMode,
	pub data_dir: PathBuf,
	pub users_config_dir: PathBuf,
	/// Public URL used for links in emails
	pub app_url: Option<String>,
	pub smtp: Option<SmtpConfig>,
	pub metrics_enabled: bool,
	pub metrics_port: u16,
}

/// Key/value source the configuration is read from.
struct Source<F: Fn(&str) -> Option<String>> {
	lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Source<F> {
	fn string(&self, key: &str) -> Option<String> {
		(self.lookup)(key)
			.map(|v| v.trim().to_string())
			.filter(|v| !v.is_empty())
	}

	fn string_or(&self, key: &str, default: &str) -> String {
		self.string(key).unwrap_or_else(|| default.to_string())
	}

	fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
	where
		T: FromStr,
		T::Err: std::fmt::Display,
	{
		match self.string(key) {
			None => Ok(default),
			Some(raw) => raw.parse::<T>().map_err(|e| {
				ConfigError::parse_error(
					format!("invalid value '{}' for {}: {}", raw, key, e),
					None,
					Some(HashMap::from([("key".to_string(), key.to_string())])),
				)
			}),
		}
	}

	fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
		match self.string(key) {
			None => Ok(default),
			Some(raw) => parse_bool_flag(&raw).ok_or_else(|| {
				ConfigError::parse_error(
					format!("invalid boolean '{}' for {}", raw, key),
					None,
					Some(HashMap::from([("key".to_string(), key.to_string())])),
				)
			}),
		}
	}
}

/// Parses a network name, accepting "mainnet" for the main chain.
pub fn parse_network(raw: &str) -> Result<Network, ConfigError> {
	let name = normalize_string(raw);
	let name = if name == "mainnet" { "bitcoin".to_string() } else { name };
	Network::from_str(&name).map_err(|e| {
		ConfigError::parse_error(
			format!("unknown bitcoin network '{}'", raw),
			Some(Box::new(e)),
			Some(HashMap::from([(
				"key".to_string(),
				"BITCOIN_NETWORK".to_string(),
			)])),
		)
	})
}

impl ServiceConfig {
	/// Reads the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| env::var(key).ok())
	}

	/// Reads configuration through `lookup` and validates it.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let src = Source { lookup };

		let network = match src.string("BITCOIN_NETWORK") {
			Some(raw) => parse_network(&raw)?,
			None => Network::Bitcoin,
		};

		let electrum_host = src.string("ELECTRUM_HOST").ok_or_else(|| {
			ConfigError::validation_error(
				"ELECTRUM_HOST is required",
				None,
				Some(HashMap::from([(
					"key".to_string(),
					"ELECTRUM_HOST".to_string(),
				)])),
			)
		})?;

		let smtp = match src.string("SMTP_HOST") {
			None => None,
			Some(host) => Some(SmtpConfig {
				host,
				port: src.parsed("SMTP_PORT", 587u16)?,
				username: src.string("SMTP_USER"),
				password: src.string("SMTP_PASSWORD").map(SecretString::new),
				from: src.string("SMTP_FROM").unwrap_or_default(),
			}),
		};

		let config = ServiceConfig {
			network,
			zmq: ZmqConfig {
				host: src.string_or("ZMQ_HOST", "127.0.0.1"),
				port: src.parsed("ZMQ_PORT", 5555u16)?,
			},
			electrum: ElectrumConfig {
				host: electrum_host,
				port: src.parsed("ELECTRUM_PORT", 50001u16)?,
				ssl: src.flag("ELECTRUM_SSL", false)?,
				ping_interval: Duration::from_secs(
					src.parsed("ELECTRUM_PING_INTERVAL_SECS", 60u64)?,
				),
				request_timeout: Duration::from_secs(
					src.parsed("ELECTRUM_REQUEST_TIMEOUT_SECS", 30u64)?,
				),
			},
			gap: src.parsed("GAP", DEFAULT_GAP)?,
			scan_queue_capacity: src.parsed("SCAN_QUEUE_CAPACITY", DEFAULT_SCAN_QUEUE_CAPACITY)?,
			subscriber_buffer: src.parsed("SUBSCRIBER_BUFFER", DEFAULT_SUBSCRIBER_BUFFER)?,
			fanout_mode: src.parsed("FANOUT_MODE", FanOutMode::Blocking)?,
			data_dir: PathBuf::from(src.string_or("DATA_DIR", "data")),
			users_config_dir: PathBuf::from(src.string_or("USERS_CONFIG_DIR", "config/users")),
			app_url: src.string("APP_URL"),
			smtp,
			metrics_enabled: src.flag("METRICS_ENABLED", false)?,
			metrics_port: src.parsed("METRICS_PORT", 8081u16)?,
		};

		config.validate()?;
		Ok(config)
	}

	/// Checks cross-field constraints.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let invalid = |msg: &str, key: &str| -> Result<(), ConfigError> {
			Err(ConfigError::validation_error(
				msg,
				None,
				Some(HashMap::from([("key".to_string(), key.to_string())])),
			))
		};

		if self.gap == 0 {
			return invalid("GAP must be at least 1", "GAP");
		}
		if self.scan_queue_capacity == 0 {
			return invalid(
				"SCAN_QUEUE_CAPACITY must be at least 1",
				"SCAN_QUEUE_CAPACITY",
			);
		}
		if self.subscriber_buffer == 0 {
			return invalid("SUBSCRIBER_BUFFER must be at least 1", "SUBSCRIBER_BUFFER");
		}
		if self.electrum.port == 0 {
			return invalid("ELECTRUM_PORT must be non-zero", "ELECTRUM_PORT");
		}
		if self.electrum.request_timeout.is_zero() {
			return invalid(
				"ELECTRUM_REQUEST_TIMEOUT_SECS must be at least 1",
				"ELECTRUM_REQUEST_TIMEOUT_SECS",
			);
		}
		if self.electrum.ping_interval.is_zero() {
			return invalid(
				"ELECTRUM_PING_INTERVAL_SECS must be at least 1",
				"ELECTRUM_PING_INTERVAL_SECS",
			);
		}
		if let Some(url) = &self.app_url {
			if url::Url::parse(url).is_err() {
				return invalid("APP_URL must be an absolute URL", "APP_URL");
			}
		}
		if let Some(smtp) = &self.smtp {
			if !email_address::EmailAddress::is_valid(&smtp.from) {
				return invalid("SMTP_FROM must be a valid email address", "SMTP_FROM");
			}
			if smtp.username.is_some() != smtp.password.is_some() {
				return invalid(
					"SMTP_USER and SMTP_PASSWORD must be set together",
					"SMTP_USER",
				);
			}
		}
		Ok(())
	}
}
