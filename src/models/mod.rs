//! Domain models and data structures for address monitoring.
//!
//! - `config`: Service configuration and user definition loading
//! - `core`: Watched addresses, extended keys, users and notifications
//! - `security`: Secret values

mod config;
mod core;
mod security;

pub use config::{
	parse_network, ConfigError, ConfigLoader, ElectrumConfig, FanOutMode, ServiceConfig,
	SmtpConfig, ZmqConfig,
};

pub use core::{
	Branch, Derivation, ExtendedKeyRecord, NewAddress, ScanRequest, TxNotification, User, Utxo,
	UtxoResult, WatchedAddress, WebhookTarget,
};

pub use security::{SecretString, SecretValue};
