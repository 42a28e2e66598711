//! Core domain models.
//!
//! - Watched addresses with their UTXO sets and derivation links
//! - Extended key records
//! - Users and their notification targets
//! - Scan requests/results and transaction notifications

mod address;
mod extended_key;
mod notification;
mod user;

pub use address::{Branch, Derivation, NewAddress, Utxo, WatchedAddress};
pub use extended_key::ExtendedKeyRecord;
pub use notification::{ScanRequest, TxNotification, UtxoResult};
pub use user::{User, WebhookTarget};
