//! Core services implementing the business logic.
//!
//! This module contains the main service implementations:
//! - `blockchain`: Electrum client used for UTXO and confirmation lookups
//! - `derivation`: Extended public key parsing and address derivation
//! - `monitor`: Matching of mempool transactions against watched addresses
//! - `notification`: Email and webhook delivery
//! - `registry`: In-memory set of watched addresses
//! - `scanner`: Background UTXO scans
//! - `transport`: Raw transaction feed from the node

pub mod blockchain;
pub mod derivation;
pub mod monitor;
pub mod notification;
pub mod registry;
pub mod scanner;
pub mod transport;
