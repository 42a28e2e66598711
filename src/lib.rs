//! Bitcoin address monitoring and notification service.
//!
//! This library watches Bitcoin addresses on behalf of many users and notifies
//! them when a newly broadcast transaction credits or debits one of them. It
//! includes:
//!
//! - Matching of raw transactions from a node's ZMQ feed against watched addresses
//! - Background UTXO scans through an Electrum server, used to detect spends
//! - Address derivation from extended public keys (xpub, ypub, zpub)
//! - Email and webhook delivery of per-user notifications
//!
//! # Module Structure
//!
//! - `bootstrap`: Wires the services together
//! - `models`: Watched addresses, notifications and configuration
//! - `repositories`: Address and user storage
//! - `services`: Core business logic and chain access
//! - `utils`: Common utilities and helper functions

pub mod bootstrap;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;
