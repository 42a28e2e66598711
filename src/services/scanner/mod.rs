//! UTXO scanning.
//!
//! A bounded queue of scripthashes drained by a single worker that asks the
//! blockchain data client for their unspent outputs and publishes the results.

mod error;
mod service;

pub use error::ScannerError;
pub use service::{ScanQueue, ScanResult, UtxoScanner};
