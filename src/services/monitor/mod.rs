//! Transaction monitor.
//!
//! - `matcher`: decoding and address matching of raw transactions
//! - `broadcaster`: fan-out of notifications to subscriber channels
//! - `service`: the monitor loop tying feed, matcher and broadcaster together

mod broadcaster;
mod error;
mod matcher;
mod service;

pub use broadcaster::NotificationBroadcaster;
pub use error::MonitorError;
pub use matcher::{decode_transaction, match_transaction, MatchOutcome};
pub use service::TxMonitor;
