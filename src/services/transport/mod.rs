//! Raw transaction transport.
//!
//! - `feed`: message type, feed trait and the in-process channel feed
//! - `zmq`: Bitcoin Core ZMQ subscription

mod error;
mod feed;
mod zmq;

pub use error::TransportError;
pub use feed::{ChannelFeed, FeedMessage, RawTxFeed};
pub use zmq::ZmqFeed;
