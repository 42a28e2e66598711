//! Raw transaction feed abstraction.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{services::transport::error::TransportError, utils::constants::RAW_TX_TOPIC};

/// One message received from the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMessage {
	pub topic: String,
	pub payload: Vec<u8>,
}

impl FeedMessage {
	pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
		Self {
			topic: topic.into(),
			payload,
		}
	}

	/// A serialized transaction on the raw transaction topic
	pub fn raw_tx(payload: Vec<u8>) -> Self {
		Self::new(RAW_TX_TOPIC, payload)
	}

	pub fn is_raw_tx(&self) -> bool {
		self.topic == RAW_TX_TOPIC
	}
}

/// Source of `(topic, payload)` messages.
///
/// `None` means the feed has ended and no further message will arrive.
#[async_trait]
pub trait RawTxFeed: Send {
	async fn next_message(&mut self) -> Option<Result<FeedMessage, TransportError>>;
}

/// In-process feed backed by a channel
pub struct ChannelFeed {
	receiver: mpsc::Receiver<FeedMessage>,
}

impl ChannelFeed {
	pub fn new(receiver: mpsc::Receiver<FeedMessage>) -> Self {
		Self { receiver }
	}

	/// Creates a feed together with the sender publishing into it
	pub fn channel(capacity: usize) -> (mpsc::Sender<FeedMessage>, Self) {
		let (sender, receiver) = mpsc::channel(capacity.max(1));
		(sender, Self::new(receiver))
	}
}

#[async_trait]
impl RawTxFeed for ChannelFeed {
	async fn next_message(&mut self) -> Option<Result<FeedMessage, TransportError>> {
		self.receiver.recv().await.map(Ok)
	}
}
