//! Bitcoin Core ZMQ feed.
//!
//! Subscribes to the node's `zmqpubrawtx` publisher. Transactions arrive already
//! decoded by `bitcoincore-zmq` and are serialized back so every feed hands the
//! monitor the same wire bytes.

use std::collections::HashMap;

use async_trait::async_trait;
use bitcoin::consensus;
use bitcoincore_zmq::{subscribe_async, Message};
use futures::{stream::BoxStream, StreamExt};
use tracing::{debug, info};

use crate::{
	models::ZmqConfig,
	services::transport::{
		error::TransportError,
		feed::{FeedMessage, RawTxFeed},
	},
};

pub struct ZmqFeed {
	endpoint: String,
	stream: BoxStream<'static, Result<Message, bitcoincore_zmq::Error>>,
}

impl ZmqFeed {
	/// Connects to the publisher of `config`
	pub fn subscribe(config: &ZmqConfig) -> Result<Self, TransportError> {
		let endpoint = config.endpoint();
		let stream = subscribe_async(&[endpoint.as_str()]).map_err(|e| {
			TransportError::subscription_failed(
				"Failed to subscribe to raw transaction feed",
				Some(Box::new(e)),
				Some(HashMap::from([("endpoint".to_string(), endpoint.clone())])),
			)
		})?;

		info!(endpoint = %endpoint, "Subscribed to raw transaction feed");
		Ok(Self {
			endpoint,
			stream: stream.boxed(),
		})
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}
}

#[async_trait]
impl RawTxFeed for ZmqFeed {
	async fn next_message(&mut self) -> Option<Result<FeedMessage, TransportError>> {
		let message = self.stream.next().await?;
		Some(match message {
			Ok(Message::Tx(tx, sequence)) => {
				debug!(sequence, txid = %tx.compute_txid(), "Raw transaction received");
				Ok(FeedMessage::raw_tx(consensus::serialize(&tx)))
			}
			Ok(other) => Ok(FeedMessage::new(other.topic_str(), Vec::new())),
			Err(e) => Err(TransportError::stream_error(
				"Failed to receive from raw transaction feed",
				Some(Box::new(e)),
				Some(HashMap::from([(
					"endpoint".to_string(),
					self.endpoint.clone(),
				)])),
			)),
		})
	}
}
