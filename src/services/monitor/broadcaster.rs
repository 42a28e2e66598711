//! Notification fan-out to independent subscriber channels.

use tokio::sync::{
	mpsc::{self, error::TrySendError},
	watch, Mutex,
};
use tracing::{debug, warn};

use crate::{
	models::{FanOutMode, TxNotification},
	utils::metrics::{NOTIFICATIONS_DROPPED, NOTIFICATIONS_EMITTED},
};

/// Registry of subscriber channels.
///
/// Every notification goes to each subscriber in registration order. In
/// blocking mode a full channel holds the producer back until it has room;
/// in non-blocking mode the notification is dropped for that subscriber.
/// Subscribers whose receiver was dropped are removed.
pub struct NotificationBroadcaster {
	mode: FanOutMode,
	buffer: usize,
	subscribers: Mutex<Vec<mpsc::Sender<TxNotification>>>,
}

impl NotificationBroadcaster {
	pub fn new(buffer: usize, mode: FanOutMode) -> Self {
		Self {
			mode,
			buffer: buffer.max(1),
			subscribers: Mutex::new(Vec::new()),
		}
	}

	pub fn mode(&self) -> FanOutMode {
		self.mode
	}

	/// Registers a new subscriber
	pub async fn subscribe(&self) -> mpsc::Receiver<TxNotification> {
		let (sender, receiver) = mpsc::channel(self.buffer);
		let mut subscribers = self.subscribers.lock().await;
		subscribers.push(sender);
		debug!(subscribers = subscribers.len(), "Notification subscriber added");
		receiver
	}

	pub async fn subscriber_count(&self) -> usize {
		self.subscribers.lock().await.len()
	}

	/// Sends `notification` to every subscriber.
	///
	/// Returns the number of subscribers that received it. A blocking send is
	/// abandoned when shutdown is signalled.
	pub async fn broadcast(
		&self,
		notification: &TxNotification,
		shutdown: &mut watch::Receiver<bool>,
	) -> usize {
		// Sends happen outside the lock so subscribing never waits on a slow consumer
		let subscribers = self.subscribers.lock().await.clone();
		let mut delivered = 0;
		let mut closed = false;

		for subscriber in &subscribers {
			match self.mode {
				FanOutMode::Blocking => {
					tokio::select! {
						result = subscriber.send(notification.clone()) => match result {
							Ok(()) => delivered += 1,
							Err(_) => closed = true,
						},
						_ = shutdown.changed() => {
							debug!("Broadcast interrupted by shutdown");
							break;
						}
					}
				}
				FanOutMode::NonBlocking => match subscriber.try_send(notification.clone()) {
					Ok(()) => delivered += 1,
					Err(TrySendError::Full(_)) => {
						NOTIFICATIONS_DROPPED.inc();
						warn!(
							txid = %notification.txid(),
							"Subscriber channel full, notification dropped"
						);
					}
					Err(TrySendError::Closed(_)) => closed = true,
				},
			}
		}

		if closed {
			let mut subscribers = self.subscribers.lock().await;
			subscribers.retain(|s| !s.is_closed());
			debug!(subscribers = subscribers.len(), "Closed subscribers pruned");
		}

		if delivered > 0 {
			NOTIFICATIONS_EMITTED.inc();
		}
		delivered
	}
}
