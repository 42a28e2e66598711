//! Delivery of monitor notifications to the owners of the matched addresses.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::Network;
use lettre::AsyncTransport;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
	models::{TxNotification, User},
	repositories::UserRepositoryTrait,
	services::notification::{
		email::{EmailDelivery, EmailNotifier},
		payload::NotificationSummary,
		webhook::WebhookNotifier,
		NotificationError,
	},
	utils::metrics::NOTIFICATION_DELIVERIES,
};

/// A delivery channel for one user at a time
#[async_trait]
pub trait Notifier: Send + Sync {
	/// Label used in logs and metrics
	fn channel(&self) -> &'static str;

	/// Delivers `summary` to every destination `user` has on this channel.
	///
	/// Returns the number of messages sent; zero when the user has no
	/// destination on this channel or delivery was skipped.
	async fn notify_user(
		&self,
		user: &User,
		summary: &NotificationSummary,
	) -> Result<usize, NotificationError>;
}

#[async_trait]
impl Notifier for WebhookNotifier {
	fn channel(&self) -> &'static str {
		"webhook"
	}

	/// Every webhook of the user is attempted; an error is returned only when
	/// none of them accepted the notification.
	async fn notify_user(
		&self,
		user: &User,
		summary: &NotificationSummary,
	) -> Result<usize, NotificationError> {
		let payload = summary.to_json();
		let mut delivered = 0;
		let mut last_error = None;

		for target in &user.webhooks {
			match self.notify_json(target, &payload).await {
				Ok(()) => delivered += 1,
				Err(e) => {
					warn!(user_id = %user.id, url = %target.url, error = %e, "Webhook delivery failed");
					last_error = Some(e);
				}
			}
		}

		match last_error {
			Some(e) if delivered == 0 => Err(e),
			_ => Ok(delivered),
		}
	}
}

#[async_trait]
impl<T> Notifier for EmailNotifier<T>
where
	T: AsyncTransport + Send + Sync,
	T::Ok: Send + Sync,
	T::Error: std::error::Error + Send + Sync + 'static,
{
	fn channel(&self) -> &'static str {
		"email"
	}

	async fn notify_user(
		&self,
		user: &User,
		summary: &NotificationSummary,
	) -> Result<usize, NotificationError> {
		let Some(email) = &user.email else {
			return Ok(0);
		};

		match self.notify_alert(user, email, summary).await? {
			EmailDelivery::Sent => Ok(1),
			EmailDelivery::RateLimited => {
				warn!(user_id = %user.id, txid = %summary.txid, "Email skipped by daily limit");
				Ok(0)
			}
		}
	}
}

/// Outcome of delivering one notification on one channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
	pub delivered: usize,
	pub skipped: usize,
	pub failed: usize,
}

/// Routes notifications to the users owning the matched addresses
pub struct NotificationDispatcher<U: UserRepositoryTrait> {
	users: U,
	network: Network,
	app_url: Option<String>,
}

impl<U: UserRepositoryTrait> NotificationDispatcher<U> {
	pub fn new(users: U, network: Network, app_url: Option<String>) -> Self {
		Self {
			users,
			network,
			app_url,
		}
	}

	/// Delivers `notification` through `notifier` to each affected user.
	///
	/// Users are handled one after the other; a failure for one user is
	/// logged and does not prevent delivery to the others.
	pub async fn deliver<N: Notifier + ?Sized>(
		&self,
		notifier: &N,
		notification: &TxNotification,
	) -> DeliveryReport {
		let channel = notifier.channel();
		let txid = notification.txid().to_string();
		let mut report = DeliveryReport::default();

		for user_id in notification.user_ids() {
			let Some(user) = self.users.get(user_id) else {
				warn!(user_id, txid = %txid, "No user definition for matched address owner");
				report.skipped += 1;
				record(channel, "skipped");
				continue;
			};
			let Some(summary) = NotificationSummary::for_user(
				notification,
				user_id,
				self.network,
				self.app_url.as_deref(),
			) else {
				continue;
			};

			match notifier.notify_user(&user, &summary).await {
				Ok(0) => {
					report.skipped += 1;
					record(channel, "skipped");
				}
				Ok(sent) => {
					report.delivered += sent;
					record(channel, "sent");
				}
				Err(e) => {
					report.failed += 1;
					record(channel, "failed");
					warn!(channel, user_id, txid = %txid, error = %e, "Notification delivery failed");
				}
			}
		}

		debug!(channel, txid = %txid, report = ?report, "Notification dispatched");
		report
	}

	/// Delivers every notification received on `receiver` until the channel
	/// closes or shutdown is signalled
	pub async fn run<N: Notifier + ?Sized>(
		&self,
		notifier: Arc<N>,
		mut receiver: mpsc::Receiver<TxNotification>,
		mut shutdown: watch::Receiver<bool>,
	) {
		let channel = notifier.channel();
		info!(channel, "Notification dispatcher started");

		loop {
			tokio::select! {
				notification = receiver.recv() => match notification {
					Some(notification) => {
						self.deliver(notifier.as_ref(), &notification).await;
					}
					None => break,
				},
				_ = shutdown.changed() => break,
			}
		}

		info!(channel, "Notification dispatcher stopped");
	}
}

fn record(channel: &str, status: &str) {
	NOTIFICATION_DELIVERIES
		.with_label_values(&[channel, status])
		.inc();
}
