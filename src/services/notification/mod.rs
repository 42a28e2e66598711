//! Notification delivery.
//!
//! Notifications produced by the transaction monitor are rendered per user and
//! delivered by email and to the user's webhooks. Each channel is driven by its
//! own dispatcher task subscribed to the monitor.

mod dispatcher;
mod email;
mod error;
mod payload;
mod pgp;
mod pool;
mod webhook;

pub use dispatcher::{DeliveryReport, NotificationDispatcher, Notifier};
pub use email::{
	markdown_to_html, EmailAllowance, EmailDelivery, EmailNotifier, EmailRateLimiter, SmtpEmailNotifier,
	DAILY_EMAIL_LIMIT, DAILY_EMAIL_WARNING,
};
pub use error::NotificationError;
pub use payload::{explorer_url, format_btc, AddressSummary, Direction, NotificationSummary};
pub use pgp::{encrypt_armored, parse_public_key};
pub use pool::{NotificationClientPool, NotificationPoolError};
pub use webhook::{sign_payload, sign_payload_at, WebhookNotifier};
