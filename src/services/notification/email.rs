//! Email notification implementation.
//!
//! Sends HTML messages rendered from Markdown through SMTP, encrypted with
//! OpenPGP when the user registered a public key. Alert emails are limited per
//! user and watched address over a rolling 24 hour window.

use backon::{BackoffBuilder, ExponentialBuilder, Retryable};
use chrono::{DateTime, TimeDelta, Utc};
use email_address::EmailAddress;
use lettre::{
	message::{
		header::{ContentDisposition, ContentType},
		Mailbox, MessageBuilder, MultiPart, SinglePart,
	},
	transport::smtp::Error as SmtpError,
	AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use pulldown_cmark::{html, Options, Parser};
use std::{
	collections::{HashMap, VecDeque},
	error::Error as StdError,
	str::FromStr,
	sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
	models::User,
	services::notification::{
		payload::NotificationSummary,
		pgp::{encrypt_armored, parse_public_key},
		NotificationError,
	},
	utils::{JitterSetting, RetryConfig},
};

/// Alert emails sent per user and address within the rolling window. An alert
/// still goes out while at most 10 earlier ones were sent.
pub const DAILY_EMAIL_LIMIT: u32 = 11;

/// Sent count above which alerts carry a notice about the limit
pub const DAILY_EMAIL_WARNING: u32 = 7;

/// Outcome of an alert email
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailDelivery {
	Sent,
	/// Every matched address already reached the daily limit
	RateLimited,
}

/// Room left for one address before the limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmailAllowance {
	/// Alerts already sent in the window
	pub sent: u32,
	/// Alerts still allowed after this one
	pub remaining: u32,
	/// Whether the alert should mention the limit
	pub show_warning: bool,
}

/// Successful alert sends per (user, address) within a rolling window
#[derive(Debug)]
pub struct EmailRateLimiter {
	limit: u32,
	warning: u32,
	window: TimeDelta,
	sent: Mutex<HashMap<(String, String), VecDeque<DateTime<Utc>>>>,
}

impl Default for EmailRateLimiter {
	fn default() -> Self {
		Self::new(DAILY_EMAIL_LIMIT, DAILY_EMAIL_WARNING)
	}
}

impl EmailRateLimiter {
	pub fn new(limit: u32, warning: u32) -> Self {
		Self {
			limit,
			warning,
			window: TimeDelta::hours(24),
			sent: Mutex::new(HashMap::new()),
		}
	}

	pub fn limit(&self) -> u32 {
		self.limit
	}

	/// Allowance for one more alert at `now`, None once the limit is reached
	pub async fn allowance_at(
		&self,
		user_id: &str,
		address_id: &str,
		now: DateTime<Utc>,
	) -> Option<EmailAllowance> {
		let sent = self.count_at(user_id, address_id, now).await;
		if sent >= self.limit {
			return None;
		}
		Some(EmailAllowance {
			sent,
			remaining: self.limit - sent - 1,
			show_warning: sent > self.warning,
		})
	}

	/// Records an alert delivered at `at`
	pub async fn record_at(&self, user_id: &str, address_id: &str, at: DateTime<Utc>) {
		self.sent
			.lock()
			.await
			.entry((user_id.to_string(), address_id.to_string()))
			.or_default()
			.push_back(at);
	}

	/// Alerts recorded within the window ending at `now`
	pub async fn count_at(&self, user_id: &str, address_id: &str, now: DateTime<Utc>) -> u32 {
		let mut sent = self.sent.lock().await;
		let key = (user_id.to_string(), address_id.to_string());
		let Some(times) = sent.get_mut(&key) else {
			return 0;
		};

		let cutoff = now - self.window;
		while times.front().is_some_and(|t| *t <= cutoff) {
			times.pop_front();
		}
		if times.is_empty() {
			sent.remove(&key);
			return 0;
		}
		times.iter().filter(|t| **t <= now).count() as u32
	}
}

/// Implementation of email notifications via SMTP
#[derive(Debug)]
pub struct EmailNotifier<T: AsyncTransport + Send + Sync> {
	/// SMTP client for email delivery
	client: Arc<T>,
	/// Email sender
	sender: Mailbox,
	/// Retry policy for SMTP requests
	retry_policy: RetryConfig,
	limiter: EmailRateLimiter,
}

impl<T: AsyncTransport + Send + Sync> EmailNotifier<T>
where
	T::Ok: Send + Sync,
	T::Error: StdError + Send + Sync + 'static,
{
	/// Creates a notifier sending from `sender` through `client`
	pub fn with_client(
		client: Arc<T>,
		sender: &str,
		retry_policy: RetryConfig,
	) -> Result<Self, NotificationError> {
		let sender = Mailbox::from_str(sender).map_err(|e| {
			NotificationError::config_error(
				format!("Invalid sender address: {}", sender),
				Some(e.into()),
				None,
			)
		})?;

		Ok(Self {
			client,
			sender,
			retry_policy,
			limiter: EmailRateLimiter::default(),
		})
	}

	/// Creates a notifier owning `transport`
	pub fn with_transport(
		transport: T,
		sender: &str,
		retry_policy: RetryConfig,
	) -> Result<Self, NotificationError> {
		Self::with_client(Arc::new(transport), sender, retry_policy)
	}

	/// Replaces the default limiter
	pub fn with_rate_limiter(mut self, limiter: EmailRateLimiter) -> Self {
		self.limiter = limiter;
		self
	}

	pub fn rate_limiter(&self) -> &EmailRateLimiter {
		&self.limiter
	}

	/// Sends the alert for `summary` to `recipient` on behalf of `user`.
	///
	/// Only addresses under the limit count the alert; the alert is skipped
	/// when none is. A send that fails counts against no address.
	pub async fn notify_alert(
		&self,
		user: &User,
		recipient: &str,
		summary: &NotificationSummary,
	) -> Result<EmailDelivery, NotificationError> {
		let now = Utc::now();
		let mut allowed = Vec::new();
		let mut notice: Option<u32> = None;

		for address in &summary.addresses {
			match self.limiter.allowance_at(&user.id, &address.id, now).await {
				Some(allowance) => {
					if allowance.show_warning {
						warn!(
							user_id = %user.id,
							address_id = %address.id,
							sent = allowance.sent,
							limit = self.limiter.limit(),
							"Address is close to the daily email limit"
						);
						notice = Some(notice.map_or(allowance.remaining, |r| r.min(allowance.remaining)));
					}
					allowed.push(address.id.as_str());
				}
				None => warn!(
					user_id = %user.id,
					address_id = %address.id,
					txid = %summary.txid,
					limit = self.limiter.limit(),
					"Daily email limit reached for address"
				),
			}
		}

		if allowed.is_empty() {
			return Ok(EmailDelivery::RateLimited);
		}

		let mut body = summary.to_markdown();
		if let Some(remaining) = notice {
			body.push_str(&limit_notice(remaining));
		}

		match user.pgp_pubkey.as_deref() {
			Some(key) => {
				self.notify_encrypted(recipient, &summary.subject(), &body, key)
					.await?
			}
			None => self.notify(recipient, &summary.subject(), &body).await?,
		}

		for address_id in allowed {
			self.limiter.record_at(&user.id, address_id, now).await;
		}
		Ok(EmailDelivery::Sent)
	}

	/// Sends `markdown_body` rendered as HTML to `recipient`
	pub async fn notify(
		&self,
		recipient: &str,
		subject: &str,
		markdown_body: &str,
	) -> Result<(), NotificationError> {
		let email = self
			.message(recipient, subject)?
			.header(ContentType::TEXT_HTML)
			.body(markdown_to_html(markdown_body))
			.map_err(|e| build_error(recipient, e))?;

		self.send(recipient, email).await
	}

	/// Sends `markdown_body` rendered as HTML to `recipient` as PGP/MIME,
	/// encrypted to `armored_key`
	pub async fn notify_encrypted(
		&self,
		recipient: &str,
		subject: &str,
		markdown_body: &str,
		armored_key: &str,
	) -> Result<(), NotificationError> {
		let builder = self.message(recipient, subject)?;
		let key = parse_public_key(armored_key)?;
		let inner = SinglePart::html(markdown_to_html(markdown_body)).formatted();
		let armored = encrypt_armored(&key, &inner)?;

		let control_type = ContentType::parse("application/pgp-encrypted")
			.map_err(|e| build_error(recipient, e))?;
		let payload_type = ContentType::parse("application/octet-stream; name=\"encrypted.asc\"")
			.map_err(|e| build_error(recipient, e))?;

		let body = MultiPart::encrypted("application/pgp-encrypted".to_string())
			.singlepart(
				SinglePart::builder()
					.header(control_type)
					.body(String::from("Version: 1\r\n")),
			)
			.singlepart(
				SinglePart::builder()
					.header(payload_type)
					.header(ContentDisposition::inline_with_name("encrypted.asc"))
					.body(armored),
			);

		let email = builder
			.multipart(body)
			.map_err(|e| build_error(recipient, e))?;

		self.send(recipient, email).await
	}

	/// Validates `recipient` and starts a message to it
	fn message(&self, recipient: &str, subject: &str) -> Result<MessageBuilder, NotificationError> {
		if !EmailAddress::is_valid(recipient) {
			return Err(NotificationError::config_error(
				"Invalid recipient address",
				None,
				Some(recipient_metadata(recipient)),
			));
		}
		let to = Mailbox::from_str(recipient).map_err(|e| {
			NotificationError::config_error(
				"Invalid recipient address",
				Some(e.into()),
				Some(recipient_metadata(recipient)),
			)
		})?;

		Ok(Message::builder()
			.from(self.sender.clone())
			.reply_to(self.sender.clone())
			.to(to)
			.subject(subject))
	}

	async fn send(&self, recipient: &str, email: Message) -> Result<(), NotificationError> {
		let operation = || async {
			self.client.send(email.clone()).await.map_err(|e| {
				NotificationError::notify_failed(
					format!("Failed to send email: {}", e),
					Some(Box::new(e)),
					Some(recipient_metadata(recipient)),
				)
			})?;

			Ok(())
		};

		let backoff = ExponentialBuilder::default()
			.with_min_delay(self.retry_policy.initial_backoff)
			.with_max_delay(self.retry_policy.max_backoff);

		let backoff_with_jitter = match self.retry_policy.jitter {
			JitterSetting::Full => backoff.with_jitter(),
			JitterSetting::None => backoff,
		};

		// Permanent SMTP rejections are not retried
		let should_retry = |e: &NotificationError| -> bool {
			if let NotificationError::NotifyFailed(context) = e {
				if let Some(source) = context.source() {
					if let Some(smtp_error) = source.downcast_ref::<SmtpError>() {
						return !smtp_error.is_permanent();
					}
				}
			}
			true
		};

		operation
			.retry(
				backoff_with_jitter
					.build()
					.take(self.retry_policy.max_retries as usize),
			)
			.when(should_retry)
			.await?;

		debug!(recipient, "Email delivered");
		Ok(())
	}
}

fn recipient_metadata(recipient: &str) -> HashMap<String, String> {
	HashMap::from([("recipient".to_string(), recipient.to_string())])
}

fn build_error(
	recipient: &str,
	e: impl StdError + Send + Sync + 'static,
) -> NotificationError {
	NotificationError::notify_failed(
		format!("Failed to build email message: {}", e),
		Some(Box::new(e)),
		Some(recipient_metadata(recipient)),
	)
}

/// Markdown paragraph telling the user how many alerts remain today
fn limit_notice(remaining: u32) -> String {
	match remaining {
		0 => "\n**This is the last alert for this address in the next 24 hours.**\n".to_string(),
		n => format!(
			"\n**Only {} more alert{} for this address in the next 24 hours.**\n",
			n,
			if n == 1 { "" } else { "s" }
		),
	}
}

/// SMTP-backed notifier used in production
pub type SmtpEmailNotifier = EmailNotifier<AsyncSmtpTransport<Tokio1Executor>>;

/// Convert a Markdown string into HTML
pub fn markdown_to_html(md: &str) -> String {
	let parser = Parser::new_ext(md, Options::all());

	let mut html_out = String::new();
	html::push_html(&mut html_out, parser);
	html_out
}
