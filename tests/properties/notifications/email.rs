//! Property-based tests for the alert email limit and amount formatting.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use proptest::{prelude::*, test_runner::Config};

use satwatch_monitor::services::notification::{
	format_btc, markdown_to_html, EmailRateLimiter, DAILY_EMAIL_LIMIT, DAILY_EMAIL_WARNING,
};

use crate::properties::strategies::amount_strategy;

fn minute(offset: u32) -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(i64::from(offset))
}

fn runtime() -> tokio::runtime::Runtime {
	tokio::runtime::Builder::new_current_thread()
		.build()
		.unwrap()
}

proptest! {
	#![proptest_config(Config {
		failure_persistence: None,
		..Config::default()
	})]

	/// No address ever gets more than the limit within any 24 hour window.
	#[test]
	fn test_limit_is_never_exceeded(
		gaps in prop::collection::vec(0u32..600, 0..60),
		addresses in prop::collection::vec(0usize..3, 60)
	) {
		let limiter = EmailRateLimiter::default();
		runtime().block_on(async {
			let mut now = 0;
			let mut sent: Vec<(usize, u32)> = Vec::new();
			for (gap, address) in gaps.iter().zip(&addresses) {
				now += gap;
				let id = address.to_string();
				if limiter.allowance_at("alice", &id, minute(now)).await.is_some() {
					limiter.record_at("alice", &id, minute(now)).await;
					sent.push((*address, now));
				}
			}
			for (address, at) in &sent {
				let in_window = sent
					.iter()
					.filter(|(a, t)| a == address && *t <= *at && at - t < 24 * 60)
					.count();
				assert!(in_window <= DAILY_EMAIL_LIMIT as usize);
			}
		});
	}

	/// Sends older than 24 hours stop counting.
	#[test]
	fn test_window_expires(start in 0u32..10_000, spread in 0u32..(24 * 60)) {
		let limiter = EmailRateLimiter::default();
		runtime().block_on(async {
			for i in 0..DAILY_EMAIL_LIMIT {
				limiter.record_at("bob", "a", minute(start + spread * i / DAILY_EMAIL_LIMIT)).await;
			}
			let last = start + spread * (DAILY_EMAIL_LIMIT - 1) / DAILY_EMAIL_LIMIT;
			assert!(limiter.allowance_at("bob", "a", minute(last)).await.is_none());
			assert_eq!(limiter.count_at("bob", "a", minute(last + 24 * 60)).await, 0);
		});
	}

	/// The warning shows exactly when more than the threshold were sent.
	#[test]
	fn test_warning_threshold(sent in 0u32..DAILY_EMAIL_LIMIT) {
		let limiter = EmailRateLimiter::new(DAILY_EMAIL_LIMIT, DAILY_EMAIL_WARNING);
		runtime().block_on(async {
			for _ in 0..sent {
				limiter.record_at("carol", "a", minute(0)).await;
			}
			let allowance = limiter.allowance_at("carol", "a", minute(1)).await.unwrap();
			assert_eq!(allowance.show_warning, sent > DAILY_EMAIL_WARNING);
			assert_eq!(allowance.remaining, DAILY_EMAIL_LIMIT - sent - 1);
		});
	}

	/// Formatting keeps eight decimals and loses no satoshi.
	#[test]
	fn test_format_btc_round_trips(sat in amount_strategy()) {
		let formatted = format_btc(sat);
		let (whole, fraction) = formatted.split_once('.').unwrap();
		prop_assert_eq!(fraction.len(), 8);

		let whole: u64 = whole.parse().unwrap();
		let fraction: u64 = fraction.parse().unwrap();
		prop_assert_eq!(whole * 100_000_000 + fraction, sat);
	}

	/// Plain text survives the Markdown rendering.
	#[test]
	fn test_markdown_keeps_plain_text(text in "[a-zA-Z0-9]{1,40}( [a-zA-Z0-9]{1,40}){0,5}") {
		let html = markdown_to_html(&text);
		prop_assert!(html.contains(&text));
	}
}
