//! Constants shared across services.

/// Satoshis in one bitcoin
pub const SATOSHIS_PER_BITCOIN: u64 = 100_000_000;

/// ZMQ topic carrying serialized transactions
pub const RAW_TX_TOPIC: &str = "rawtx";

/// Non-hardened branch index of receiving addresses
pub const EXTERNAL_BRANCH: u32 = 0;

/// Non-hardened branch index of change addresses
pub const CHANGE_BRANCH: u32 = 1;

/// Addresses derived per branch when expanding an extended key
pub const DEFAULT_GAP: u32 = 5;

/// Pending scan requests the queue absorbs before refusing new ones
pub const DEFAULT_SCAN_QUEUE_CAPACITY: usize = 10_000;

/// Per-subscriber notification buffer
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1;

/// Protocol version advertised to the Electrum server
pub const ELECTRUM_PROTOCOL_VERSION: &str = "1.4";

/// Client name advertised to the Electrum server
pub const ELECTRUM_CLIENT_NAME: &str = "satwatch";

/// Header carrying the HMAC signature of a webhook body
pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Signature";

/// Header carrying the millisecond timestamp mixed into the webhook signature
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "X-Timestamp";
