//! Security models
//!
//! - `secret`: zeroizing secret strings and their sources

mod secret;

pub use secret::{SecretString, SecretValue};
