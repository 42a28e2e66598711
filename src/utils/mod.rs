//! Utility modules for common functionality.
//!
//! - client_storage: Get-or-create storage for shared clients
//! - constants: Constants for the application
//! - http: HTTP client utilities (i.e. creation retryable HTTP clients)
//! - logging: Logging utilities
//! - metrics: Metrics utilities
//! - parsing: Parsing utilities
//! - tests: Test utilities

pub mod client_storage;
pub mod constants;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod parsing;
pub mod tests;

pub use client_storage::ClientStorage;
pub use constants::*;
pub use http::*;
pub use parsing::*;
