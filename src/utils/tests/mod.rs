//! Test helper utilities
//!
//! This module contains test helper utilities for the application.
//!
//! - `builders`: Test helper utilities for creating test instances of models
//! - `http`: Test helper utilities for creating HTTP clients

pub mod builders {
	pub mod address;
	pub mod transaction;
	pub mod user;
}


pub use builders::*;
pub use http::*;
