//! Parsing utilities
//!
//! Small helpers for turning configuration strings into usable values.

use byte_unit::Byte;
use std::str::FromStr;

/// Parses a human-readable size ("1GB", "500MB", "1024KiB") into bytes.
pub fn parse_string_to_bytes_size(s: &str) -> Result<u64, String> {
	match Byte::from_str(s) {
		Ok(byte) => Ok(byte.as_u64()),
		Err(e) => Err(format!("Invalid size format: '{}'. Error: {}", s, e)),
	}
}

/// Trims and lowercases a string for case-insensitive matching of option values.
pub fn normalize_string(input: &str) -> String {
	input.trim().to_lowercase()
}

/// Parses the usual truthy/falsy spellings found in environment files.
pub fn parse_bool_flag(input: &str) -> Option<bool> {
	match normalize_string(input).as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" | "" => Some(false),
		_ => None,
	}
}
