//! Gap-bounded expansion of an extended key into watched addresses.

use crate::{
	models::Branch,
	services::derivation::{error::DerivationError, key::ExtendedPubKey},
};

/// One address produced by an expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
	pub branch: Branch,
	pub index: u32,
	pub address: String,
}

/// Deterministic sequence of `(branch, index)` pairs for indices `0..gap`.
///
/// For every index the external address comes first, then the change address:
/// `(External, 0), (Change, 0), (External, 1), (Change, 1), ...`.
#[derive(Debug, Clone)]
pub struct ExtendedKeyExpansion {
	gap: u32,
	next: u64,
}

impl ExtendedKeyExpansion {
	pub fn new(gap: u32) -> Self {
		Self { gap, next: 0 }
	}

	/// Derives every address of the expansion with `key`.
	pub fn derive_all(self, key: &ExtendedPubKey) -> Result<Vec<DerivedAddress>, DerivationError> {
		self.map(|(branch, index)| {
			key.derive_address(branch, index)
				.map(|address| DerivedAddress {
					branch,
					index,
					address,
				})
		})
		.collect()
	}
}

impl Iterator for ExtendedKeyExpansion {
	type Item = (Branch, u32);

	fn next(&mut self) -> Option<Self::Item> {
		let total = u64::from(self.gap) * 2;
		if self.next >= total {
			return None;
		}
		let index = (self.next / 2) as u32;
		let branch = Branch::ALL[(self.next % 2) as usize];
		self.next += 1;
		Some((branch, index))
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		let remaining = (u64::from(self.gap) * 2).saturating_sub(self.next) as usize;
		(remaining, Some(remaining))
	}
}

impl ExactSizeIterator for ExtendedKeyExpansion {}
