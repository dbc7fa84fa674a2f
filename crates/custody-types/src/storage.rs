//! Storage namespaces for the custody system.

use std::str::FromStr;

/// Namespaces for keys held by a storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Transfer record history, one entry per order.
	Records,
	/// Product to settlement asset mappings.
	ProductAssets,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Records => "records",
			StorageKey::ProductAssets => "product_assets",
		}
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Records, Self::ProductAssets].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"records" => Ok(Self::Records),
			"product_assets" => Ok(Self::ProductAssets),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
