//! Settlement module for the order custody system.
//!
//! Each custody stage moves an order's goods, represented as assets on an
//! external settlement network, between custody roles. This crate defines the
//! seam to that network, the translation of order lines into asset amounts,
//! and the executor that drives one transfer per stage with retries on
//! transient failures.

use async_trait::async_trait;
use custody_types::{
	AssetAmount, ConfigSchema, ImplementationRegistry, IssuedAsset, SettlementReceipt, Stage,
	TransferRoute,
};
use thiserror::Error;

pub mod assets;
pub mod executor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export implementations
pub mod implementations {
	pub mod simulated;
}

pub use assets::AssetCatalog;
pub use executor::{ExecutorError, TransferExecutor};

/// Errors reported by a settlement network.
#[derive(Debug, Error)]
pub enum SettlementError {
	/// The network did not answer in time.
	#[error("Settlement timed out: {0}")]
	Timeout(String),
	/// The network refused the submission for an insufficient fee.
	#[error("Insufficient fee: {0}")]
	InsufficientFee(String),
	/// The network refused the transfer on business grounds.
	#[error("Transfer rejected: {0}")]
	Rejected(String),
	/// Connection or protocol failure talking to the network.
	#[error("Network error: {0}")]
	Network(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
	#[error("Asset creation failed: {0}")]
	AssetCreation(String),
}

impl SettlementError {
	/// Whether the same transfer may simply be submitted again.
	///
	/// Only timeouts and insufficient-fee refusals qualify; every other error
	/// is terminal for the stage.
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			SettlementError::Timeout(_) | SettlementError::InsufficientFee(_)
		)
	}
}

/// Client of an external settlement network.
#[async_trait]
pub trait SettlementInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Issues the given asset codes, returning them with their issuer.
	///
	/// Issuing an asset that already exists must succeed and return it again.
	async fn create_assets(&self, codes: &[String]) -> Result<Vec<IssuedAsset>, SettlementError>;

	/// Moves `amounts` along `route` as one transaction for `stage`.
	async fn transfer(
		&self,
		stage: Stage,
		route: TransferRoute,
		amounts: &[AssetAmount],
	) -> Result<SettlementReceipt, SettlementError>;
}

/// Type alias for settlement factory functions.
pub type SettlementFactory =
	fn(&toml::Value) -> Result<Box<dyn SettlementInterface>, SettlementError>;

/// Registry trait for settlement implementations.
pub trait SettlementRegistry: ImplementationRegistry<Factory = SettlementFactory> {}

/// Get all registered settlement implementations.
pub fn get_all_implementations() -> Vec<(&'static str, SettlementFactory)> {
	use implementations::simulated;

	vec![(simulated::Registry::NAME, simulated::Registry::factory())]
}
