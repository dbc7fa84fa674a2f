//! Translation of order lines into settlement asset amounts.
//!
//! Every ERP product is represented by one asset whose code is the configured
//! prefix followed by the zero-padded product id. Quantities are rounded to
//! `quantity_decimals` and rendered as plain decimals (`10`, `2.5`).
//! Assets are (re)issued before every transfer that uses them; the network
//! treats issuing a known asset as a no-op. The first issuance of a product
//! is recorded in storage.

use crate::{ExecutorError, SettlementInterface};
use custody_config::{AssetConfig, MAX_ASSET_CODE_LENGTH};
use custody_storage::StorageService;
use custody_types::{AssetAmount, OrderLine, ProductAsset, StorageKey};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

/// Maps products to assets and order lines to asset amounts.
pub struct AssetCatalog {
	storage: Arc<StorageService>,
	settlement: Arc<dyn SettlementInterface>,
	config: AssetConfig,
}

impl AssetCatalog {
	pub fn new(
		storage: Arc<StorageService>,
		settlement: Arc<dyn SettlementInterface>,
		config: AssetConfig,
	) -> Self {
		Self {
			storage,
			settlement,
			config,
		}
	}

	/// Asset code for a product, e.g. `ODOO00000007` for product 7.
	pub fn asset_code(&self, product_id: u64) -> Result<String, ExecutorError> {
		let prefix = &self.config.code_prefix;
		let width = MAX_ASSET_CODE_LENGTH.saturating_sub(prefix.len());
		let digits = product_id.to_string();
		if digits.len() > width {
			return Err(ExecutorError::InvalidLine(format!(
				"Product {} does not fit an asset code with prefix '{}'",
				product_id, prefix
			)));
		}
		Ok(format!("{}{:0>width$}", prefix, digits, width = width))
	}

	/// Renders a quantity as a plain decimal string.
	///
	/// The quantity is rounded half away from zero to the configured number
	/// of decimals and trailing zeros are dropped; it must stay strictly
	/// positive after rounding.
	pub fn format_quantity(&self, quantity: Decimal) -> Result<String, ExecutorError> {
		let decimals = self.config.quantity_decimals;
		let rounded =
			quantity.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
		if rounded <= Decimal::ZERO {
			return Err(ExecutorError::InvalidLine(format!(
				"Quantity {} must be positive at {} decimals",
				quantity, decimals
			)));
		}
		Ok(rounded.normalize().to_string())
	}

	/// Translates order lines into asset amounts, one per line.
	pub fn amounts(&self, lines: &[OrderLine]) -> Result<Vec<AssetAmount>, ExecutorError> {
		if lines.is_empty() {
			return Err(ExecutorError::InvalidLine(
				"No order lines to transfer".into(),
			));
		}

		lines
			.iter()
			.map(|line| {
				Ok(AssetAmount {
					asset_code: self.asset_code(line.product_id)?,
					quantity: self.format_quantity(line.quantity)?,
				})
			})
			.collect()
	}

	/// Issues the assets behind `amounts` and records unseen products.
	///
	/// `amounts` must come from [`AssetCatalog::amounts`] for the same
	/// `lines`.
	pub async fn ensure_issued(
		&self,
		lines: &[OrderLine],
		amounts: &[AssetAmount],
	) -> Result<(), ExecutorError> {
		let mut products: Vec<(u64, &str)> = Vec::new();
		for (line, amount) in lines.iter().zip(amounts) {
			if !products.iter().any(|(id, _)| *id == line.product_id) {
				products.push((line.product_id, amount.asset_code.as_str()));
			}
		}
		let codes: Vec<String> = products.iter().map(|(_, code)| code.to_string()).collect();
		tracing::debug!(assets = ?codes, "Issuing settlement assets");

		let issued = self.settlement.create_assets(&codes).await?;
		for (product_id, code) in products {
			let asset = issued
				.iter()
				.find(|asset| asset.asset_code == code)
				.ok_or_else(|| {
					ExecutorError::InvalidLine(format!(
						"Settlement network did not issue asset {}",
						code
					))
				})?;

			let id = product_id.to_string();
			if self
				.storage
				.exists(StorageKey::ProductAssets.as_str(), &id)
				.await?
			{
				continue;
			}
			tracing::info!(product_id, asset = %code, "Recording new product asset");
			let mapping = ProductAsset {
				product_id,
				asset_code: asset.asset_code.clone(),
				issuer: asset.issuer.clone(),
			};
			self.storage
				.store(StorageKey::ProductAssets.as_str(), &id, &mapping)
				.await?;
		}
		Ok(())
	}
}
