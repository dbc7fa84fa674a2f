//! ERP module for the order custody system.
//!
//! The ERP owns order contents. Stage requests either carry explicit lines,
//! name ERP line identifiers, or refer to the whole order; this crate turns
//! each of those into the product quantities the settlement side transfers.

use async_trait::async_trait;
use custody_types::{
	ConfigSchema, ImplementationRegistry, LineId, LineSelection, OrderId, OrderLine,
};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod fixture;
}

/// Errors that can occur while resolving order lines.
#[derive(Debug, Error)]
pub enum ErpError {
	/// The order or line does not exist in the ERP.
	#[error("Not found: {0}")]
	NotFound(String),
	/// The ERP could not be reached or answered with garbage.
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Read access to order lines in an ERP.
#[async_trait]
pub trait ErpInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Every line of an order as product quantities.
	async fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>, ErpError>;

	/// The product quantities behind the given line identifiers.
	async fn products_for_lines(&self, line_ids: &[LineId]) -> Result<Vec<OrderLine>, ErpError>;
}

/// Type alias for ERP factory functions.
pub type ErpFactory = fn(&toml::Value) -> Result<Box<dyn ErpInterface>, ErpError>;

/// Registry trait for ERP implementations.
pub trait ErpRegistry: ImplementationRegistry<Factory = ErpFactory> {}

/// Get all registered ERP implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ErpFactory)> {
	use implementations::fixture;

	vec![(fixture::Registry::NAME, fixture::Registry::factory())]
}

/// Resolves the order lines a stage transition moves.
pub struct OrderLineService {
	erp: Box<dyn ErpInterface>,
}

impl OrderLineService {
	pub fn new(erp: Box<dyn ErpInterface>) -> Self {
		Self { erp }
	}

	/// Turns a line selection into product quantities.
	///
	/// Explicit lines are returned as given; the ERP is only consulted for
	/// identifiers or whole orders.
	pub async fn resolve(
		&self,
		order_id: OrderId,
		selection: LineSelection,
	) -> Result<Vec<OrderLine>, ErpError> {
		match selection {
			LineSelection::Lines(lines) => Ok(lines),
			LineSelection::LineIds(ids) => self.erp.products_for_lines(&ids).await,
			LineSelection::FromOrder => self.erp.order_lines(order_id).await,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::fixture::FixtureErp;
	use rust_decimal::Decimal;

	fn service() -> OrderLineService {
		let config: toml::Value = toml::from_str(
			r#"
[orders]
"100" = [1, 2]

[lines.1]
product_id = 7
quantity = "10"

[lines.2]
product_id = 8
quantity = "2.5"
"#,
		)
		.unwrap();
		OrderLineService::new(Box::new(FixtureErp::from_config(&config).unwrap()))
	}

	#[tokio::test]
	async fn test_explicit_lines_bypass_erp() {
		let lines = vec![OrderLine::new(99, Decimal::ONE)];
		let resolved = service()
			.resolve(500, LineSelection::Lines(lines.clone()))
			.await
			.unwrap();
		assert_eq!(resolved, lines);
	}

	#[tokio::test]
	async fn test_line_ids_and_whole_order() {
		let service = service();

		let by_id = service
			.resolve(100, LineSelection::LineIds(vec![2]))
			.await
			.unwrap();
		assert_eq!(by_id, vec![OrderLine::new(8, Decimal::new(25, 1))]);

		let whole = service.resolve(100, LineSelection::FromOrder).await.unwrap();
		assert_eq!(whole.len(), 2);
		assert_eq!(whole[0].product_id, 7);
	}

	#[tokio::test]
	async fn test_unknown_order_is_not_found() {
		let result = service().resolve(404, LineSelection::FromOrder).await;
		assert!(matches!(result, Err(ErpError::NotFound(_))));
	}
}
