//! ERP backed by tables in the configuration file.
//!
//! Orders map to line identifiers and lines map to a product and quantity:
//!
//! ```toml
//! [erp.implementations.fixture.orders]
//! "100" = [1]
//! [erp.implementations.fixture.lines.1]
//! product_id = 7
//! quantity = "10"
//! ```

use crate::{ErpError, ErpInterface};
use async_trait::async_trait;
use custody_types::{
	ConfigSchema, Field, FieldType, LineId, OrderId, OrderLine, Schema, ValidationError,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

/// ERP whose orders and lines are fixed at construction.
#[derive(Debug, Default)]
pub struct FixtureErp {
	orders: HashMap<OrderId, Vec<LineId>>,
	lines: HashMap<LineId, OrderLine>,
}

fn parse_id(key: &str, what: &str) -> Result<u64, ErpError> {
	key.parse::<u64>()
		.map_err(|e| ErpError::Configuration(format!("Invalid {} id '{}': {}", what, key, e)))
}

impl FixtureErp {
	/// Builds the fixture from an already validated table.
	pub fn from_config(config: &toml::Value) -> Result<Self, ErpError> {
		let mut erp = FixtureErp::default();

		if let Some(orders) = config.get("orders").and_then(|v| v.as_table()) {
			for (key, value) in orders {
				let order_id = parse_id(key, "order")?;
				let line_ids = value
					.as_array()
					.map(|ids| {
						ids.iter()
							.filter_map(|id| id.as_integer())
							.map(|id| id as LineId)
							.collect()
					})
					.unwrap_or_default();
				erp.orders.insert(order_id, line_ids);
			}
		}

		if let Some(lines) = config.get("lines").and_then(|v| v.as_table()) {
			for (key, value) in lines {
				let line_id = parse_id(key, "line")?;
				let product_id = value
					.get("product_id")
					.and_then(|v| v.as_integer())
					.ok_or_else(|| {
						ErpError::Configuration(format!("Line {} has no product_id", line_id))
					})?;
				let quantity = value
					.get("quantity")
					.and_then(|v| v.as_str())
					.ok_or_else(|| {
						ErpError::Configuration(format!("Line {} has no quantity", line_id))
					})?;
				let quantity = Decimal::from_str(quantity).map_err(|e| {
					ErpError::Configuration(format!(
						"Line {} has invalid quantity '{}': {}",
						line_id, quantity, e
					))
				})?;
				erp.lines
					.insert(line_id, OrderLine::new(product_id as u64, quantity));
			}
		}

		for (order_id, line_ids) in &erp.orders {
			if let Some(missing) = line_ids.iter().find(|id| !erp.lines.contains_key(*id)) {
				return Err(ErpError::Configuration(format!(
					"Order {} references unknown line {}",
					order_id, missing
				)));
			}
		}

		Ok(erp)
	}
}

#[async_trait]
impl ErpInterface for FixtureErp {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FixtureErpSchema)
	}

	async fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>, ErpError> {
		let line_ids = self
			.orders
			.get(&order_id)
			.ok_or_else(|| ErpError::NotFound(format!("order {}", order_id)))?;
		self.products_for_lines(line_ids).await
	}

	async fn products_for_lines(&self, line_ids: &[LineId]) -> Result<Vec<OrderLine>, ErpError> {
		line_ids
			.iter()
			.map(|id| {
				self.lines
					.get(id)
					.cloned()
					.ok_or_else(|| ErpError::NotFound(format!("order line {}", id)))
			})
			.collect()
	}
}

/// Configuration schema for FixtureErp.
pub struct FixtureErpSchema;

impl ConfigSchema for FixtureErpSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let non_negative = || FieldType::Integer {
			min: Some(0),
			max: None,
		};
		let line = Schema::new(
			vec![
				Field::new("product_id", non_negative()),
				Field::new("quantity", FieldType::String).with_validator(|v| {
					match v.as_str().map(Decimal::from_str) {
						Some(Ok(_)) => Ok(()),
						_ => Err("quantity must be a decimal string".into()),
					}
				}),
			],
			vec![],
		);

		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"orders",
					FieldType::Map(Box::new(FieldType::Array(Box::new(non_negative())))),
				),
				Field::new("lines", FieldType::Map(Box::new(FieldType::Table(line)))),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a fixture ERP from configuration.
///
/// Optional configuration parameters:
/// - `orders`: table of order id to an array of line ids
/// - `lines`: table of line id to `{ product_id, quantity }`
pub fn create_erp(config: &toml::Value) -> Result<Box<dyn ErpInterface>, ErpError> {
	FixtureErpSchema
		.validate(config)
		.map_err(|e| ErpError::Configuration(format!("Invalid configuration: {}", e)))?;

	let erp = FixtureErp::from_config(config)?;
	tracing::debug!(
		orders = erp.orders.len(),
		lines = erp.lines.len(),
		"Loaded fixture ERP"
	);
	Ok(Box::new(erp))
}

/// Registry for the fixture ERP implementation.
pub struct Registry;

impl custody_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "fixture";
	type Factory = crate::ErpFactory;

	fn factory() -> Self::Factory {
		create_erp
	}
}

impl crate::ErpRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(input: &str) -> toml::Value {
		toml::from_str(input).unwrap()
	}

	#[test]
	fn test_empty_fixture_is_valid() {
		assert!(create_erp(&parse("")).is_ok());
	}

	#[test]
	fn test_numeric_quantity_rejected() {
		let config = parse("[lines.1]\nproduct_id = 7\nquantity = 10\n");
		assert!(matches!(
			create_erp(&config),
			Err(ErpError::Configuration(_))
		));
	}

	#[test]
	fn test_dangling_line_reference_rejected() {
		let config = parse("[orders]\n\"100\" = [3]\n");
		let err = create_erp(&config).err().unwrap();
		assert!(err.to_string().contains("unknown line 3"));
	}

	#[tokio::test]
	async fn test_unknown_line_is_not_found() {
		let erp = FixtureErp::default();
		let result = erp.products_for_lines(&[5]).await;
		assert!(matches!(result, Err(ErpError::NotFound(_))));
	}
}
