//! Order line and asset amount types.

use crate::{OrderId, Stage};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier of an order line in the ERP.
pub type LineId = u64;

/// Quantity of one product on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
	pub product_id: u64,
	pub quantity: Decimal,
}

impl OrderLine {
	pub fn new(product_id: u64, quantity: Decimal) -> Self {
		Self {
			product_id,
			quantity,
		}
	}
}

/// Amount of one asset in the settlement network's representation.
///
/// `quantity` is a plain decimal string such as `10` or `2.5`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
	pub asset_code: String,
	pub quantity: String,
}

/// Persisted mapping from an ERP product to its settlement asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAsset {
	pub product_id: u64,
	pub asset_code: String,
	pub issuer: String,
}

/// An asset as issued on the settlement network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedAsset {
	pub asset_code: String,
	pub issuer: String,
}

/// Where the amounts for a transition come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LineSelection {
	/// Amounts supplied directly by the caller.
	Lines(Vec<OrderLine>),
	/// ERP order-line identifiers to resolve into products.
	LineIds(Vec<LineId>),
	/// Resolve every line of the order from the ERP.
	#[default]
	FromOrder,
}

/// Request to advance an order to a stage, as read from a request stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
	pub stage: Stage,
	pub order_id: OrderId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub line_ids: Option<Vec<LineId>>,
}

impl StageRequest {
	/// Line selection implied by this request.
	pub fn selection(&self) -> LineSelection {
		match &self.line_ids {
			Some(ids) => LineSelection::LineIds(ids.clone()),
			None => LineSelection::FromOrder,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_stage_request_from_json_line() {
		let request: StageRequest =
			serde_json::from_str(r#"{"stage":"confirm","order_id":100,"line_ids":[1,2]}"#)
				.unwrap();
		assert_eq!(request.stage, Stage::Confirm);
		assert_eq!(request.selection(), LineSelection::LineIds(vec![1, 2]));

		let request: StageRequest =
			serde_json::from_str(r#"{"stage":"deliver","order_id":100}"#).unwrap();
		assert_eq!(request.selection(), LineSelection::FromOrder);
	}
}
