//! Ledger record types.

use crate::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a business order in the ERP.
pub type OrderId = u64;

/// Outcome of a successful settlement transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
	/// Opaque reference assigned by the settlement network.
	pub reference: String,
	/// When the network recorded the transfer.
	pub recorded_at: DateTime<Utc>,
}

/// One attempted stage transition and its outcome.
///
/// Records are immutable once appended. An empty `reference` marks a failed
/// attempt. Position in the order's history is implied by append order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
	pub order_id: OrderId,
	pub stage: Stage,
	pub reference: String,
	pub recorded_at: DateTime<Utc>,
}

impl TransferRecord {
	/// Record for a transfer the settlement network accepted.
	pub fn settled(order_id: OrderId, stage: Stage, receipt: SettlementReceipt) -> Self {
		Self {
			order_id,
			stage,
			reference: receipt.reference,
			recorded_at: receipt.recorded_at,
		}
	}

	/// Record for an attempt that failed terminally.
	pub fn failed(order_id: OrderId, stage: Stage, recorded_at: DateTime<Utc>) -> Self {
		Self {
			order_id,
			stage,
			reference: String::new(),
			recorded_at,
		}
	}

	pub fn is_failed(&self) -> bool {
		self.reference.is_empty()
	}
}
