//! Event types published by the order sequencer.
//!
//! Events are broadcast after each submission is processed so that observers
//! (the service binary, tests, audit sinks) can follow the ledger without
//! polling it.

use crate::{OrderId, Stage};
use serde::{Deserialize, Serialize};

/// Outcome of one processed submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodyEvent {
	/// The requested stage was not legal for the order's history.
	TransitionRejected {
		order_id: OrderId,
		stage: Stage,
		reason: String,
	},
	/// A transfer settled and its record was appended.
	TransferRecorded {
		order_id: OrderId,
		stage: Stage,
		reference: String,
	},
	/// A transfer failed terminally and a failed record was appended.
	TransferFailed {
		order_id: OrderId,
		stage: Stage,
		error: String,
	},
}

impl CustodyEvent {
	pub fn order_id(&self) -> OrderId {
		match self {
			CustodyEvent::TransitionRejected { order_id, .. }
			| CustodyEvent::TransferRecorded { order_id, .. }
			| CustodyEvent::TransferFailed { order_id, .. } => *order_id,
		}
	}
}
