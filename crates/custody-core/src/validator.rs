//! Transition validator.
//!
//! Decides from an order's ledger history alone whether a requested stage may
//! be attempted. Main-path stages must follow each other exactly, one record
//! per stage. A failed last record stops the main path. `Cancel` looks past
//! failures to the last stage that settled and returns the assets from there.

use custody_types::{Stage, TransferRecord, TransferRoute};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

/// Why a requested transition was not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
	#[error("last attempt ({failed}) failed, order is blocked")]
	PriorAttemptFailed { failed: Stage },
	#[error("{stage} needs {expected} prior records, found {actual}")]
	HistoryLength {
		stage: Stage,
		expected: usize,
		actual: usize,
	},
	#[error("{stage} must follow {expected}, last record is {actual}")]
	UnexpectedPredecessor {
		stage: Stage,
		expected: Stage,
		actual: Stage,
	},
	#[error("nothing to cancel, no records")]
	EmptyHistory,
	#[error("order has already run its full course")]
	HistoryComplete,
	#[error("order was already delivered")]
	AlreadyDelivered,
	#[error("order was already cancelled")]
	AlreadyCancelled,
	#[error("no stage has settled yet")]
	NothingSettled,
}

/// An approved transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
	pub stage: Stage,
	pub route: TransferRoute,
	/// For `Cancel`, the main-path stage being unwound.
	pub unwinds: Option<Stage>,
}

/// What a main-path stage requires of the history before it.
struct Expectation {
	history_len: usize,
	last: Option<Stage>,
}

static EXPECTATIONS: Lazy<HashMap<Stage, Expectation>> = Lazy::new(|| {
	HashMap::from([
		(
			Stage::Create,
			Expectation {
				history_len: 0,
				last: None,
			},
		),
		(
			Stage::Confirm,
			Expectation {
				history_len: 1,
				last: Some(Stage::Create),
			},
		),
		(
			Stage::Consolidate,
			Expectation {
				history_len: 2,
				last: Some(Stage::Confirm),
			},
		),
		(
			Stage::Deliver,
			Expectation {
				history_len: 3,
				last: Some(Stage::Consolidate),
			},
		),
	])
});

/// Validates `stage` against the order's `history` (oldest first).
pub fn validate(stage: Stage, history: &[TransferRecord]) -> Result<Transition, Rejection> {
	if stage == Stage::Cancel {
		return validate_cancel(history);
	}

	if let Some(last) = history.last().filter(|record| record.is_failed()) {
		return Err(Rejection::PriorAttemptFailed { failed: last.stage });
	}

	let expectation = EXPECTATIONS.get(&stage).ok_or(Rejection::HistoryComplete)?;
	if history.len() != expectation.history_len {
		return Err(Rejection::HistoryLength {
			stage,
			expected: expectation.history_len,
			actual: history.len(),
		});
	}
	if let (Some(expected), Some(last)) = (expectation.last, history.last()) {
		if last.stage != expected {
			return Err(Rejection::UnexpectedPredecessor {
				stage,
				expected,
				actual: last.stage,
			});
		}
	}

	let route = TransferRoute::for_stage(stage).ok_or(Rejection::HistoryComplete)?;
	Ok(Transition {
		stage,
		route,
		unwinds: None,
	})
}

fn validate_cancel(history: &[TransferRecord]) -> Result<Transition, Rejection> {
	if history.is_empty() {
		return Err(Rejection::EmptyHistory);
	}
	if history.len() >= Stage::MAIN_PATH.len() {
		return Err(Rejection::HistoryComplete);
	}

	let mut settled = history.iter().filter(|record| !record.is_failed());
	if settled.clone().any(|record| record.stage == Stage::Deliver) {
		return Err(Rejection::AlreadyDelivered);
	}
	if settled.clone().any(|record| record.stage == Stage::Cancel) {
		return Err(Rejection::AlreadyCancelled);
	}

	let last_settled = settled
		.rfind(|record| record.stage.is_main_path())
		.map(|record| record.stage)
		.ok_or(Rejection::NothingSettled)?;
	let route = TransferRoute::cancel_from(last_settled).ok_or(Rejection::AlreadyDelivered)?;

	Ok(Transition {
		stage: Stage::Cancel,
		route,
		unwinds: Some(last_settled),
	})
}
