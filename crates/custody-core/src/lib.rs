//! Core custody engine for the order custody system.
//!
//! Ties the transaction ledger, transfer executor and order-line resolver
//! together behind the order sequencer. Callers advance orders through the
//! custody lifecycle with one entry point per stage; all of them enqueue and
//! return. The trace query reads an order's ledger history directly.

use crate::event_bus::EventBus;
use crate::sequencer::{CustodyWorker, OrderSequencer, SequencerError, SubmissionResult};
use custody_config::Config;
use custody_erp::OrderLineService;
use custody_settlement::TransferExecutor;
use custody_storage::LedgerInterface;
use custody_types::{
	CustodyEvent, LineId, LineSelection, OrderId, Stage, StageRequest, TransferRecord,
};
use std::sync::Arc;
use tokio::sync::broadcast;

pub mod builder;
pub mod event_bus;
pub mod sequencer;
pub mod validator;

#[cfg(test)]
mod test_support;

pub use builder::{BuilderError, CustodyBuilder, CustodyFactories};

/// Entry points for advancing orders through custody.
///
/// Must be created inside a tokio runtime; the sequencer worker is spawned
/// on construction.
pub struct CustodyEngine {
	config: Config,
	ledger: Arc<dyn LedgerInterface>,
	sequencer: OrderSequencer,
	event_bus: EventBus,
}

fn selection_for(line_ids: Vec<LineId>) -> LineSelection {
	if line_ids.is_empty() {
		LineSelection::FromOrder
	} else {
		LineSelection::LineIds(line_ids)
	}
}

impl CustodyEngine {
	pub fn new(
		config: Config,
		ledger: Arc<dyn LedgerInterface>,
		executor: Arc<TransferExecutor>,
		lines: Arc<OrderLineService>,
	) -> Self {
		let event_bus = EventBus::new(config.service.event_capacity);
		let worker = CustodyWorker::new(ledger.clone(), executor, lines, event_bus.clone());
		tracing::info!(service_id = %config.service.id, "Custody engine started");

		Self {
			config,
			ledger,
			sequencer: OrderSequencer::start(worker),
			event_bus,
		}
	}

	/// Queues `Create` for the given ERP lines, or the whole order if none.
	pub fn create_order(
		&self,
		order_id: OrderId,
		line_ids: Vec<LineId>,
	) -> Result<(), SequencerError> {
		self.sequencer
			.enqueue(Stage::Create, order_id, selection_for(line_ids))
	}

	/// Queues `Confirm` for the given ERP lines, or the whole order if none.
	pub fn confirm_order(
		&self,
		order_id: OrderId,
		line_ids: Vec<LineId>,
	) -> Result<(), SequencerError> {
		self.sequencer
			.enqueue(Stage::Confirm, order_id, selection_for(line_ids))
	}

	pub fn consolidate_order(&self, order_id: OrderId) -> Result<(), SequencerError> {
		self.sequencer
			.enqueue(Stage::Consolidate, order_id, LineSelection::FromOrder)
	}

	pub fn deliver_order(&self, order_id: OrderId) -> Result<(), SequencerError> {
		self.sequencer
			.enqueue(Stage::Deliver, order_id, LineSelection::FromOrder)
	}

	pub fn cancel_order(&self, order_id: OrderId) -> Result<(), SequencerError> {
		self.sequencer
			.enqueue(Stage::Cancel, order_id, LineSelection::FromOrder)
	}

	/// Queues a request read from a request stream.
	pub fn request(&self, request: &StageRequest) -> Result<(), SequencerError> {
		self.sequencer
			.enqueue(request.stage, request.order_id, request.selection())
	}

	/// Queues a request and waits for its outcome.
	///
	/// Resolves to the settlement reference when a transfer was recorded, and
	/// to `None` when the transition was not attempted or failed.
	pub async fn submit(
		&self,
		stage: Stage,
		order_id: OrderId,
		selection: LineSelection,
	) -> SubmissionResult {
		self.sequencer.submit(stage, order_id, selection).await
	}

	/// Full ledger history of an order, oldest first.
	pub async fn trace(&self, order_id: OrderId) -> Result<Vec<TransferRecord>, SequencerError> {
		self.ledger
			.history(order_id)
			.await
			.map_err(|e| SequencerError::Storage(e.to_string()))
	}

	/// Waits until every request queued so far has been processed.
	pub async fn flush(&self) -> Result<(), SequencerError> {
		self.sequencer.flush().await
	}

	/// Drains the queue and stops the worker.
	pub async fn shutdown(&self) -> Result<(), SequencerError> {
		self.sequencer.shutdown().await?;
		tracing::info!(service_id = %self.config.service.id, "Custody engine stopped");
		Ok(())
	}

	pub fn subscribe(&self) -> broadcast::Receiver<CustodyEvent> {
		self.event_bus.subscribe()
	}
}
