//! Order sequencer.
//!
//! All stage requests of a process go through one FIFO queue drained by a
//! single worker task. For each request the worker reads the order's history,
//! validates the transition, resolves order lines, executes the transfer and
//! appends the outcome to the ledger. Nothing else writes the ledger, so the
//! history a validation reads is never stale.

use crate::event_bus::EventBus;
use crate::validator;
use custody_erp::OrderLineService;
use custody_settlement::{ExecutorError, TransferExecutor};
use custody_storage::{LedgerInterface, StorageError};
use custody_types::{
	current_timestamp, short_reference, CustodyEvent, LineSelection, OrderId, Stage,
	TransferRecord,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::instrument;

/// Errors surfaced from a submission.
///
/// Rejected transitions and failed transfers are not errors; they resolve to
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum SequencerError {
	/// The ledger could not be read or written.
	#[error("Storage error: {0}")]
	Storage(String),
	/// The worker has stopped and accepts no more work.
	#[error("Sequencer is shut down")]
	Closed,
	#[error("Worker failed: {0}")]
	Worker(String),
}

/// Outcome of one submission: the settlement reference, if a transfer settled.
pub type SubmissionResult = Result<Option<String>, SequencerError>;

enum Command {
	Advance {
		stage: Stage,
		order_id: OrderId,
		selection: LineSelection,
		reply: Option<oneshot::Sender<SubmissionResult>>,
	},
	Flush(oneshot::Sender<()>),
	Shutdown,
}

/// Processes stage requests one at a time.
pub struct CustodyWorker {
	ledger: Arc<dyn LedgerInterface>,
	executor: Arc<TransferExecutor>,
	lines: Arc<OrderLineService>,
	event_bus: EventBus,
}

impl CustodyWorker {
	pub fn new(
		ledger: Arc<dyn LedgerInterface>,
		executor: Arc<TransferExecutor>,
		lines: Arc<OrderLineService>,
		event_bus: EventBus,
	) -> Self {
		Self {
			ledger,
			executor,
			lines,
			event_bus,
		}
	}

	#[instrument(skip_all, fields(order_id = order_id, stage = %stage))]
	async fn process(
		&self,
		stage: Stage,
		order_id: OrderId,
		selection: LineSelection,
	) -> SubmissionResult {
		let history = self
			.ledger
			.history(order_id)
			.await
			.map_err(|e| storage_failure("read history", e))?;

		let transition = match validator::validate(stage, &history) {
			Ok(transition) => transition,
			Err(rejection) => {
				tracing::info!(
					history_len = history.len(),
					reason = %rejection,
					"Transition not attempted"
				);
				self.event_bus
					.publish(CustodyEvent::TransitionRejected {
						order_id,
						stage,
						reason: rejection.to_string(),
					})
					.ok();
				return Ok(None);
			},
		};

		let lines = match self.lines.resolve(order_id, selection).await {
			Ok(lines) => lines,
			Err(e) => return self.record_failure(order_id, stage, e.to_string()).await,
		};

		match self
			.executor
			.execute(order_id, stage, transition.route, &lines)
			.await
		{
			Ok(receipt) => {
				let reference = receipt.reference.clone();
				let record = self
					.ledger
					.append(TransferRecord::settled(order_id, stage, receipt))
					.await
					.map_err(|e| {
						tracing::error!(
							%reference,
							"Transfer settled but could not be recorded"
						);
						storage_failure("append record", e)
					})?;

				tracing::info!(
					reference = %short_reference(&record.reference),
					"Transfer recorded"
				);
				self.event_bus
					.publish(CustodyEvent::TransferRecorded {
						order_id,
						stage,
						reference: record.reference.clone(),
					})
					.ok();
				Ok(Some(record.reference))
			},
			Err(ExecutorError::Storage(e)) => Err(storage_failure("resolve assets", e)),
			Err(e) => self.record_failure(order_id, stage, e.to_string()).await,
		}
	}

	/// Appends a failed record, which blocks the order's main path.
	async fn record_failure(
		&self,
		order_id: OrderId,
		stage: Stage,
		error: String,
	) -> SubmissionResult {
		tracing::error!(%error, "Stage failed, recording failed transfer");
		self.ledger
			.append(TransferRecord::failed(order_id, stage, current_timestamp()))
			.await
			.map_err(|e| storage_failure("append failed record", e))?;

		self.event_bus
			.publish(CustodyEvent::TransferFailed {
				order_id,
				stage,
				error,
			})
			.ok();
		Ok(None)
	}
}

fn storage_failure(action: &str, error: StorageError) -> SequencerError {
	tracing::error!(action, error = %error, "Ledger storage failure");
	SequencerError::Storage(format!("{}: {}", action, error))
}

async fn run(worker: CustodyWorker, mut receiver: mpsc::UnboundedReceiver<Command>) {
	while let Some(command) = receiver.recv().await {
		match command {
			Command::Advance {
				stage,
				order_id,
				selection,
				reply,
			} => {
				let result = worker.process(stage, order_id, selection).await;
				if let Some(reply) = reply {
					reply.send(result).ok();
				}
			},
			Command::Flush(reply) => {
				reply.send(()).ok();
			},
			Command::Shutdown => receiver.close(),
		}
	}
	tracing::debug!("Sequencer worker stopped");
}

/// Handle to the single worker that executes stage requests in order.
pub struct OrderSequencer {
	sender: mpsc::UnboundedSender<Command>,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl OrderSequencer {
	/// Spawns the worker on the current tokio runtime.
	pub fn start(worker: CustodyWorker) -> Self {
		let (sender, receiver) = mpsc::unbounded_channel();
		let handle = tokio::spawn(run(worker, receiver));
		Self {
			sender,
			handle: Mutex::new(Some(handle)),
		}
	}

	fn send(&self, command: Command) -> Result<(), SequencerError> {
		self.sender.send(command).map_err(|_| SequencerError::Closed)
	}

	/// Queues a request and waits for its outcome.
	pub async fn submit(
		&self,
		stage: Stage,
		order_id: OrderId,
		selection: LineSelection,
	) -> SubmissionResult {
		let (reply, outcome) = oneshot::channel();
		self.send(Command::Advance {
			stage,
			order_id,
			selection,
			reply: Some(reply),
		})?;
		outcome.await.map_err(|_| SequencerError::Closed)?
	}

	/// Queues a request without waiting for it.
	pub fn enqueue(
		&self,
		stage: Stage,
		order_id: OrderId,
		selection: LineSelection,
	) -> Result<(), SequencerError> {
		tracing::debug!(order_id, %stage, "Queued stage request");
		self.send(Command::Advance {
			stage,
			order_id,
			selection,
			reply: None,
		})
	}

	/// Resolves once every request queued before it has been processed.
	pub async fn flush(&self) -> Result<(), SequencerError> {
		let (reply, done) = oneshot::channel();
		self.send(Command::Flush(reply))?;
		done.await.map_err(|_| SequencerError::Closed)
	}

	/// Stops accepting requests, drains the queue and waits for the worker.
	///
	/// Calling it again is a no-op.
	pub async fn shutdown(&self) -> Result<(), SequencerError> {
		let Some(handle) = self.handle.lock().await.take() else {
			return Ok(());
		};
		self.send(Command::Shutdown).ok();
		handle
			.await
			.map_err(|e| SequencerError::Worker(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::*;
	use custody_settlement::SettlementError;
	use custody_types::{Role, TransferRoute};
	use std::sync::atomic::Ordering;

	struct Harness {
		sequencer: OrderSequencer,
		ledger: Arc<FlakyLedger>,
		settlement: Arc<ScriptedSettlement>,
		events: tokio::sync::broadcast::Receiver<CustodyEvent>,
	}

	fn harness_with(settlement: ScriptedSettlement, erp: FakeErp) -> Harness {
		let ledger = Arc::new(FlakyLedger::new());
		let settlement = Arc::new(settlement);
		let event_bus = EventBus::new(64);
		let events = event_bus.subscribe();
		let worker = CustodyWorker::new(
			ledger.clone(),
			executor(settlement.clone()),
			line_service(erp),
			event_bus,
		);
		Harness {
			sequencer: OrderSequencer::start(worker),
			ledger,
			settlement,
			events,
		}
	}

	fn harness() -> Harness {
		harness_with(ScriptedSettlement::default(), FakeErp::default())
	}

	fn lines() -> LineSelection {
		LineSelection::Lines(product_a())
	}

	impl Harness {
		async fn submit(&self, stage: Stage, order_id: OrderId) -> Option<String> {
			self.sequencer.submit(stage, order_id, lines()).await.unwrap()
		}

		async fn trace(&self, order_id: OrderId) -> Vec<TransferRecord> {
			self.ledger.history(order_id).await.unwrap()
		}
	}

	#[tokio::test]
	async fn test_same_stage_twice_records_once() {
		let h = harness();

		let first = h.submit(Stage::Create, 1).await;
		let second = h.submit(Stage::Create, 1).await;

		assert!(first.is_some());
		assert!(second.is_none());
		assert_eq!(h.trace(1).await.len(), 1);
		assert_eq!(h.settlement.transfers(), 1);
	}

	#[tokio::test]
	async fn test_confirm_before_create_is_not_attempted() {
		let h = harness();

		assert!(h.submit(Stage::Confirm, 2).await.is_none());
		assert!(h.trace(2).await.is_empty());
		assert_eq!(h.settlement.transfers(), 0);
	}

	#[tokio::test]
	async fn test_failed_stage_poisons_main_path_but_allows_cancel() {
		let h = harness();
		assert!(h.submit(Stage::Create, 3).await.is_some());

		h.settlement
			.push(Err(SettlementError::Rejected("op_no_trust".into())));
		assert!(h.submit(Stage::Confirm, 3).await.is_none());

		let history = h.trace(3).await;
		assert_eq!(history.len(), 2);
		assert!(history[1].is_failed());

		assert!(h.submit(Stage::Consolidate, 3).await.is_none());
		assert!(h.submit(Stage::Confirm, 3).await.is_none());

		assert!(h.submit(Stage::Cancel, 3).await.is_some());
		let routes = h.settlement.routes();
		assert_eq!(
			routes.last(),
			Some(&(
				Stage::Cancel,
				TransferRoute::new(Role::Distributor, Role::Issuer)
			))
		);
		assert_eq!(h.trace(3).await.len(), 3);
	}

	#[tokio::test]
	async fn test_cancel_after_failed_consolidate_unwinds_confirm() {
		let h = harness();
		assert!(h.submit(Stage::Create, 5).await.is_some());
		assert!(h.submit(Stage::Confirm, 5).await.is_some());

		h.settlement
			.push(Err(SettlementError::Rejected("op_underfunded".into())));
		assert!(h.submit(Stage::Consolidate, 5).await.is_none());
		assert!(h.trace(5).await[2].is_failed());

		assert!(h.submit(Stage::Cancel, 5).await.is_some());
		assert_eq!(
			h.settlement.routes().last(),
			Some(&(Stage::Cancel, TransferRoute::new(Role::Confirm, Role::Issuer)))
		);

		let history = h.trace(5).await;
		assert_eq!(history.len(), 4);
		assert_eq!(history[3].stage, Stage::Cancel);
		assert!(!history[3].is_failed());
	}

	#[tokio::test]
	async fn test_cancel_retries_stop_at_four_records() {
		let h = harness();
		assert!(h.submit(Stage::Create, 6).await.is_some());

		for attempt in 1..=3 {
			h.settlement
				.push(Err(SettlementError::Rejected("op_no_trust".into())));
			assert!(h.submit(Stage::Cancel, 6).await.is_none());
			assert_eq!(h.trace(6).await.len(), 1 + attempt);
		}
		assert_eq!(h.settlement.transfers(), 4);

		assert!(h.submit(Stage::Cancel, 6).await.is_none());
		assert_eq!(h.settlement.transfers(), 4);
		assert_eq!(h.trace(6).await.len(), 4);
	}

	#[tokio::test]
	async fn test_transient_failures_retried_into_one_record() {
		let h = harness_with(
			ScriptedSettlement::with_script(vec![
				Err(SettlementError::Timeout("t1".into())),
				Err(SettlementError::InsufficientFee("t2".into())),
				Ok("third-time".into()),
			]),
			FakeErp::default(),
		);

		let reference = h.submit(Stage::Create, 4).await;

		assert_eq!(reference.as_deref(), Some("third-time"));
		assert_eq!(h.settlement.transfers(), 3);
		let history = h.trace(4).await;
		assert_eq!(history.len(), 1);
		assert_eq!(history[0].reference, "third-time");
	}

	#[tokio::test]
	async fn test_order_100_stops_at_skipped_stage() {
		let h = harness();

		let create = h.submit(Stage::Create, 100).await;
		assert!(create.as_deref().is_some_and(|r| !r.is_empty()));
		assert!(h.submit(Stage::Confirm, 100).await.is_some());
		assert!(h.submit(Stage::Deliver, 100).await.is_none());

		let history = h.trace(100).await;
		assert_eq!(history.len(), 2);
		assert_eq!(history[0].stage, Stage::Create);
		assert_eq!(history[1].stage, Stage::Confirm);
	}

	#[tokio::test]
	async fn test_order_200_confirm_on_fresh_order() {
		let h = harness();
		assert!(h.submit(Stage::Confirm, 200).await.is_none());
		assert!(h.trace(200).await.is_empty());
	}

	#[tokio::test]
	async fn test_order_300_failed_create_blocks_everything() {
		let h = harness_with(
			ScriptedSettlement::with_script(vec![Err(SettlementError::Network(
				"connection reset".into(),
			))]),
			FakeErp::default(),
		);

		assert!(h.submit(Stage::Create, 300).await.is_none());
		let history = h.trace(300).await;
		assert_eq!(history.len(), 1);
		assert!(history[0].is_failed());

		assert!(h.submit(Stage::Confirm, 300).await.is_none());
		assert!(h.submit(Stage::Cancel, 300).await.is_none());
		assert_eq!(h.trace(300).await.len(), 1);
		assert_eq!(h.settlement.transfers(), 1);
	}

	#[tokio::test]
	async fn test_history_has_no_gaps_without_failure() {
		let h = harness();
		for stage in Stage::MAIN_PATH {
			assert!(h.submit(stage, 5).await.is_some());
		}
		for stage in [Stage::Deliver, Stage::Cancel, Stage::Create] {
			assert!(h.submit(stage, 5).await.is_none());
		}

		let stages: Vec<_> = h.trace(5).await.into_iter().map(|r| r.stage).collect();
		assert_eq!(stages, Stage::MAIN_PATH.to_vec());
	}

	#[tokio::test]
	async fn test_enqueued_requests_run_in_order() {
		let h = harness();

		h.sequencer.enqueue(Stage::Confirm, 6, lines()).unwrap();
		h.sequencer.enqueue(Stage::Create, 6, lines()).unwrap();
		h.sequencer.enqueue(Stage::Confirm, 6, lines()).unwrap();
		h.sequencer.flush().await.unwrap();

		let stages: Vec<_> = h.trace(6).await.into_iter().map(|r| r.stage).collect();
		assert_eq!(stages, vec![Stage::Create, Stage::Confirm]);
	}

	#[tokio::test]
	async fn test_erp_failure_records_failed_transfer() {
		let erp = FakeErp::default();
		let unavailable = erp.unavailable.clone();
		let h = harness_with(ScriptedSettlement::default(), erp);
		unavailable.store(true, Ordering::SeqCst);

		let result = h
			.sequencer
			.submit(Stage::Create, 7, LineSelection::FromOrder)
			.await
			.unwrap();

		assert!(result.is_none());
		let history = h.trace(7).await;
		assert_eq!(history.len(), 1);
		assert!(history[0].is_failed());
		assert_eq!(h.settlement.transfers(), 0);
	}

	#[tokio::test]
	async fn test_lines_resolved_from_erp() {
		let erp = FakeErp::default()
			.with_order(8, product_a())
			.with_line(81, product_a()[0].clone());
		let h = harness_with(ScriptedSettlement::default(), erp);

		let create = h
			.sequencer
			.submit(Stage::Create, 8, LineSelection::LineIds(vec![81]))
			.await
			.unwrap();
		let confirm = h
			.sequencer
			.submit(Stage::Confirm, 8, LineSelection::FromOrder)
			.await
			.unwrap();

		assert!(create.is_some());
		assert!(confirm.is_some());
	}

	#[tokio::test]
	async fn test_storage_failure_is_an_error() {
		let h = harness();
		h.ledger.fail_reads.store(true, Ordering::SeqCst);
		let result = h.sequencer.submit(Stage::Create, 9, lines()).await;
		assert!(matches!(result, Err(SequencerError::Storage(_))));
		assert_eq!(h.settlement.transfers(), 0);

		h.ledger.fail_reads.store(false, Ordering::SeqCst);
		h.ledger.fail_appends.store(true, Ordering::SeqCst);
		let result = h.sequencer.submit(Stage::Create, 9, lines()).await;
		assert!(matches!(result, Err(SequencerError::Storage(_))));

		h.ledger.fail_appends.store(false, Ordering::SeqCst);
		assert!(h.trace(9).await.is_empty());
	}

	#[tokio::test]
	async fn test_events_published_per_submission() {
		let mut h = harness();
		h.settlement
			.push(Err(SettlementError::Rejected("bad".into())));

		h.submit(Stage::Confirm, 10).await;
		h.submit(Stage::Create, 10).await;
		h.submit(Stage::Create, 11).await;

		assert!(matches!(
			h.events.recv().await.unwrap(),
			CustodyEvent::TransitionRejected { order_id: 10, .. }
		));
		assert!(matches!(
			h.events.recv().await.unwrap(),
			CustodyEvent::TransferFailed { order_id: 10, .. }
		));
		assert!(matches!(
			h.events.recv().await.unwrap(),
			CustodyEvent::TransferRecorded { order_id: 11, .. }
		));
	}

	#[tokio::test]
	async fn test_shutdown_drains_queue_then_refuses_work() {
		let h = harness();
		h.sequencer.enqueue(Stage::Create, 12, lines()).unwrap();
		h.sequencer.enqueue(Stage::Confirm, 12, lines()).unwrap();

		h.sequencer.shutdown().await.unwrap();
		assert_eq!(h.trace(12).await.len(), 2);

		assert!(matches!(
			h.sequencer.enqueue(Stage::Consolidate, 12, lines()),
			Err(SequencerError::Closed)
		));
		assert!(matches!(
			h.sequencer.flush().await,
			Err(SequencerError::Closed)
		));
		h.sequencer.shutdown().await.unwrap();
	}
}
