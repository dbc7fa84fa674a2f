//! Transfer executor.
//!
//! Runs the settlement transfer for one stage transition. Amounts are
//! resolved once per call. Asset issuance and the transfer form one attempt,
//! resubmitted immediately and without bound for as long as the network
//! reports a transient error.

use crate::{AssetCatalog, SettlementError, SettlementInterface};
use custody_storage::StorageError;
use custody_types::{
	short_reference, AssetAmount, OrderId, OrderLine, SettlementReceipt, Stage, TransferRoute,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Terminal outcome of an execution.
#[derive(Debug, Error)]
pub enum ExecutorError {
	/// The network failed the transfer with a non-transient error.
	#[error("Settlement failed: {0}")]
	Settlement(#[from] SettlementError),
	/// An order line cannot be expressed as an asset amount.
	#[error("Invalid order line: {0}")]
	InvalidLine(String),
	/// Reading or writing product asset mappings failed.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Executes stage transfers against the settlement network.
pub struct TransferExecutor {
	settlement: Arc<dyn SettlementInterface>,
	catalog: AssetCatalog,
}

impl TransferExecutor {
	pub fn new(settlement: Arc<dyn SettlementInterface>, catalog: AssetCatalog) -> Self {
		Self {
			settlement,
			catalog,
		}
	}

	/// Transfers the assets for `lines` along `route`.
	///
	/// Returns once the network accepts the transfer or fails it terminally.
	#[instrument(skip_all, fields(order_id = order_id, stage = %stage, route = %route))]
	pub async fn execute(
		&self,
		order_id: OrderId,
		stage: Stage,
		route: TransferRoute,
		lines: &[OrderLine],
	) -> Result<SettlementReceipt, ExecutorError> {
		let amounts = self.catalog.amounts(lines)?;

		let mut attempt: u64 = 0;
		loop {
			attempt += 1;
			match self.attempt(stage, route, lines, &amounts).await {
				Ok(receipt) => {
					tracing::info!(
						attempt,
						reference = %short_reference(&receipt.reference),
						"Transfer settled"
					);
					return Ok(receipt);
				},
				Err(ExecutorError::Settlement(e)) if e.is_transient() => {
					tracing::warn!(attempt, error = %e, "Transient settlement error, retrying");
					tokio::task::yield_now().await;
				},
				Err(e) => {
					tracing::error!(attempt, error = %e, "Transfer failed");
					return Err(e);
				},
			}
		}
	}

	async fn attempt(
		&self,
		stage: Stage,
		route: TransferRoute,
		lines: &[OrderLine],
		amounts: &[AssetAmount],
	) -> Result<SettlementReceipt, ExecutorError> {
		self.catalog.ensure_issued(lines, amounts).await?;
		let receipt = self.settlement.transfer(stage, route, amounts).await?;
		if receipt.reference.is_empty() {
			return Err(
				SettlementError::Rejected("Network returned an empty reference".into()).into(),
			);
		}
		Ok(receipt)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::ScriptedSettlement;
	use custody_config::AssetConfig;
	use custody_storage::{implementations::memory::MemoryStorage, StorageService};
	use rust_decimal::Decimal;

	fn executor(settlement: Arc<ScriptedSettlement>) -> TransferExecutor {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let catalog = AssetCatalog::new(storage, settlement.clone(), AssetConfig::default());
		TransferExecutor::new(settlement, catalog)
	}

	fn lines() -> Vec<OrderLine> {
		vec![OrderLine::new(7, Decimal::from(10))]
	}

	fn create_route() -> TransferRoute {
		TransferRoute::for_stage(Stage::Create).unwrap()
	}

	#[tokio::test]
	async fn test_transient_errors_are_retried_until_success() {
		let settlement = Arc::new(ScriptedSettlement::with_script(vec![
			Err(SettlementError::Timeout("first".into())),
			Err(SettlementError::InsufficientFee("second".into())),
			Ok("settled".into()),
		]));
		let executor = executor(settlement.clone());

		let receipt = executor
			.execute(1, Stage::Create, create_route(), &lines())
			.await
			.unwrap();

		assert_eq!(receipt.reference, "settled");
		assert_eq!(settlement.transfers(), 3);

		let seen = settlement.amounts();
		assert!(seen.iter().all(|amounts| amounts == &seen[0]));
		assert_eq!(seen[0][0].quantity, "10");
	}

	#[tokio::test]
	async fn test_transient_issuance_errors_are_retried() {
		let settlement = Arc::new(ScriptedSettlement::default());
		settlement.push_issue(Err(SettlementError::Timeout("horizon".into())));
		let executor = executor(settlement.clone());

		let receipt = executor
			.execute(1, Stage::Create, create_route(), &lines())
			.await
			.unwrap();

		assert_eq!(receipt.reference, "ref-1");
		assert_eq!(settlement.issues(), 2);
		assert_eq!(settlement.transfers(), 1);
	}

	#[tokio::test]
	async fn test_terminal_issuance_error_skips_transfer() {
		let settlement = Arc::new(ScriptedSettlement::default());
		settlement.push_issue(Err(SettlementError::AssetCreation("bad code".into())));
		let executor = executor(settlement.clone());

		let result = executor
			.execute(1, Stage::Create, create_route(), &lines())
			.await;

		assert!(matches!(
			result,
			Err(ExecutorError::Settlement(SettlementError::AssetCreation(_)))
		));
		assert_eq!(settlement.issues(), 1);
		assert_eq!(settlement.transfers(), 0);
	}

	#[tokio::test]
	async fn test_terminal_error_is_not_retried() {
		let settlement = Arc::new(ScriptedSettlement::with_script(vec![Err(
			SettlementError::Rejected("op_underfunded".into()),
		)]));
		let executor = executor(settlement.clone());

		let result = executor
			.execute(1, Stage::Create, create_route(), &lines())
			.await;

		assert!(matches!(
			result,
			Err(ExecutorError::Settlement(SettlementError::Rejected(_)))
		));
		assert_eq!(settlement.transfers(), 1);
	}

	#[tokio::test]
	async fn test_empty_reference_is_terminal() {
		let settlement = Arc::new(ScriptedSettlement::with_script(vec![Ok(String::new())]));
		let executor = executor(settlement.clone());

		let result = executor
			.execute(1, Stage::Create, create_route(), &lines())
			.await;
		assert!(matches!(result, Err(ExecutorError::Settlement(_))));
	}

	#[tokio::test]
	async fn test_invalid_lines_never_reach_the_network() {
		let settlement = Arc::new(ScriptedSettlement::default());
		let executor = executor(settlement.clone());

		let result = executor
			.execute(1, Stage::Create, create_route(), &[])
			.await;
		assert!(matches!(result, Err(ExecutorError::InvalidLine(_))));
		assert_eq!(settlement.transfers(), 0);
	}
}
