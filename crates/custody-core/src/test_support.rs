//! Fakes for the collaborators of the custody core.

use async_trait::async_trait;
use custody_config::AssetConfig;
use custody_erp::{ErpError, ErpInterface, OrderLineService};
use custody_settlement::{AssetCatalog, TransferExecutor};
use custody_storage::{
	implementations::memory::MemoryStorage, LedgerInterface, StorageError, StorageLedger,
	StorageService,
};
use custody_types::{ConfigSchema, LineId, OrderId, OrderLine, TransferRecord};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use custody_settlement::testing::{EmptySchema, ScriptedSettlement};

/// ERP with fixed orders that can be switched to failing.
///
/// `unavailable` is shared, so a test can keep a handle after the fake is
/// moved into an [`OrderLineService`].
#[derive(Default)]
pub struct FakeErp {
	orders: HashMap<OrderId, Vec<OrderLine>>,
	lines: HashMap<LineId, OrderLine>,
	pub unavailable: Arc<AtomicBool>,
}

impl FakeErp {
	pub fn with_order(mut self, order_id: OrderId, lines: Vec<OrderLine>) -> Self {
		self.orders.insert(order_id, lines);
		self
	}

	pub fn with_line(mut self, line_id: LineId, line: OrderLine) -> Self {
		self.lines.insert(line_id, line);
		self
	}

	fn check(&self) -> Result<(), ErpError> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(ErpError::Backend("ERP unavailable".into()));
		}
		Ok(())
	}
}

#[async_trait]
impl ErpInterface for FakeErp {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EmptySchema)
	}

	async fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>, ErpError> {
		self.check()?;
		self.orders
			.get(&order_id)
			.cloned()
			.ok_or_else(|| ErpError::NotFound(format!("order {}", order_id)))
	}

	async fn products_for_lines(&self, line_ids: &[LineId]) -> Result<Vec<OrderLine>, ErpError> {
		self.check()?;
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

/// Ledger over memory storage whose reads or writes can be made to fail.
pub struct FlakyLedger {
	inner: StorageLedger,
	pub fail_reads: AtomicBool,
	pub fail_appends: AtomicBool,
}

impl FlakyLedger {
	pub fn new() -> Self {
		Self {
			inner: StorageLedger::new(memory_storage()),
			fail_reads: AtomicBool::new(false),
			fail_appends: AtomicBool::new(false),
		}
	}
}

#[async_trait]
impl LedgerInterface for FlakyLedger {
	async fn append(&self, record: TransferRecord) -> Result<TransferRecord, StorageError> {
		if self.fail_appends.load(Ordering::SeqCst) {
			return Err(StorageError::Backend("disk full".into()));
		}
		self.inner.append(record).await
	}

	async fn history(&self, order_id: OrderId) -> Result<Vec<TransferRecord>, StorageError> {
		if self.fail_reads.load(Ordering::SeqCst) {
			return Err(StorageError::Backend("disk unreadable".into()));
		}
		self.inner.history(order_id).await
	}
}

pub fn memory_storage() -> Arc<StorageService> {
	Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
}

pub fn executor(settlement: Arc<ScriptedSettlement>) -> Arc<TransferExecutor> {
	let catalog = AssetCatalog::new(memory_storage(), settlement.clone(), AssetConfig::default());
	Arc::new(TransferExecutor::new(settlement, catalog))
}

pub fn line_service(erp: FakeErp) -> Arc<OrderLineService> {
	Arc::new(OrderLineService::new(Box::new(erp)))
}

/// Ten units of product 7.
pub fn product_a() -> Vec<OrderLine> {
	vec![OrderLine::new(7, Decimal::from(10))]
}
