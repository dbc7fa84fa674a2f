//! Transaction ledger.
//!
//! Append-only history of transfer attempts per order, kept in a
//! [`StorageService`] under the `records` namespace. Histories are returned
//! oldest first. Nothing is ever removed or rewritten.

use crate::{StorageError, StorageService};
use async_trait::async_trait;
use custody_types::{OrderId, StorageKey, TransferRecord};
use std::sync::Arc;

/// Ordered append and read-back of transfer records.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Appends a record to the end of its order's history.
	async fn append(&self, record: TransferRecord) -> Result<TransferRecord, StorageError>;

	/// Returns every record for `order_id`, oldest first.
	async fn history(&self, order_id: OrderId) -> Result<Vec<TransferRecord>, StorageError>;
}

/// Ledger backed by a storage service.
///
/// Each order's history is one serialized list. Appends read, extend and
/// rewrite it; callers must serialize appends for the same order, which the
/// sequencer's single worker does.
pub struct StorageLedger {
	storage: Arc<StorageService>,
}

impl StorageLedger {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}
}

#[async_trait]
impl LedgerInterface for StorageLedger {
	async fn append(&self, record: TransferRecord) -> Result<TransferRecord, StorageError> {
		let id = record.order_id.to_string();
		let mut records: Vec<TransferRecord> = self
			.storage
			.retrieve_optional(StorageKey::Records.as_str(), &id)
			.await?
			.unwrap_or_default();

		records.push(record.clone());
		self.storage
			.store(StorageKey::Records.as_str(), &id, &records)
			.await?;

		tracing::debug!(
			order_id = record.order_id,
			stage = %record.stage,
			position = records.len(),
			"Appended transfer record"
		);
		Ok(record)
	}

	async fn history(&self, order_id: OrderId) -> Result<Vec<TransferRecord>, StorageError> {
		Ok(self
			.storage
			.retrieve_optional(StorageKey::Records.as_str(), &order_id.to_string())
			.await?
			.unwrap_or_default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::{file::FileStorage, memory::MemoryStorage};
	use custody_types::{SettlementReceipt, Stage};
	use tempfile::TempDir;

	fn receipt(reference: &str) -> SettlementReceipt {
		SettlementReceipt {
			reference: reference.to_string(),
			recorded_at: chrono::Utc::now(),
		}
	}

	fn memory_ledger() -> StorageLedger {
		StorageLedger::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	#[tokio::test]
	async fn test_unknown_order_has_empty_history() {
		let ledger = memory_ledger();
		assert!(ledger.history(42).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_history_preserves_append_order() {
		let ledger = memory_ledger();
		ledger
			.append(TransferRecord::settled(100, Stage::Create, receipt("aa")))
			.await
			.unwrap();
		ledger
			.append(TransferRecord::failed(100, Stage::Confirm, chrono::Utc::now()))
			.await
			.unwrap();
		ledger
			.append(TransferRecord::settled(100, Stage::Cancel, receipt("bb")))
			.await
			.unwrap();

		let stages: Vec<_> = ledger
			.history(100)
			.await
			.unwrap()
			.into_iter()
			.map(|r| (r.stage, r.is_failed()))
			.collect();
		assert_eq!(
			stages,
			vec![
				(Stage::Create, false),
				(Stage::Confirm, true),
				(Stage::Cancel, false)
			]
		);
	}

	#[tokio::test]
	async fn test_histories_are_per_order() {
		let ledger = memory_ledger();
		ledger
			.append(TransferRecord::settled(1, Stage::Create, receipt("aa")))
			.await
			.unwrap();
		ledger
			.append(TransferRecord::settled(2, Stage::Create, receipt("bb")))
			.await
			.unwrap();

		let history = ledger.history(2).await.unwrap();
		assert_eq!(history.len(), 1);
		assert_eq!(history[0].reference, "bb");
	}

	#[tokio::test]
	async fn test_file_ledger_survives_restart() {
		let temp_dir = TempDir::new().unwrap();
		let record = TransferRecord::settled(300, Stage::Create, receipt("cafe"));

		{
			let storage = FileStorage::open(temp_dir.path()).unwrap();
			let ledger = StorageLedger::new(Arc::new(StorageService::new(Box::new(storage))));
			ledger.append(record.clone()).await.unwrap();
		}

		let storage = FileStorage::open(temp_dir.path()).unwrap();
		let ledger = StorageLedger::new(Arc::new(StorageService::new(Box::new(storage))));
		assert_eq!(ledger.history(300).await.unwrap(), vec![record]);
	}
}
