//! File-based storage backend.
//!
//! Each key is stored as one JSON file under `storage_path`. Writes go to a
//! temporary file that is renamed into place, so a crash never leaves a
//! half-written value. An exclusive lock on `<storage_path>/.lock` is held for
//! the lifetime of the backend so only one process writes a ledger directory.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use custody_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::fs;

const DEFAULT_STORAGE_PATH: &str = "./data/ledger";
const LOCK_FILE: &str = ".lock";

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
	/// Held open to keep the directory lock; released on drop.
	_lock: File,
}

impl FileStorage {
	/// Opens `base_path`, creating it if needed, and takes the writer lock.
	///
	/// Fails with `StorageError::Backend` if another instance holds the lock.
	pub fn open(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
		let base_path = base_path.as_ref().to_path_buf();
		std::fs::create_dir_all(&base_path).map_err(|e| {
			StorageError::Backend(format!(
				"Cannot create storage directory {}: {}",
				base_path.display(),
				e
			))
		})?;

		let lock = OpenOptions::new()
			.create(true)
			.truncate(false)
			.write(true)
			.open(base_path.join(LOCK_FILE))
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		lock.try_lock_exclusive().map_err(|_| {
			StorageError::Backend(format!(
				"Storage directory {} is locked by another writer",
				base_path.display()
			))
		})?;

		tracing::debug!(path = %base_path.display(), "Opened file storage");
		Ok(Self {
			base_path,
			_lock: lock,
		})
	}

	/// Maps a key to a filesystem-safe path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.json", safe_key))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match fs::read(self.get_file_path(key)).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		let temp_path = path.with_extension("tmp");

		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|v| {
					match v.as_str() {
						Some(path) if path.trim().is_empty() => {
							Err("storage_path cannot be empty".to_string())
						},
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend.
///
/// Configuration parameters:
/// - `storage_path`: directory holding the ledger files (default: "./data/ledger")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStorage::open(storage_path)?))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl custody_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
