//! Builder pattern for constructing custody engines.
//!
//! Composes a CustodyEngine from factory functions selected by name in the
//! configuration. Supports pluggable ledger storage, settlement networks and
//! ERP backends.

use crate::CustodyEngine;
use custody_config::Config;
use custody_erp::{ErpError, ErpInterface, OrderLineService};
use custody_settlement::{AssetCatalog, SettlementError, SettlementInterface, TransferExecutor};
use custody_storage::{
	LedgerInterface, StorageError, StorageInterface, StorageLedger, StorageService,
};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during custody engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for all factory functions needed to build a CustodyEngine.
///
/// Each map is keyed by implementation name, the same name used under
/// `implementations` in the configuration.
pub struct CustodyFactories<SF, SEF, EF> {
	pub storage_factories: HashMap<String, SF>,
	pub settlement_factories: HashMap<String, SEF>,
	pub erp_factories: HashMap<String, EF>,
}

/// Builder for constructing a CustodyEngine with pluggable implementations.
pub struct CustodyBuilder {
	config: Config,
}

/// Creates every configured implementation that has a factory and returns
/// the primary one.
fn load_primary<T, E, F>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	T: ?Sized,
	E: Display,
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

impl CustodyBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the CustodyEngine using factories for each component type.
	///
	/// Must be awaited inside a tokio runtime; the engine spawns its worker.
	pub async fn build<SF, SEF, EF>(
		self,
		factories: CustodyFactories<SF, SEF, EF>,
	) -> Result<CustodyEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		SEF: Fn(&toml::Value) -> Result<Box<dyn SettlementInterface>, SettlementError>,
		EF: Fn(&toml::Value) -> Result<Box<dyn ErpInterface>, ErpError>,
	{
		let storage_backend = load_primary(
			"ledger",
			&self.config.ledger.primary,
			&self.config.ledger.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));
		let ledger: Arc<dyn LedgerInterface> = Arc::new(StorageLedger::new(storage.clone()));

		let settlement: Arc<dyn SettlementInterface> = Arc::from(load_primary(
			"settlement",
			&self.config.settlement.primary,
			&self.config.settlement.implementations,
			&factories.settlement_factories,
		)?);
		let catalog = AssetCatalog::new(
			storage,
			settlement.clone(),
			self.config.settlement.assets.clone(),
		);
		let executor = Arc::new(TransferExecutor::new(settlement, catalog));

		let erp = load_primary(
			"erp",
			&self.config.erp.primary,
			&self.config.erp.implementations,
			&factories.erp_factories,
		)?;
		let lines = Arc::new(OrderLineService::new(erp));

		Ok(CustodyEngine::new(self.config, ledger, executor, lines))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use custody_config::builders::config::ConfigBuilder;
	use custody_erp::ErpFactory;
	use custody_settlement::SettlementFactory;
	use custody_storage::StorageFactory;
	use custody_types::{LineSelection, Stage};

	fn registered() -> CustodyFactories<StorageFactory, SettlementFactory, ErpFactory> {
		CustodyFactories {
			storage_factories: custody_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			settlement_factories: custody_settlement::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			erp_factories: custody_erp::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	fn fixture_erp() -> toml::Value {
		toml::from_str(
			r#"
[orders]
"100" = [1]
"101" = [1]
"200" = [2]

[lines.1]
product_id = 7
quantity = "10"

[lines.2]
product_id = 8
quantity = "2.5"
"#,
		)
		.unwrap()
	}

	#[tokio::test]
	async fn test_build_with_registered_implementations() {
		let config = ConfigBuilder::new().erp("fixture", fixture_erp()).build();
		let engine = CustodyBuilder::new(config)
			.build(registered())
			.await
			.unwrap();

		engine.create_order(100, vec![1]).unwrap();
		engine.confirm_order(100, vec![1]).unwrap();
		engine.deliver_order(100).unwrap();
		engine.confirm_order(200, vec![]).unwrap();
		engine.flush().await.unwrap();

		let history = engine.trace(100).await.unwrap();
		assert_eq!(history.len(), 2);
		assert!(history.iter().all(|record| !record.is_failed()));
		assert_eq!(history[1].stage, Stage::Confirm);
		assert!(engine.trace(200).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_cancel_returns_assets_to_issuer() {
		let config = ConfigBuilder::new().erp("fixture", fixture_erp()).build();
		let engine = CustodyBuilder::new(config)
			.build(registered())
			.await
			.unwrap();

		for stage in [Stage::Create, Stage::Confirm, Stage::Cancel] {
			engine
				.submit(stage, 200, custody_types::LineSelection::FromOrder)
				.await
				.unwrap()
				.unwrap();
		}

		let history = engine.trace(200).await.unwrap();
		assert_eq!(history.len(), 3);
		assert_eq!(history[2].stage, Stage::Cancel);
	}

	#[tokio::test]
	async fn test_file_ledger_survives_rebuild() {
		let dir = tempfile::tempdir().unwrap();
		let mut ledger = toml::Table::new();
		ledger.insert(
			"storage_path".into(),
			toml::Value::String(dir.path().to_string_lossy().into_owned()),
		);
		let config = ConfigBuilder::new()
			.ledger("file", toml::Value::Table(ledger))
			.erp("fixture", fixture_erp())
			.build();

		let engine = CustodyBuilder::new(config.clone())
			.build(registered())
			.await
			.unwrap();
		engine.create_order(100, vec![]).unwrap();
		engine.shutdown().await.unwrap();
		drop(engine);

		let engine = CustodyBuilder::new(config)
			.build(registered())
			.await
			.unwrap();
		let history = engine.trace(100).await.unwrap();
		assert_eq!(history.len(), 1);
		assert_eq!(history[0].stage, Stage::Create);
		assert!(!history[0].is_failed());

		// Product 7 is mapped in storage but new to this network instance.
		let reference = engine
			.submit(Stage::Create, 101, LineSelection::FromOrder)
			.await
			.unwrap();
		assert!(reference.is_some());
		let history = engine.trace(101).await.unwrap();
		assert_eq!(history.len(), 1);
		assert!(!history[0].is_failed());
		engine.shutdown().await.unwrap();
	}

	#[tokio::test]
	async fn test_unknown_primary_rejected() {
		let mut config = ConfigBuilder::new().build();
		config.settlement.primary = "horizon".into();

		let result = CustodyBuilder::new(config).build(registered()).await;
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}

	#[tokio::test]
	async fn test_invalid_implementation_config_rejected() {
		let config = ConfigBuilder::new()
			.settlement("simulated", toml::Value::Table(toml::Table::new()))
			.build();

		let err = CustodyBuilder::new(config)
			.build(registered())
			.await
			.err()
			.unwrap();
		assert!(err.to_string().contains("simulated"));
	}

	#[tokio::test]
	async fn test_no_factories_is_missing_component() {
		let mut factories = registered();
		factories.erp_factories.clear();

		let result = CustodyBuilder::new(ConfigBuilder::new().build())
			.build(factories)
			.await;
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}
}
