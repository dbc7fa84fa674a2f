//! Dynamic factory registry for custody implementations.
//!
//! Collects the factory functions every component crate exposes, so the
//! engine can be built from whichever implementations the configuration
//! names.

use custody_config::Config;
use custody_core::{CustodyBuilder, CustodyEngine, CustodyFactories};
use custody_erp::ErpFactory;
use custody_settlement::SettlementFactory;
use custody_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub settlement: HashMap<String, SettlementFactory>,
	pub erp: HashMap<String, ErpFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			settlement: HashMap::new(),
			erp: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_settlement(&mut self, name: impl Into<String>, factory: SettlementFactory) {
		self.settlement.insert(name.into(), factory);
	}

	pub fn register_erp(&mut self, name: impl Into<String>, factory: ErpFactory) {
		self.erp.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Initialize the global registry with all available implementations
pub fn initialize_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in custody_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in custody_settlement::get_all_implementations() {
			tracing::debug!("Registering settlement implementation: {}", name);
			registry.register_settlement(name, factory);
		}

		for (name, factory) in custody_erp::get_all_implementations() {
			tracing::debug!("Registering ERP implementation: {}", name);
			registry.register_erp(name, factory);
		}

		registry
	})
}

/// Macro to build factories from config implementations
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Build the custody engine using the registry and config.
pub async fn build_engine_from_config(
	config: Config,
) -> Result<CustodyEngine, Box<dyn std::error::Error>> {
	let registry = initialize_registry();

	let storage_factories =
		build_factories!(registry, config.ledger.implementations, storage, "ledger");
	let settlement_factories = build_factories!(
		registry,
		config.settlement.implementations,
		settlement,
		"settlement"
	);
	let erp_factories = build_factories!(registry, config.erp.implementations, erp, "erp");

	let factories = CustodyFactories {
		storage_factories,
		settlement_factories,
		erp_factories,
	};

	Ok(CustodyBuilder::new(config).build(factories).await?)
}
