//! Configuration builder for tests and local development.

use crate::{AssetConfig, Config, ErpConfig, LedgerConfig, ServiceConfig, SettlementConfig};
use std::collections::HashMap;

/// Builds a `Config` in memory with defaults suited to tests.
///
/// The default wires the `memory` ledger, the `simulated` settlement network
/// and an empty `fixture` ERP.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	event_capacity: usize,
	ledger_primary: String,
	ledger_config: toml::Value,
	settlement_primary: String,
	settlement_config: toml::Value,
	assets: AssetConfig,
	erp_primary: String,
	erp_config: toml::Value,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::Table::new())
}

impl ConfigBuilder {
	pub fn new() -> Self {
		let mut simulated = toml::Table::new();
		simulated.insert("network".into(), toml::Value::String("test".into()));

		Self {
			service_id: "custody-test".to_string(),
			event_capacity: 64,
			ledger_primary: "memory".to_string(),
			ledger_config: empty_table(),
			settlement_primary: "simulated".to_string(),
			settlement_config: toml::Value::Table(simulated),
			assets: AssetConfig::default(),
			erp_primary: "fixture".to_string(),
			erp_config: empty_table(),
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	pub fn event_capacity(mut self, capacity: usize) -> Self {
		self.event_capacity = capacity;
		self
	}

	/// Sets the ledger storage implementation and its table.
	pub fn ledger(mut self, primary: impl Into<String>, config: toml::Value) -> Self {
		self.ledger_primary = primary.into();
		self.ledger_config = config;
		self
	}

	/// Sets the settlement implementation and its table.
	pub fn settlement(mut self, primary: impl Into<String>, config: toml::Value) -> Self {
		self.settlement_primary = primary.into();
		self.settlement_config = config;
		self
	}

	pub fn assets(mut self, assets: AssetConfig) -> Self {
		self.assets = assets;
		self
	}

	/// Sets the ERP implementation and its table.
	pub fn erp(mut self, primary: impl Into<String>, config: toml::Value) -> Self {
		self.erp_primary = primary.into();
		self.erp_config = config;
		self
	}

	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
				event_capacity: self.event_capacity,
			},
			ledger: LedgerConfig {
				implementations: HashMap::from([(self.ledger_primary.clone(), self.ledger_config)]),
				primary: self.ledger_primary,
			},
			settlement: SettlementConfig {
				implementations: HashMap::from([(
					self.settlement_primary.clone(),
					self.settlement_config,
				)]),
				primary: self.settlement_primary,
				assets: self.assets,
			},
			erp: ErpConfig {
				implementations: HashMap::from([(self.erp_primary.clone(), self.erp_config)]),
				primary: self.erp_primary,
			},
		}
	}
}
