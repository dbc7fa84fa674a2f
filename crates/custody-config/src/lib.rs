//! Configuration module for the order custody system.
//!
//! Configuration is read from TOML. Every pluggable component (ledger storage,
//! settlement network, ERP resolver) names a `primary` implementation and
//! carries a raw TOML table per implementation, which the implementation's
//! own schema validates when it is built.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

#[cfg(any(test, feature = "testing"))]
pub mod builders {
	pub mod config;
}
mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, not the whole input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration of a custody service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity and runtime settings of this instance.
	pub service: ServiceConfig,
	/// Storage behind the transaction ledger.
	pub ledger: LedgerConfig,
	/// Settlement network and asset translation.
	pub settlement: SettlementConfig,
	/// ERP order-line resolver.
	pub erp: ErpConfig,
}

/// Identity and runtime settings of this instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
	/// Buffer size of the custody event broadcast channel.
	#[serde(default = "default_event_capacity")]
	pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
	1024
}

/// Storage behind the transaction ledger.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Settlement network and asset translation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettlementConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of settlement implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// How order lines are translated into settlement assets.
	#[serde(default)]
	pub assets: AssetConfig,
}

/// How order lines are translated into settlement assets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssetConfig {
	/// Prefix of every asset code; the product id fills the rest.
	#[serde(default = "default_code_prefix")]
	pub code_prefix: String,
	/// Fractional digits quantities are rounded to before transfer.
	#[serde(default = "default_quantity_decimals")]
	pub quantity_decimals: u32,
}

impl Default for AssetConfig {
	fn default() -> Self {
		Self {
			code_prefix: default_code_prefix(),
			quantity_decimals: default_quantity_decimals(),
		}
	}
}

fn default_code_prefix() -> String {
	"ODOO".to_string()
}

fn default_quantity_decimals() -> u32 {
	3
}

/// Longest asset code the settlement network accepts.
pub const MAX_ASSET_CODE_LENGTH: usize = 12;

/// ERP order-line resolver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErpConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of ERP implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to bound regex work.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match (std::env::var(var_name.as_str()), default_value) {
			(Ok(v), _) => v,
			(Err(_), Some(default)) => default.to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name.as_str()
				)))
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Checks cross-field constraints serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}
		if self.service.event_capacity == 0 || self.service.event_capacity > 65536 {
			return Err(ConfigError::Validation(
				"service.event_capacity must be between 1 and 65536".into(),
			));
		}

		validate_primary("ledger", &self.ledger.primary, &self.ledger.implementations)?;
		validate_primary(
			"settlement",
			&self.settlement.primary,
			&self.settlement.implementations,
		)?;
		validate_primary("erp", &self.erp.primary, &self.erp.implementations)?;

		self.settlement.assets.validate()
	}
}

impl AssetConfig {
	fn validate(&self) -> Result<(), ConfigError> {
		let prefix = &self.code_prefix;
		if prefix.is_empty() || prefix.len() >= MAX_ASSET_CODE_LENGTH {
			return Err(ConfigError::Validation(format!(
				"settlement.assets.code_prefix must be 1 to {} characters",
				MAX_ASSET_CODE_LENGTH - 1
			)));
		}
		if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
			return Err(ConfigError::Validation(format!(
				"settlement.assets.code_prefix '{}' must be ASCII alphanumeric",
				prefix
			)));
		}
		if self.quantity_decimals > 7 {
			return Err(ConfigError::Validation(
				"settlement.assets.quantity_decimals cannot exceed 7".into(),
			));
		}
		Ok(())
	}
}

/// Ensures `primary` names one of the configured implementations.
fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses and validates a configuration, resolving environment variables first.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
