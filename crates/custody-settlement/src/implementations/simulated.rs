//! In-process settlement network.
//!
//! Keeps issued assets and role balances in memory and settles transfers
//! instantly. Useful for local replays and tests where no real network is
//! reachable. The issuer mints on every transfer it sends; every other role
//! can only send what it holds.

use crate::{SettlementError, SettlementInterface};
use async_trait::async_trait;
use custody_types::{
	current_timestamp, AssetAmount, ConfigSchema, Field, FieldType, IssuedAsset, Role, Schema,
	SettlementReceipt, Stage, TransferRoute, ValidationError,
};
use rust_decimal::Decimal;
use sha3::{Digest, Sha3_256};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tokio::sync::Mutex;

#[derive(Default)]
struct Ledger {
	issued: HashSet<String>,
	balances: HashMap<(Role, String), Decimal>,
	sequence: u64,
}

/// Simulated settlement network.
pub struct SimulatedSettlement {
	network: String,
	state: Mutex<Ledger>,
}

impl SimulatedSettlement {
	pub fn new(network: impl Into<String>) -> Self {
		Self {
			network: network.into(),
			state: Mutex::new(Ledger::default()),
		}
	}

	fn issuer(&self) -> String {
		format!("{}:{}", self.network, Role::Issuer)
	}

	/// Current balance of `asset_code` held by `role`.
	pub async fn balance(&self, role: Role, asset_code: &str) -> Decimal {
		let state = self.state.lock().await;
		state
			.balances
			.get(&(role, asset_code.to_string()))
			.copied()
			.unwrap_or_default()
	}

	fn reference(
		&self,
		sequence: u64,
		stage: Stage,
		route: TransferRoute,
		amounts: &[AssetAmount],
	) -> String {
		let mut hasher = Sha3_256::new();
		hasher.update(self.network.as_bytes());
		hasher.update(sequence.to_be_bytes());
		hasher.update(stage.as_str().as_bytes());
		hasher.update(route.to_string().as_bytes());
		for amount in amounts {
			hasher.update(amount.asset_code.as_bytes());
			hasher.update(b"=");
			hasher.update(amount.quantity.as_bytes());
		}
		hex::encode(hasher.finalize())
	}
}

fn parse_quantity(amount: &AssetAmount) -> Result<Decimal, SettlementError> {
	let quantity = Decimal::from_str(&amount.quantity).map_err(|e| {
		SettlementError::Rejected(format!(
			"Invalid quantity '{}' for {}: {}",
			amount.quantity, amount.asset_code, e
		))
	})?;
	if quantity <= Decimal::ZERO {
		return Err(SettlementError::Rejected(format!(
			"Quantity '{}' for {} must be positive",
			amount.quantity, amount.asset_code
		)));
	}
	Ok(quantity)
}

#[async_trait]
impl SettlementInterface for SimulatedSettlement {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedSettlementSchema)
	}

	async fn create_assets(&self, codes: &[String]) -> Result<Vec<IssuedAsset>, SettlementError> {
		let mut state = self.state.lock().await;
		let issuer = self.issuer();

		codes
			.iter()
			.map(|code| {
				if code.is_empty() || code.len() > 12 {
					return Err(SettlementError::AssetCreation(format!(
						"Invalid asset code '{}'",
						code
					)));
				}
				state.issued.insert(code.clone());
				Ok(IssuedAsset {
					asset_code: code.clone(),
					issuer: issuer.clone(),
				})
			})
			.collect()
	}

	async fn transfer(
		&self,
		stage: Stage,
		route: TransferRoute,
		amounts: &[AssetAmount],
	) -> Result<SettlementReceipt, SettlementError> {
		let mut state = self.state.lock().await;

		// Check every operation before applying any, so a refused
		// transaction changes nothing.
		let mut parsed = Vec::with_capacity(amounts.len());
		for amount in amounts {
			if !state.issued.contains(&amount.asset_code) {
				return Err(SettlementError::Rejected(format!(
					"Asset {} is not issued",
					amount.asset_code
				)));
			}
			let quantity = parse_quantity(amount)?;
			parsed.push((amount.asset_code.clone(), quantity));
		}

		if route.source != Role::Issuer {
			let mut needed: HashMap<&str, Decimal> = HashMap::new();
			for (code, quantity) in &parsed {
				*needed.entry(code.as_str()).or_default() += quantity;
			}
			for (code, quantity) in needed {
				let held = state
					.balances
					.get(&(route.source, code.to_string()))
					.copied()
					.unwrap_or_default();
				if held < quantity {
					return Err(SettlementError::Rejected(format!(
						"{} holds {} of {}, needs {}",
						route.source, held, code, quantity
					)));
				}
			}
		}

		for (code, quantity) in parsed {
			if route.source != Role::Issuer {
				if let Some(held) = state.balances.get_mut(&(route.source, code.clone())) {
					*held -= quantity;
				}
			}
			if route.destination != Role::Issuer {
				*state
					.balances
					.entry((route.destination, code))
					.or_default() += quantity;
			}
		}

		state.sequence += 1;
		let reference = self.reference(state.sequence, stage, route, amounts);
		tracing::debug!(
			network = %self.network,
			%stage,
			%route,
			sequence = state.sequence,
			"Simulated transfer"
		);

		Ok(SettlementReceipt {
			reference,
			recorded_at: current_timestamp(),
		})
	}
}

/// Configuration schema for SimulatedSettlement.
pub struct SimulatedSettlementSchema;

impl ConfigSchema for SimulatedSettlementSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("network", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some("") => Err("network name cannot be empty".into()),
					_ => Ok(()),
				}
			})],
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create a simulated settlement network.
///
/// Required configuration parameters:
/// - `network`: name of the simulated network, mixed into every reference
pub fn create_settlement(
	config: &toml::Value,
) -> Result<Box<dyn SettlementInterface>, SettlementError> {
	SimulatedSettlementSchema
		.validate(config)
		.map_err(|e| SettlementError::Configuration(format!("Invalid configuration: {}", e)))?;

	let network = config
		.get("network")
		.and_then(|v| v.as_str())
		.unwrap_or_default();

	Ok(Box::new(SimulatedSettlement::new(network)))
}

/// Registry for the simulated settlement implementation.
pub struct Registry;

impl custody_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "simulated";
	type Factory = crate::SettlementFactory;

	fn factory() -> Self::Factory {
		create_settlement
	}
}

impl crate::SettlementRegistry for Registry {}
