//! Scripted settlement network for tests.

use crate::{SettlementError, SettlementInterface};
use async_trait::async_trait;
use custody_types::{
	current_timestamp, AssetAmount, ConfigSchema, IssuedAsset, Schema, SettlementReceipt, Stage,
	TransferRoute, ValidationError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Schema accepting only an empty table.
pub struct EmptySchema;

impl ConfigSchema for EmptySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Settlement network answering from scripts.
///
/// Once a script is used up, issuance succeeds and every transfer settles
/// with `ref-<n>`. Calls, routes and amounts are recorded.
#[derive(Default)]
pub struct ScriptedSettlement {
	issue_script: Mutex<VecDeque<Result<(), SettlementError>>>,
	script: Mutex<VecDeque<Result<String, SettlementError>>>,
	issues: AtomicUsize,
	transfers: AtomicUsize,
	routes: Mutex<Vec<(Stage, TransferRoute)>>,
	amounts: Mutex<Vec<Vec<AssetAmount>>>,
}

impl ScriptedSettlement {
	pub fn with_script(script: Vec<Result<String, SettlementError>>) -> Self {
		Self {
			script: Mutex::new(script.into()),
			..Default::default()
		}
	}

	/// Queues outcomes for the next transfers.
	pub fn push(&self, outcome: Result<String, SettlementError>) {
		if let Ok(mut script) = self.script.lock() {
			script.push_back(outcome);
		}
	}

	/// Queues outcomes for the next asset issuances.
	pub fn push_issue(&self, outcome: Result<(), SettlementError>) {
		if let Ok(mut script) = self.issue_script.lock() {
			script.push_back(outcome);
		}
	}

	pub fn issues(&self) -> usize {
		self.issues.load(Ordering::SeqCst)
	}

	pub fn transfers(&self) -> usize {
		self.transfers.load(Ordering::SeqCst)
	}

	pub fn routes(&self) -> Vec<(Stage, TransferRoute)> {
		self.routes.lock().map(|r| r.clone()).unwrap_or_default()
	}

	/// Amounts of every transfer call, in call order.
	pub fn amounts(&self) -> Vec<Vec<AssetAmount>> {
		self.amounts.lock().map(|a| a.clone()).unwrap_or_default()
	}
}

#[async_trait]
impl SettlementInterface for ScriptedSettlement {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EmptySchema)
	}

	async fn create_assets(&self, codes: &[String]) -> Result<Vec<IssuedAsset>, SettlementError> {
		self.issues.fetch_add(1, Ordering::SeqCst);
		let outcome = self
			.issue_script
			.lock()
			.ok()
			.and_then(|mut script| script.pop_front())
			.unwrap_or(Ok(()));
		outcome.map(|()| {
			codes
				.iter()
				.map(|code| IssuedAsset {
					asset_code: code.clone(),
					issuer: "scripted-issuer".into(),
				})
				.collect()
		})
	}

	async fn transfer(
		&self,
		stage: Stage,
		route: TransferRoute,
		amounts: &[AssetAmount],
	) -> Result<SettlementReceipt, SettlementError> {
		let n = self.transfers.fetch_add(1, Ordering::SeqCst) + 1;
		if let Ok(mut routes) = self.routes.lock() {
			routes.push((stage, route));
		}
		if let Ok(mut seen) = self.amounts.lock() {
			seen.push(amounts.to_vec());
		}
		let outcome = self
			.script
			.lock()
			.ok()
			.and_then(|mut script| script.pop_front())
			.unwrap_or_else(|| Ok(format!("ref-{}", n)));
		outcome.map(|reference| SettlementReceipt {
			reference,
			recorded_at: current_timestamp(),
		})
	}
}
