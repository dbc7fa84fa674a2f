//! Lifecycle stages and custody routes.
//!
//! An order moves along the main path `Create -> Confirm -> Consolidate ->
//! Deliver`. `Cancel` is a side branch that returns the order's assets to the
//! issuer from whichever role held them after the last successful stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One point in an order's custody lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
	Create,
	Confirm,
	Consolidate,
	Deliver,
	Cancel,
}

impl Stage {
	/// Main-path stages in lifecycle order.
	pub const MAIN_PATH: [Stage; 4] = [
		Stage::Create,
		Stage::Confirm,
		Stage::Consolidate,
		Stage::Deliver,
	];

	/// Returns the string representation used in logs and storage.
	pub fn as_str(&self) -> &'static str {
		match self {
			Stage::Create => "create",
			Stage::Confirm => "confirm",
			Stage::Consolidate => "consolidate",
			Stage::Deliver => "deliver",
			Stage::Cancel => "cancel",
		}
	}

	/// Returns true for every stage except `Cancel`.
	pub fn is_main_path(&self) -> bool {
		!matches!(self, Stage::Cancel)
	}

	/// Zero-based position on the main path, `None` for `Cancel`.
	pub fn position(&self) -> Option<usize> {
		Self::MAIN_PATH.iter().position(|stage| stage == self)
	}

	/// The role holding the order's assets once this stage has succeeded.
	///
	/// Returns `None` for `Cancel`, after which custody is back with the issuer
	/// and the order is closed.
	pub fn holder(&self) -> Option<Role> {
		match self {
			Stage::Create => Some(Role::Distributor),
			Stage::Confirm => Some(Role::Confirm),
			Stage::Consolidate => Some(Role::Consolidate),
			Stage::Deliver => Some(Role::Deliver),
			Stage::Cancel => None,
		}
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Stage {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"create" => Ok(Stage::Create),
			"confirm" => Ok(Stage::Confirm),
			"consolidate" => Ok(Stage::Consolidate),
			"deliver" => Ok(Stage::Deliver),
			"cancel" => Ok(Stage::Cancel),
			other => Err(format!("unknown stage '{}'", other)),
		}
	}
}

/// Custody role on the settlement network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Issuer,
	Distributor,
	Confirm,
	Consolidate,
	Deliver,
}

impl Role {
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Issuer => "issuer",
			Role::Distributor => "distributor",
			Role::Confirm => "confirm",
			Role::Consolidate => "consolidate",
			Role::Deliver => "deliver",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Source and destination roles of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRoute {
	pub source: Role,
	pub destination: Role,
}

impl TransferRoute {
	pub fn new(source: Role, destination: Role) -> Self {
		Self {
			source,
			destination,
		}
	}

	/// Route for a main-path stage.
	///
	/// Returns `None` for `Cancel`, whose source depends on history; see
	/// [`TransferRoute::cancel_from`].
	pub fn for_stage(stage: Stage) -> Option<Self> {
		let route = match stage {
			Stage::Create => Self::new(Role::Issuer, Role::Distributor),
			Stage::Confirm => Self::new(Role::Distributor, Role::Confirm),
			Stage::Consolidate => Self::new(Role::Confirm, Role::Consolidate),
			Stage::Deliver => Self::new(Role::Consolidate, Role::Deliver),
			Stage::Cancel => return None,
		};
		Some(route)
	}

	/// Route that returns assets to the issuer after `last_successful`.
	pub fn cancel_from(last_successful: Stage) -> Option<Self> {
		match last_successful {
			Stage::Deliver | Stage::Cancel => None,
			stage => stage
				.holder()
				.map(|holder| Self::new(holder, Role::Issuer)),
		}
	}
}

impl fmt::Display for TransferRoute {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}->{}", self.source, self.destination)
	}
}
