//! Common types for the order custody system.
//!
//! This crate defines the data types shared by every custody component:
//! lifecycle stages and custody roles, ledger records, order lines and their
//! asset representation, events, storage namespaces and the configuration
//! schema framework used by pluggable implementations.

/// Event types published by the order sequencer.
pub mod events;
/// Ledger record types.
pub mod ledger;
/// Order line and asset amount types.
pub mod order;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Lifecycle stages, custody roles and transfer routes.
pub mod stage;
/// Storage namespaces.
pub mod storage;
/// Formatting helpers for log output.
pub mod utils;
/// Configuration validation types.
pub mod validation;

pub use events::*;
pub use ledger::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use stage::*;
pub use storage::*;
pub use utils::{current_timestamp, short_reference};
pub use validation::*;
