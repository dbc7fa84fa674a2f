//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Every pluggable implementation (ledger storage, settlement network, ERP
/// resolver) exposes a `Registry` type declaring the name it is configured
/// under and the factory that builds it, for example `memory` for
/// `ledger.implementations.memory`.
pub trait ImplementationRegistry {
	/// Name used as the key under `<section>.implementations` in TOML.
	const NAME: &'static str;

	/// Factory function type of the owning component.
	type Factory;

	/// Returns the factory that builds this implementation from its TOML table.
	fn factory() -> Self::Factory;
}
