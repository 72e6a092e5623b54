//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`domain`] - Builders for canonical fixtures: products, local rows,
//!   remote listings, sync events.
//! - [`adapters`] - [`ScriptedAdapter`](adapters::ScriptedAdapter), a
//!   recording [`MarketplaceAdapter`](crate::core::platform::MarketplaceAdapter)
//!   with scripted snapshots and failure injection.

pub mod adapters;
pub mod domain;
