//! Backline - multi-marketplace inventory synchronization.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── core/             # Reusable library components
//! │   ├── domain/       # Canonical product/listing/event types
//! │   ├── diff/         # Pure differential detection engine
//! │   ├── events/       # Durable sync-event writer + match suggester
//! │   ├── reconcile/    # Cross-marketplace reconciliation decisions
//! │   ├── dispatch/     # Outbound action execution
//! │   ├── platform/     # Marketplace adapters (eBay, Reverb, Shopify, V&R)
//! │   ├── store/        # Transactional persistence boundary
//! │   └── service/      # Cross-cutting services (run statistics)
//! └── app/              # Configuration and run orchestration
//! ```
//!
//! # Features
//!
//! - `testkit` - Expose scripted adapters and fixture builders to tests

pub mod app;
pub mod cli;
pub mod core;
pub mod error;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
