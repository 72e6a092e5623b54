//! Application layer - configuration and run orchestration.

mod config;
mod coordinator;

pub use config::{
    Config, EbayConfig, LoggingConfig, PlatformsConfig, ReverbConfig, ShopifyConfig, SyncConfig,
    VrConfig,
};
pub use coordinator::{build_adapter_registry, RunOutcome, SyncCoordinator};
