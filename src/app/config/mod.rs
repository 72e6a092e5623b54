//! Application configuration loading and validation.
//!
//! Configuration is loaded from a TOML file with environment variable
//! overrides for sensitive values like marketplace tokens.

use std::path::Path;

use serde::Deserialize;

mod logging;
mod platforms;
mod sync;

pub use logging::LoggingConfig;
pub use platforms::{EbayConfig, PlatformsConfig, ReverbConfig, ShopifyConfig, VrConfig};
pub use sync::SyncConfig;

use crate::core::domain::PlatformTag;
use crate::error::{ConfigError, Result};

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub platforms: PlatformsConfig,
    pub sync: SyncConfig,
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: String,
    /// Detect and decide but don't execute outbound actions.
    pub dry_run: bool,
}

fn default_database_path() -> String {
    "backline.db".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let mut config: Self = toml::from_str(&content).map_err(ConfigError::Parse)?;

        // Secrets come from the environment, never from the config file.
        config.platforms.load_secrets();

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "database" }.into());
        }
        if self.sync.detection_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "detection_concurrency",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.sync.dispatch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatch_concurrency",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.sync.per_call_timeout_seconds == 0
            || self.sync.per_detection_timeout_seconds == 0
            || self.sync.run_timeout_seconds == 0
        {
            return Err(ConfigError::InvalidValue {
                field: "timeouts",
                reason: "timeouts must be greater than 0".to_string(),
            }
            .into());
        }
        if self.sync.per_detection_timeout_seconds > self.sync.run_timeout_seconds {
            return Err(ConfigError::InvalidValue {
                field: "per_detection_timeout_seconds",
                reason: "must not exceed run_timeout_seconds".to_string(),
            }
            .into());
        }
        if self.sync.price_match_epsilon < rust_decimal::Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "price_match_epsilon",
                reason: "must be 0 or greater".to_string(),
            }
            .into());
        }
        if self.sync.matcher_confidence_threshold > 100 {
            return Err(ConfigError::InvalidValue {
                field: "matcher_confidence_threshold",
                reason: "must be between 0 and 100".to_string(),
            }
            .into());
        }

        for platform in self.platforms.enabled() {
            self.validate_credentials(platform)?;
        }
        Ok(())
    }

    fn validate_credentials(&self, platform: PlatformTag) -> Result<()> {
        let missing: Option<&'static str> = match platform {
            PlatformTag::Ebay if self.platforms.ebay.auth_token.is_none() => {
                Some("EBAY_AUTH_TOKEN")
            }
            PlatformTag::Reverb if self.platforms.reverb.api_token.is_none() => {
                Some("REVERB_API_TOKEN")
            }
            PlatformTag::Shopify if self.platforms.shopify.access_token.is_none() => {
                Some("SHOPIFY_ACCESS_TOKEN")
            }
            PlatformTag::Shopify if self.platforms.shopify.api_url.trim().is_empty() => {
                Some("shopify.api_url")
            }
            PlatformTag::Vr if self.platforms.vr.username.trim().is_empty() => {
                Some("vr.username")
            }
            PlatformTag::Vr if self.platforms.vr.password.is_none() => Some("VR_PASSWORD"),
            _ => None,
        };
        match missing {
            Some(field) => Err(ConfigError::MissingField { field }.into()),
            None => Ok(()),
        }
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
