//! Adapter registry construction.
//!
//! The coordinator owns the registry; adapters are built once at startup
//! from validated configuration and injected everywhere as constructor
//! arguments.

use std::sync::Arc;
use std::time::Duration;

use crate::app::config::Config;
use crate::core::platform::{
    AdapterRegistry, EbayAdapter, EbayCredentials, HttpEbayClient, HttpReverbClient,
    HttpShopifyClient, HttpVrClient, ReverbAdapter, ReverbCredentials, ShopifyAdapter,
    ShopifyCredentials, VrAdapter, VrCredentials,
};
use crate::core::domain::PlatformTag;
use crate::error::{ConfigError, Error, Result};

/// Build adapters for every enabled platform.
pub fn build_adapter_registry(config: &Config) -> Result<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    let timeout = config.sync.per_call_timeout();

    for platform in config.platforms.enabled() {
        match platform {
            PlatformTag::Ebay => {
                let auth_token = require(
                    config.platforms.ebay.auth_token.clone(),
                    "EBAY_AUTH_TOKEN",
                )?;
                let client = HttpEbayClient::new(
                    EbayCredentials {
                        api_url: config.platforms.ebay.api_url.clone(),
                        auth_token,
                        site_id: config.platforms.ebay.site_id.clone(),
                    },
                    http_client(timeout, false)?,
                );
                registry.register(Arc::new(EbayAdapter::new(Box::new(client))));
            }
            PlatformTag::Reverb => {
                let api_token = require(
                    config.platforms.reverb.api_token.clone(),
                    "REVERB_API_TOKEN",
                )?;
                let client = HttpReverbClient::new(
                    ReverbCredentials {
                        api_url: config.platforms.reverb.api_url.clone(),
                        api_token,
                    },
                    http_client(timeout, false)?,
                );
                registry.register(Arc::new(ReverbAdapter::new(Box::new(client))));
            }
            PlatformTag::Shopify => {
                let access_token = require(
                    config.platforms.shopify.access_token.clone(),
                    "SHOPIFY_ACCESS_TOKEN",
                )?;
                let client = HttpShopifyClient::new(
                    ShopifyCredentials {
                        api_url: config.platforms.shopify.api_url.clone(),
                        access_token,
                    },
                    http_client(timeout, false)?,
                );
                registry.register(Arc::new(ShopifyAdapter::new(Box::new(client))));
            }
            PlatformTag::Vr => {
                let password = require(config.platforms.vr.password.clone(), "VR_PASSWORD")?;
                let client = HttpVrClient::new(
                    VrCredentials {
                        base_url: config.platforms.vr.base_url.clone(),
                        username: config.platforms.vr.username.clone(),
                        password,
                    },
                    // The dashboard session lives in a cookie.
                    http_client(timeout, true)?,
                );
                registry.register(Arc::new(VrAdapter::new(
                    Box::new(client),
                    config.platforms.vr.base_url.clone(),
                )));
            }
        }
    }
    Ok(registry)
}

fn require(value: Option<String>, field: &'static str) -> Result<String> {
    value.ok_or_else(|| ConfigError::MissingField { field }.into())
}

fn http_client(timeout: Duration, cookies: bool) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("backline/", env!("CARGO_PKG_VERSION")));
    if cookies {
        builder = builder.cookie_store(true);
    }
    builder
        .build()
        .map_err(|e| Error::Fatal(format!("failed to build http client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_builds_empty_registry() {
        let config = Config::default();
        let registry = build_adapter_registry(&config).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn enabled_platform_without_secret_fails() {
        let mut config = Config::default();
        config.platforms.reverb.enabled = true;
        config.platforms.reverb.api_token = None;
        assert!(build_adapter_registry(&config).is_err());
    }

    #[test]
    fn enabled_platform_with_secret_registers() {
        let mut config = Config::default();
        config.platforms.reverb.enabled = true;
        config.platforms.reverb.api_token = Some("token".into());
        let registry = build_adapter_registry(&config).unwrap();
        assert_eq!(registry.platforms(), vec![PlatformTag::Reverb]);
    }
}
