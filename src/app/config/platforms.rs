//! Per-marketplace credentials and endpoints.
//!
//! Tokens and passwords are never read from the config file; they come from
//! the environment (`EBAY_AUTH_TOKEN`, `REVERB_API_TOKEN`,
//! `SHOPIFY_ACCESS_TOKEN`, `VR_PASSWORD`), loaded after the TOML parse.

use serde::Deserialize;

use crate::core::domain::PlatformTag;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EbayConfig {
    pub enabled: bool,
    pub api_url: String,
    pub site_id: String,
    #[serde(skip)]
    pub auth_token: Option<String>,
}

impl Default for EbayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.ebay.com/ws/api.dll".into(),
            site_id: "3".into(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReverbConfig {
    pub enabled: bool,
    pub api_url: String,
    #[serde(skip)]
    pub api_token: Option<String>,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.reverb.com/api".into(),
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShopifyConfig {
    pub enabled: bool,
    /// `https://{shop}.myshopify.com/admin/api/{version}`
    pub api_url: String,
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Default for ShopifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: String::new(),
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VrConfig {
    pub enabled: bool,
    pub base_url: String,
    pub username: String,
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for VrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://www.vintageandrare.com".into(),
            username: String::new(),
            password: None,
        }
    }
}

/// All marketplace configurations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    pub ebay: EbayConfig,
    pub reverb: ReverbConfig,
    pub shopify: ShopifyConfig,
    pub vr: VrConfig,
}

impl PlatformsConfig {
    /// Platforms enabled for this process, in stable order.
    #[must_use]
    pub fn enabled(&self) -> Vec<PlatformTag> {
        let mut enabled = Vec::new();
        if self.ebay.enabled {
            enabled.push(PlatformTag::Ebay);
        }
        if self.reverb.enabled {
            enabled.push(PlatformTag::Reverb);
        }
        if self.shopify.enabled {
            enabled.push(PlatformTag::Shopify);
        }
        if self.vr.enabled {
            enabled.push(PlatformTag::Vr);
        }
        enabled
    }

    /// Pull secrets from the environment.
    pub fn load_secrets(&mut self) {
        self.ebay.auth_token = std::env::var("EBAY_AUTH_TOKEN").ok();
        self.reverb.api_token = std::env::var("REVERB_API_TOKEN").ok();
        self.shopify.access_token = std::env::var("SHOPIFY_ACCESS_TOKEN").ok();
        self.vr.password = std::env::var("VR_PASSWORD").ok();
    }
}
