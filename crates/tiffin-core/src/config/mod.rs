//! Cloud and sync configuration.
//!
//! `CloudConfig` describes where the cloud store lives and which shop this
//! device belongs to. A missing URL or key is a valid state: the device
//! then runs offline-only and every sync entry point becomes a no-op.

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

/// Shop identifier used when none is configured.
pub const DEFAULT_SHOP_ID: &str = "shop_1";

pub const ENV_CLOUD_URL: &str = "TIFFIN_CLOUD_URL";
pub const ENV_CLOUD_KEY: &str = "TIFFIN_CLOUD_KEY";
pub const ENV_SHOP_ID: &str = "TIFFIN_SHOP_ID";

const DEFAULT_PULL_PAGE_SIZE: usize = 1000;
const DEFAULT_ID_CHUNK_SIZE: usize = 100;
const DEFAULT_UPSERT_BATCH_SIZE: usize = 500;

/// Connection details for the cloud table API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CloudConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_shop_id")]
    pub shop_id: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            shop_id: default_shop_id(),
        }
    }
}

impl CloudConfig {
    /// Create a configuration for the default shop
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: normalize_text_option(Some(url.into())),
            api_key: normalize_text_option(Some(api_key.into())),
            shop_id: default_shop_id(),
        }
    }

    /// Override the shop identifier
    #[must_use]
    pub fn with_shop_id(mut self, shop_id: impl Into<String>) -> Self {
        self.shop_id = normalize_text_option(Some(shop_id.into())).unwrap_or_else(default_shop_id);
        self
    }

    /// Read configuration from `TIFFIN_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            url: normalize_text_option(lookup(ENV_CLOUD_URL))
                .map(|url| url.trim_end_matches('/').to_string()),
            api_key: normalize_text_option(lookup(ENV_CLOUD_KEY)),
            shop_id: normalize_text_option(lookup(ENV_SHOP_ID)).unwrap_or_else(default_shop_id),
        }
    }

    /// Check if the cloud store is configured
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.url.as_deref().is_some_and(is_http_url)
    }
}

fn default_shop_id() -> String {
    DEFAULT_SHOP_ID.to_string()
}

/// Tunables for batch sizes against the cloud store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSettings {
    /// Rows requested per page when pulling
    pub pull_page_size: usize,
    /// Ids per request when looking up cloud timestamps before a push
    pub id_chunk_size: usize,
    /// Rows per upsert request
    pub upsert_batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pull_page_size: DEFAULT_PULL_PAGE_SIZE,
            id_chunk_size: DEFAULT_ID_CHUNK_SIZE,
            upsert_batch_size: DEFAULT_UPSERT_BATCH_SIZE,
        }
    }
}

impl SyncSettings {
    /// Clamp every size to at least one row.
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self {
            pull_page_size: self.pull_page_size.max(1),
            id_chunk_size: self.id_chunk_size.max(1),
            upsert_batch_size: self.upsert_batch_size.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_not_configured() {
        let config = CloudConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.shop_id, DEFAULT_SHOP_ID);
    }

    #[test]
    fn from_lookup_reads_and_trims_values() {
        let config = CloudConfig::from_lookup(lookup_from(&[
            (ENV_CLOUD_URL, " https://project.supabase.co/ "),
            (ENV_CLOUD_KEY, "service-key"),
            (ENV_SHOP_ID, "shop_7"),
        ]));
        assert!(config.is_configured());
        assert_eq!(config.url.as_deref(), Some("https://project.supabase.co"));
        assert_eq!(config.shop_id, "shop_7");
    }

    #[test]
    fn missing_key_or_bad_scheme_disables_cloud() {
        let no_key =
            CloudConfig::from_lookup(lookup_from(&[(ENV_CLOUD_URL, "https://example.com")]));
        assert!(!no_key.is_configured());

        let bad_scheme = CloudConfig::new("project.supabase.co", "key");
        assert!(!bad_scheme.is_configured());
    }

    #[test]
    fn blank_shop_falls_back_to_default() {
        let config = CloudConfig::new("https://example.com", "key").with_shop_id("   ");
        assert_eq!(config.shop_id, DEFAULT_SHOP_ID);
    }

    #[test]
    fn deserialize_rejects_unknown_fields() {
        let error = serde_json::from_str::<CloudConfig>(r#"{"url": "https://x", "token": "t"}"#)
            .unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn sanitized_settings_never_use_zero_sizes() {
        let settings = SyncSettings {
            pull_page_size: 0,
            id_chunk_size: 0,
            upsert_batch_size: 0,
        }
        .sanitized();
        assert_eq!(settings.pull_page_size, 1);
        assert_eq!(settings.id_chunk_size, 1);
        assert_eq!(settings.upsert_batch_size, 1);
    }
}
