use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCacheConfig {
    /// When false, lookups always miss and inserts are dropped.
    pub enabled: bool,

    /// Lifetime of an entry, measured from insertion.
    pub ttl_seconds: u64,

    /// Entries kept before the least recently used one is evicted.
    pub max_entries: u64,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 3600,
            max_entries: 1000,
        }
    }
}

impl ResponseCacheConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.enable_caching,
            ttl_seconds: config.cache_ttl_seconds,
            max_entries: config.cache_max_size,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}
