//! Time-expiring cache of successful chat replies.

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::time::Duration;
use tracing::debug;

use super::cache_config::ResponseCacheConfig;
use crate::chat::{ChatOutcome, ChatReply};

/// Hex digits of the message digest kept in a key.
const FINGERPRINT_LEN: usize = 16;

/// Stable cache key. The message is reduced to a digest prefix so keys stay short.
pub fn cache_key(user_id: &str, message: &str, use_rag: bool, group_id: Option<&str>) -> String {
    let digest = blake3::hash(message.as_bytes()).to_hex();
    format!(
        "{}:{}:{}:{}",
        user_id,
        &digest.as_str()[..FINGERPRINT_LEN],
        use_rag,
        group_id.unwrap_or("")
    )
}

/// Only successful replies are stored; a failed outcome has no representation here.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Cache<String, ChatReply>,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(config: &ResponseCacheConfig) -> Self {
        Self::with_ttl(config.max_entries, config.ttl(), config.enabled)
    }

    fn with_ttl(max_entries: u64, ttl: Duration, enabled: bool) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { entries, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn get(&self, key: &str) -> Option<ChatReply> {
        if !self.enabled {
            return None;
        }
        let hit = self.entries.get(key).await;
        if hit.is_some() {
            debug!("Response cache hit for {}", key);
        }
        hit
    }

    pub async fn set(&self, key: String, reply: ChatReply) {
        if self.enabled {
            self.entries.insert(key, reply).await;
        }
    }

    /// Store the outcome when it is a reply. Returns whether anything was stored.
    pub async fn set_outcome(&self, key: String, outcome: &ChatOutcome) -> bool {
        match outcome {
            ChatOutcome::Reply(reply) if self.enabled => {
                self.set(key, reply.clone()).await;
                true
            }
            _ => false,
        }
    }

    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    /// Drop every cached reply, e.g. after a knowledge base changes.
    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }
}
