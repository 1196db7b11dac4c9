//! Response caching for the chat endpoint.

pub mod cache_config;
pub mod response_cache;

pub use cache_config::ResponseCacheConfig;
pub use response_cache::{cache_key, ResponseCache};
