// linkline/crates/linkline-gateway/src/config.rs

use anyhow::{bail, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::{info, warn};

/// Which vector database the namespace manager talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackendKind {
    Pinecone,
    Memory,
}

impl FromStr for VectorBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pinecone" => Ok(Self::Pinecone),
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            other => bail!("Unknown VECTOR_BACKEND '{}': expected 'pinecone' or 'memory'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub openai_api_keys: Vec<String>,
    pub openai_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub vector_backend: VectorBackendKind,
    pub pinecone_api_key: Option<String>,
    pub pinecone_controller_url: String,
    pub pinecone_index_name: String,
    pub pinecone_cloud: String,
    pub pinecone_region: String,
    pub index_ready_poll_seconds: u64,
    pub index_ready_timeout_seconds: u64,
    pub retrieval_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_workers: usize,
    pub llm_max_retries: u32,
    pub request_timeout_seconds: u64,
    pub enable_caching: bool,
    pub cache_ttl_seconds: u64,
    pub cache_max_size: u64,
    pub max_file_size: usize,
    pub daily_group_limit: u32,
    pub cors_origins: Vec<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 8000,
            openai_api_keys: Vec::new(),
            openai_base_url: "https://api.openai.com".to_string(),
            llm_model: "gpt-3.5-turbo".to_string(),
            llm_temperature: 0.7,
            llm_max_tokens: 1024,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            vector_backend: VectorBackendKind::Pinecone,
            pinecone_api_key: None,
            pinecone_controller_url: "https://api.pinecone.io".to_string(),
            pinecone_index_name: "chatbot-rag".to_string(),
            pinecone_cloud: "aws".to_string(),
            pinecone_region: "us-east-1".to_string(),
            index_ready_poll_seconds: 5,
            index_ready_timeout_seconds: 600,
            retrieval_k: 5,
            chunk_size: 1000,
            chunk_overlap: 200,
            max_workers: 3,
            llm_max_retries: 3,
            request_timeout_seconds: 60,
            enable_caching: true,
            cache_ttl_seconds: 3600,
            cache_max_size: 1000,
            max_file_size: 50 * 1024 * 1024,
            daily_group_limit: 10,
            cors_origins: vec!["*".to_string()],
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let defaults = Self::default();

        let api_port = match env::var("API_PORT").or_else(|_| env::var("PORT")) {
            Ok(port) => port.parse().context("API_PORT/PORT must be a port number")?,
            Err(_) => defaults.api_port,
        };

        let openai_api_keys = Self::collect_api_keys(
            env::var("OPENAI_API_KEY").ok().as_deref(),
            env::var("OPENAI_API_KEYS").ok().as_deref(),
        );
        if openai_api_keys.is_empty() {
            warn!("No OpenAI API key configured; chat requests will fail until one is set");
        }

        let config = Self {
            api_host: env::var("API_HOST").unwrap_or(defaults.api_host),
            api_port,
            openai_api_keys,
            openai_base_url: env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            llm_model: env::var("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_temperature: env::var("LLM_TEMPERATURE")
                .unwrap_or_else(|_| "0.7".into())
                .parse()?,
            llm_max_tokens: env::var("LLM_MAX_TOKENS")
                .unwrap_or_else(|_| "1024".into())
                .parse()?,
            embedding_model: env::var("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dimension: env::var("EMBEDDING_DIMENSION")
                .unwrap_or_else(|_| "1536".into())
                .parse()?,
            vector_backend: env::var("VECTOR_BACKEND")
                .unwrap_or_else(|_| "pinecone".into())
                .parse()?,
            pinecone_api_key: env::var("PINECONE_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            pinecone_controller_url: env::var("PINECONE_CONTROLLER_URL")
                .unwrap_or(defaults.pinecone_controller_url),
            pinecone_index_name: env::var("PINECONE_INDEX_NAME")
                .unwrap_or(defaults.pinecone_index_name),
            pinecone_cloud: env::var("PINECONE_CLOUD").unwrap_or(defaults.pinecone_cloud),
            pinecone_region: env::var("PINECONE_REGION").unwrap_or(defaults.pinecone_region),
            index_ready_poll_seconds: env::var("INDEX_READY_POLL_SECONDS")
                .unwrap_or_else(|_| "5".into())
                .parse()?,
            index_ready_timeout_seconds: env::var("INDEX_READY_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "600".into())
                .parse()?,
            retrieval_k: env::var("RETRIEVAL_K")
                .unwrap_or_else(|_| "5".into())
                .parse()?,
            chunk_size: env::var("CHUNK_SIZE")
                .unwrap_or_else(|_| "1000".into())
                .parse()?,
            chunk_overlap: env::var("CHUNK_OVERLAP")
                .unwrap_or_else(|_| "200".into())
                .parse()?,
            max_workers: env::var("MAX_WORKERS")
                .unwrap_or_else(|_| "3".into())
                .parse()?,
            llm_max_retries: env::var("LLM_MAX_RETRIES")
                .unwrap_or_else(|_| "3".into())
                .parse()?,
            request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "60".into())
                .parse()?,
            enable_caching: Self::parse_bool(
                &env::var("ENABLE_CACHING").unwrap_or_else(|_| "true".into()),
            )?,
            cache_ttl_seconds: env::var("CACHE_TTL")
                .unwrap_or_else(|_| "3600".into())
                .parse()?,
            cache_max_size: env::var("CACHE_MAX_SIZE")
                .unwrap_or_else(|_| "1000".into())
                .parse()?,
            max_file_size: env::var("MAX_FILE_SIZE")
                .unwrap_or_else(|_| (50 * 1024 * 1024).to_string())
                .parse()?,
            daily_group_limit: env::var("DAILY_GROUP_LIMIT")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            cors_origins: env::var("CORS_ORIGINS")
                .map(|raw| Self::split_list(&raw))
                .unwrap_or(defaults.cors_origins),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Merge the single-key and multi-key variables, dropping blanks and duplicates.
    fn collect_api_keys(single: Option<&str>, many: Option<&str>) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        let candidates = single
            .into_iter()
            .map(str::to_string)
            .chain(many.map(Self::split_list).unwrap_or_default());

        for key in candidates {
            let key = key.trim().to_string();
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn split_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn parse_bool(raw: &str) -> Result<bool> {
        match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => bail!("Invalid boolean value '{}'", other),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("CHUNK_SIZE must be greater than zero");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) must be less than CHUNK_SIZE ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.retrieval_k == 0 {
            bail!("RETRIEVAL_K must be greater than zero");
        }
        if self.vector_backend == VectorBackendKind::Pinecone && self.pinecone_api_key.is_none() {
            bail!("PINECONE_API_KEY not found in environment variables (or set VECTOR_BACKEND=memory)");
        }
        Ok(())
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- LLM: {} (temperature {}, {} API key(s))", self.llm_model, self.llm_temperature, self.openai_api_keys.len());
        info!("- LLM Base URL: {}", self.openai_base_url);
        info!("- Embeddings: {} ({} dims)", self.embedding_model, self.embedding_dimension);
        info!("- Vector Backend: {:?} (base index '{}')", self.vector_backend, self.pinecone_index_name);
        info!("- Chunking: size {}, overlap {}", self.chunk_size, self.chunk_overlap);
        info!("- Retrieval K: {}", self.retrieval_k);
        info!("- Workers: {}, LLM retries: {}", self.max_workers, self.llm_max_retries);
        info!("- Cache: enabled={}, ttl={}s, max={}", self.enable_caching, self.cache_ttl_seconds, self.cache_max_size);
        info!("- Daily Group Limit: {}", self.daily_group_limit);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.api_host, self.api_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper function to create a test Config that passes validation
    fn create_test_config() -> Config {
        Config {
            api_host: "127.0.0.1".to_string(),
            openai_api_keys: vec!["sk-test".to_string()],
            vector_backend: VectorBackendKind::Memory,
            ..Config::default()
        }
    }

    // ===== Defaults =====

    #[test]
    fn test_defaults_match_original_settings() {
        let config = Config::default();

        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.retrieval_k, 5);
        assert_eq!(config.cache_ttl_seconds, 3600);
        assert_eq!(config.cache_max_size, 1000);
        assert_eq!(config.embedding_dimension, 1536);
        assert_eq!(config.daily_group_limit, 10);
        assert_eq!(config.pinecone_index_name, "chatbot-rag");
    }

    #[test]
    fn test_test_config_is_valid() {
        assert!(create_test_config().validate().is_ok());
    }

    // ===== Validation =====

    #[test]
    fn test_overlap_must_be_less_than_chunk_size() {
        let mut config = create_test_config();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = create_test_config();
        config.chunk_size = 0;
        config.chunk_overlap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pinecone_backend_requires_key() {
        let mut config = create_test_config();
        config.vector_backend = VectorBackendKind::Pinecone;
        assert!(config.validate().is_err());

        config.pinecone_api_key = Some("pc-key".to_string());
        assert!(config.validate().is_ok());
    }

    // ===== Parsing helpers =====

    #[test]
    fn test_collect_api_keys_dedupes_and_drops_blanks() {
        let keys = Config::collect_api_keys(Some("sk-a"), Some("sk-b, ,sk-a,sk-c"));
        assert_eq!(keys, vec!["sk-a", "sk-b", "sk-c"]);

        assert!(Config::collect_api_keys(None, None).is_empty());
        assert!(Config::collect_api_keys(Some("  "), None).is_empty());
    }

    #[test]
    fn test_vector_backend_parsing() {
        assert_eq!("pinecone".parse::<VectorBackendKind>().unwrap(), VectorBackendKind::Pinecone);
        assert_eq!("Memory".parse::<VectorBackendKind>().unwrap(), VectorBackendKind::Memory);
        assert!("chroma".parse::<VectorBackendKind>().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(Config::parse_bool("TRUE").unwrap());
        assert!(!Config::parse_bool("off").unwrap());
        assert!(Config::parse_bool("maybe").is_err());
    }

    // ===== API Address Tests =====

    #[test]
    fn test_api_addr_parsing() {
        let config = create_test_config();
        let addr = config.api_addr().unwrap();

        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_api_addr_with_zero_address() {
        let mut config = create_test_config();
        config.api_host = "0.0.0.0".to_string();
        config.api_port = 5000;

        let addr = config.api_addr().unwrap();
        assert_eq!(addr.port(), 5000);
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_api_addr_rejects_hostname_garbage() {
        let mut config = create_test_config();
        config.api_host = "not a host".to_string();
        assert!(config.api_addr().is_err());
    }
}
