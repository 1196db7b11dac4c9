// linkline/crates/linkline-gateway/src/lib.rs

pub mod cache_management;
pub mod chat;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod llm;
pub mod memory;
pub mod quota;
pub mod rag;
pub mod shared_state;
pub mod telemetry;
pub mod thread_pool;
pub mod utils;
pub mod vector_store;

#[cfg(feature = "server")]
pub mod api;
#[cfg(feature = "server")]
pub mod metrics;
#[cfg(feature = "server")]
pub mod server;

#[cfg(test)]
mod test_support;

// Public API exports
pub use chat::{ChatOutcome, ChatRequest, ChatService};
pub use config::Config;
pub use error::{GatewayError, Result};
pub use memory::{HistoryStore, InMemoryHistoryStore, Message};
pub use shared_state::{SharedState, UnifiedAppState};
pub use vector_store::VectorNamespaceManager;

#[cfg(feature = "server")]
pub use server::run_server;
