// linkline/crates/linkline-gateway/src/api/mod.rs
//! HTTP handlers over the shared application state

pub mod bot_api;
pub mod chat_api;
pub mod document_api;
pub mod error;
pub mod health_api;
pub mod knowledge_base_api;

// Re-export API handlers
pub use bot_api::{bot_chat, rag_bot};
pub use chat_api::{chat, chat_health_check, clear_chat_history, get_chat_history};
pub use document_api::upload_document;
pub use error::{ApiError, ApiResult};
pub use knowledge_base_api::{clear_knowledge_base, get_knowledge_base_info, search_knowledge_base};
