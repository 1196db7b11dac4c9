//! Chat orchestration, bot mentions and their wire models.

pub mod bot;
pub mod chat_service;
pub mod models;

pub use bot::{BotKeyword, BotSessions, ContextMessage};
pub use chat_service::ChatService;
pub use models::{
    ChatFailure, ChatOutcome, ChatReply, ChatRequest, ClearHistoryResult, HealthReport, RagAttempt,
    UserHistory,
};
