use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::memory::Message;

pub const CRITICAL_ERROR_REPLY: &str =
    "Sorry, I encountered a critical error while processing your request.";

fn default_use_rag() -> bool {
    true
}

/// An inbound chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub new_chat: bool,
    #[serde(default = "default_use_rag")]
    pub use_rag: bool,
    #[serde(default)]
    pub group_id: Option<String>,
}

impl ChatRequest {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            message: message.into(),
            new_chat: false,
            use_rag: true,
            group_id: None,
        }
    }

    pub fn with_rag(mut self, use_rag: bool) -> Self {
        self.use_rag = use_rag;
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn starting_new_chat(mut self) -> Self {
        self.new_chat = true;
        self
    }

    /// Trimmed copy of the request. Empty user ids and messages are rejected;
    /// a blank group id becomes `None`.
    pub fn normalized(&self) -> Result<Self> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return Err(GatewayError::Validation("user_id cannot be empty or whitespace".to_string()));
        }
        let message = self.message.trim();
        if message.is_empty() {
            return Err(GatewayError::Validation("message cannot be empty or whitespace".to_string()));
        }
        let group_id = self
            .group_id
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string);

        Ok(Self {
            user_id: user_id.to_string(),
            message: message.to_string(),
            new_chat: self.new_chat,
            use_rag: self.use_rag,
            group_id,
        })
    }

    pub fn group(&self) -> &str {
        self.group_id.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub user_id: String,
    pub response: String,
    pub sources_used: Option<Vec<String>>,
    pub rag_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFailure {
    pub error: String,
    pub response: String,
}

impl ChatFailure {
    pub fn new(error: impl std::fmt::Display) -> Self {
        Self { error: error.to_string(), response: CRITICAL_ERROR_REPLY.to_string() }
    }
}

/// Result of processing one message. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatOutcome {
    Reply(ChatReply),
    Failed(ChatFailure),
}

impl ChatOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ChatOutcome::Failed(_))
    }

    pub fn response(&self) -> &str {
        match self {
            ChatOutcome::Reply(reply) => &reply.response,
            ChatOutcome::Failed(failure) => &failure.response,
        }
    }

    pub fn reply(&self) -> Option<&ChatReply> {
        match self {
            ChatOutcome::Reply(reply) => Some(reply),
            ChatOutcome::Failed(_) => None,
        }
    }
}

/// What the retrieval path produced for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum RagAttempt {
    Used { answer: String, sources: Vec<String> },
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserHistory {
    pub user_id: String,
    pub message_count: usize,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearHistoryResult {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthReport {
    Healthy {
        pool_size: usize,
        response_time_ms: f64,
        test_response: String,
    },
    Unhealthy {
        error: String,
    },
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthReport::Healthy { .. })
    }
}
