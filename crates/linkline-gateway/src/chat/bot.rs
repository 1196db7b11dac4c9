//! Mention-triggered bots for group chats.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::llm::{Chain, ChatModel};
use crate::memory::Message;
use crate::utils::TextUtils;

/// How many trailing group messages an explanation sees.
pub const CONTEXT_WINDOW: usize = 10;

pub const EMPTY_MENTION_QUERY: &str = "Hello! What would you like me to help with?";

/// The user id group messages from the bot carry.
pub const BOT_USER_ID: &str = "bot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotKeyword {
    Explain,
    Help,
}

impl BotKeyword {
    pub const ALL: [BotKeyword; 2] = [BotKeyword::Explain, BotKeyword::Help];

    pub fn mention(&self) -> &'static str {
        match self {
            BotKeyword::Explain => "@explain",
            BotKeyword::Help => "@help",
        }
    }

    pub fn bot_name(&self) -> &'static str {
        match self {
            BotKeyword::Explain => "ExplainBot",
            BotKeyword::Help => "HelpBot",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            BotKeyword::Explain => "You are an explanation assistant.",
            BotKeyword::Help => "You are a helpful assistant using knowledge base.",
        }
    }

    /// First bot mentioned in `message`, matched case-insensitively.
    pub fn detect(message: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| TextUtils::contains_ignore_case(message, k.mention()))
    }

    /// The message with the mention removed and whitespace collapsed.
    pub fn extract_query(&self, message: &str) -> String {
        let stripped = TextUtils::remove_ignore_case(message, self.mention());
        let query = TextUtils::normalize_whitespace(stripped.trim()).into_owned();
        if query.is_empty() {
            EMPTY_MENTION_QUERY.to_string()
        } else {
            query
        }
    }
}

/// A message from the surrounding group conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
}

pub fn explain_messages(query: &str, context: &[ContextMessage]) -> Vec<Message> {
    let mut messages = vec![Message::system(BotKeyword::Explain.system_prompt())];
    if !context.is_empty() {
        let start = context.len().saturating_sub(CONTEXT_WINDOW);
        let mut transcript = String::from("Conversation context:\n");
        for msg in &context[start..] {
            let role = if msg.user_id == BOT_USER_ID { "Assistant" } else { "User" };
            transcript.push_str(&format!("{}: {}\n", role, msg.message));
        }
        messages.push(Message::system(transcript));
    }
    messages.push(Message::user(query));
    messages
}

/// Single call with a fully prepared prompt.
#[derive(Clone)]
pub struct ExplainChain {
    llm: Arc<dyn ChatModel>,
}

impl ExplainChain {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Chain for ExplainChain {
    type Input = Vec<Message>;
    type Output = String;

    async fn invoke(&self, input: &Vec<Message>) -> Result<String> {
        self.llm.complete(input).await
    }

    fn rebind(&self, llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }
}

/// Session ids per (group, user). The first call for a pair starts a new chat.
#[derive(Default)]
pub struct BotSessions {
    sessions: DashMap<(String, String), String>,
}

impl BotSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pair's session id and whether it was just created.
    pub fn begin(&self, group_id: &str, user_id: &str) -> (String, bool) {
        let key = (group_id.to_string(), user_id.to_string());
        if let Some(existing) = self.sessions.get(&key) {
            return (existing.value().clone(), false);
        }
        let entry = self.sessions.entry(key).or_insert_with(|| Uuid::new_v4().to_string());
        (entry.value().clone(), true)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
