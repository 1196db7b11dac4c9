//! Per-user conversation history.
//!
//! One append-only history per user identifier, kept for the lifetime of the
//! process. Turns are stored in creation order; a new chat swaps the history
//! for an empty one.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Ordered turns of one user's conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.turns.push(Message::user(content));
    }

    pub fn add_ai_message(&mut self, content: impl Into<String>) {
        self.turns.push(Message::assistant(content));
    }
}

pub trait HistoryStore: Send + Sync {
    /// Snapshot of the user's turns, creating an empty history on first use.
    fn get_history(&self, user_id: &str) -> Vec<Message>;
    /// Append the user turn then the assistant turn.
    fn append_exchange(&self, user_id: &str, user_text: &str, assistant_text: &str);
    /// Replace the user's history with an empty one.
    fn reset(&self, user_id: &str);
    /// Drop the user's history entirely. Returns whether one existed.
    fn clear_history(&self, user_id: &str) -> bool;
    fn user_count(&self) -> usize;
}

/// Process-local store. Each user's history sits behind its own lock so
/// different users never contend; two in-flight requests for the same user
/// are not ordered against each other beyond single appends.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    store: Arc<DashMap<String, Arc<RwLock<ConversationHistory>>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self, user_id: &str) -> Arc<RwLock<ConversationHistory>> {
        if let Some(history) = self.store.get(user_id) {
            return history.clone();
        }
        self.store
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(ConversationHistory::new())))
            .clone()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn get_history(&self, user_id: &str) -> Vec<Message> {
        let session = self.session(user_id);
        let guard = session.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.messages().to_vec()
    }

    fn append_exchange(&self, user_id: &str, user_text: &str, assistant_text: &str) {
        let session = self.session(user_id);
        let mut guard = session.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.add_user_message(user_text);
        guard.add_ai_message(assistant_text);
    }

    fn reset(&self, user_id: &str) {
        self.store.insert(
            user_id.to_string(),
            Arc::new(RwLock::new(ConversationHistory::new())),
        );
    }

    fn clear_history(&self, user_id: &str) -> bool {
        self.store.remove(user_id).is_some()
    }

    fn user_count(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_created_on_first_use() {
        let store = InMemoryHistoryStore::new();
        assert!(store.get_history("alice").is_empty());
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn test_exchange_appends_user_then_assistant() {
        let store = InMemoryHistoryStore::new();
        store.append_exchange("alice", "hi", "hello");
        store.append_exchange("alice", "how are you?", "fine");

        let history = store.get_history("alice");
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], Message::user("hi"));
        assert_eq!(history[1], Message::assistant("hello"));
        assert_eq!(history[3].role, Role::Assistant);
    }

    #[test]
    fn test_reset_discards_previous_turns() {
        let store = InMemoryHistoryStore::new();
        store.append_exchange("alice", "hi", "hello");
        store.reset("alice");
        assert!(store.get_history("alice").is_empty());
    }

    #[test]
    fn test_users_are_isolated() {
        let store = InMemoryHistoryStore::new();
        store.append_exchange("alice", "hi", "hello");
        assert!(store.get_history("bob").is_empty());
        assert!(store.clear_history("alice"));
        assert!(!store.clear_history("carol"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
