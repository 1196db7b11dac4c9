// Bot mention endpoints used by the group chat app
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::chat::{BotKeyword, ChatOutcome, ChatRequest, ContextMessage};
use crate::shared_state::{SharedState, UnifiedAppState};

pub const NO_RESPONSE_FALLBACK: &str = "Sorry, I couldn't generate a response.";

#[derive(Debug, Deserialize)]
pub struct BotMessage {
    pub message: String,
    pub group_id: String,
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub context: Option<Vec<ContextMessage>>,
}

#[derive(Debug, Serialize)]
pub struct BotResponse {
    pub response: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub bot_name: String,
    pub timestamp: DateTime<Utc>,
    pub group_id: String,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct RagBotRequest {
    pub query: String,
    pub group_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct RagBotResponse {
    pub response: String,
    pub rag_enabled: bool,
    pub sources_used: Vec<String>,
    pub session_id: String,
}

/// Run a knowledge-base question for the (group, user) session. The first
/// question of a session starts with an empty history.
async fn session_answer(shared: &SharedState, group_id: &str, user_id: &str, query: String) -> (ChatOutcome, String) {
    let (session_id, is_new) = shared.bot_sessions.begin(group_id, user_id);
    let mut request = ChatRequest::new(user_id, query).with_group(group_id);
    if is_new {
        request = request.starting_new_chat();
    }
    (shared.chat_service.process_message(&request).await, session_id)
}

/// POST /chat
pub async fn bot_chat(
    State(state): State<UnifiedAppState>,
    Json(message): Json<BotMessage>,
) -> ApiResult<Json<BotResponse>> {
    let shared = &state.shared_state;
    let keyword = BotKeyword::detect(&message.message)
        .ok_or_else(|| ApiError::bad_request("No supported bot mention"))?;

    shared.usage_limiter.check_and_increment(&message.group_id, keyword.mention())?;
    let query = keyword.extract_query(&message.message);
    info!("{} invoked in group {} by {}", keyword.bot_name(), message.group_id, message.user_id);

    let response = match keyword {
        BotKeyword::Explain => {
            let context = message.context.as_deref().unwrap_or_default();
            shared.chat_service.explain(&query, context).await
        }
        BotKeyword::Help => {
            let (outcome, _) = session_answer(shared, &message.group_id, &message.user_id, query).await;
            let text = outcome.response();
            if text.is_empty() { NO_RESPONSE_FALLBACK.to_string() } else { text.to_string() }
        }
    };

    Ok(Json(BotResponse {
        response,
        kind: "aiResponse".to_string(),
        bot_name: keyword.bot_name().to_string(),
        timestamp: Utc::now(),
        group_id: message.group_id,
        user_id: message.user_id,
        username: message.username,
    }))
}

/// POST /rag
pub async fn rag_bot(
    State(state): State<UnifiedAppState>,
    Json(request): Json<RagBotRequest>,
) -> ApiResult<Json<RagBotResponse>> {
    let (outcome, session_id) =
        session_answer(&state.shared_state, &request.group_id, &request.user_id, request.query).await;

    match outcome {
        ChatOutcome::Reply(reply) => Ok(Json(RagBotResponse {
            response: reply.response,
            rag_enabled: reply.rag_enabled,
            sources_used: reply.sources_used.unwrap_or_default(),
            session_id,
        })),
        ChatOutcome::Failed(failure) => Err(ApiError::internal(format!("RAG error: {}", failure.error))),
    }
}
