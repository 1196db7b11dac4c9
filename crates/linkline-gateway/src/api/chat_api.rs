// Chat endpoints: cached RAG-or-plain answers and per-user history
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::cache_management::cache_key;
use crate::chat::{ChatFailure, ChatOutcome, ChatReply, ChatRequest, ClearHistoryResult, HealthReport, UserHistory};
use crate::metrics;
use crate::shared_state::UnifiedAppState;

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub user_id: String,
    pub input: String,
    pub response: String,
    pub message_count: usize,
    pub sources_used: Option<Vec<String>>,
    pub rag_enabled: bool,
    pub response_time_ms: f64,
    pub from_cache: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChatEndpointResponse {
    Answer(ChatResponse),
    Failed(ChatFailure),
}

fn answer(
    reply: ChatReply,
    input: String,
    message_count: usize,
    started: Instant,
    from_cache: bool,
) -> ChatEndpointResponse {
    ChatEndpointResponse::Answer(ChatResponse {
        user_id: reply.user_id,
        input,
        response: reply.response,
        message_count,
        sources_used: reply.sources_used,
        rag_enabled: reply.rag_enabled,
        response_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        from_cache,
    })
}

/// POST /rag/chat
pub async fn chat(
    State(state): State<UnifiedAppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatEndpointResponse>> {
    let started = Instant::now();
    let request = request.normalized()?;
    let shared = &state.shared_state;

    let key = cache_key(&request.user_id, &request.message, request.use_rag, request.group_id.as_deref());
    // A new chat must reach the orchestrator so the history is reset.
    let cached = if request.new_chat { None } else { shared.response_cache.get(&key).await };
    if let Some(cached) = cached {
        info!("Cache hit for user {}", request.user_id);
        shared.counters.inc_cache_hit();
        metrics::inc_cache_lookup(true);
        let message_count = shared.chat_service.get_user_history(&request.user_id).message_count;
        return Ok(Json(answer(cached, request.message, message_count, started, true)));
    }
    if shared.response_cache.is_enabled() {
        shared.counters.inc_cache_miss();
        metrics::inc_cache_lookup(false);
    }

    let outcome = shared.chat_service.process_message(&request).await;
    shared.counters.record_outcome(&outcome, started.elapsed());
    shared.response_cache.set_outcome(key, &outcome).await;

    match outcome {
        ChatOutcome::Reply(reply) => {
            metrics::inc_chat_mode(if reply.rag_enabled { "rag" } else { "plain" });
            let message_count = shared.chat_service.get_user_history(&request.user_id).message_count;
            Ok(Json(answer(reply, request.message, message_count, started, false)))
        }
        ChatOutcome::Failed(failure) => {
            metrics::inc_chat_mode("error");
            Ok(Json(ChatEndpointResponse::Failed(failure)))
        }
    }
}

/// GET /rag/chat/history/:user_id
pub async fn get_chat_history(
    State(state): State<UnifiedAppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserHistory>> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::bad_request("user_id cannot be empty"));
    }
    Ok(Json(state.shared_state.chat_service.get_user_history(user_id)))
}

/// DELETE /rag/chat/history/:user_id
pub async fn clear_chat_history(
    State(state): State<UnifiedAppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ClearHistoryResult>> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::bad_request("user_id cannot be empty"));
    }
    Ok(Json(state.shared_state.chat_service.clear_user_history(user_id)))
}

/// GET /rag/chat/health
pub async fn chat_health_check(State(state): State<UnifiedAppState>) -> Json<HealthReport> {
    Json(state.shared_state.chat_service.health_check().await)
}
