// Knowledge-base endpoints scoped to one group's namespace
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::document_api::GroupQuery;
use super::error::{ApiError, ApiResult};
use crate::shared_state::UnifiedAppState;
use crate::vector_store::{KnowledgeBaseInfo, SearchResponse};

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Validate)]
pub struct SearchQuery {
    #[validate(length(min = 1, message = "query cannot be empty or whitespace"))]
    pub query: String,
    #[serde(default = "default_top_k")]
    #[validate(range(min = 1, max = 50))]
    pub top_k: usize,
    #[validate(range(min = 0.0, max = 1.0))]
    pub score_threshold: Option<f32>,
}

impl SearchQuery {
    /// Trim the query, then check every bound.
    pub fn normalized(mut self) -> Result<Self, ApiError> {
        self.query = self.query.trim().to_string();
        self.validate()?;
        Ok(self)
    }
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: String,
    pub message: String,
}

/// GET /rag/knowledge-base/info?group_id=
pub async fn get_knowledge_base_info(
    State(state): State<UnifiedAppState>,
    Query(query): Query<GroupQuery>,
) -> ApiResult<Json<KnowledgeBaseInfo>> {
    Ok(Json(state.shared_state.namespaces.info(&query.group_id).await?))
}

/// DELETE /rag/knowledge-base/clear?group_id=
pub async fn clear_knowledge_base(
    State(state): State<UnifiedAppState>,
    Query(query): Query<GroupQuery>,
) -> ApiResult<Json<ClearResponse>> {
    state.shared_state.namespaces.clear(&query.group_id).await?;
    state.shared_state.response_cache.invalidate_all();
    info!("Knowledge base cleared for group {}", query.group_id);
    Ok(Json(ClearResponse {
        status: "success".to_string(),
        message: format!("Knowledge base cleared for group {}", query.group_id),
    }))
}

/// POST /rag/knowledge-base/search?group_id=
pub async fn search_knowledge_base(
    State(state): State<UnifiedAppState>,
    Query(query): Query<GroupQuery>,
    Json(search): Json<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let search = search.normalized()?;
    let response = state
        .shared_state
        .namespaces
        .search(&search.query, search.top_k, search.score_threshold, &query.group_id)
        .await?;
    Ok(Json(response))
}
