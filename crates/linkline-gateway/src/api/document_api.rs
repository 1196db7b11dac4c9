// Document upload: spool the multipart file to disk, then ingest it into the group's namespace
use axum::{
    extract::{Multipart, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Instant;
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::error::GatewayError;
use crate::ingestion::FileType;
use crate::metrics;
use crate::shared_state::UnifiedAppState;
use crate::thread_pool::WorkerLane;

pub const DEFAULT_GROUP_ID: &str = "__default__";

fn default_group_id() -> String {
    DEFAULT_GROUP_ID.to_string()
}

#[derive(Debug, Deserialize)]
pub struct GroupQuery {
    #[serde(default = "default_group_id")]
    pub group_id: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub file_type: FileType,
    pub chunk_count: usize,
    pub status: String,
    pub group_id: String,
    pub file_size: usize,
    pub processing_time_ms: f64,
}

/// POST /rag/knowledge-base/upload?group_id=
pub async fn upload_document(
    State(state): State<UnifiedAppState>,
    Query(query): Query<GroupQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<DocumentInfo>> {
    let started = Instant::now();
    let shared = &state.shared_state;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) = upload.ok_or_else(|| ApiError::bad_request("Missing 'file' field"))?;

    let file_type = FileType::from_filename(&filename).ok_or_else(|| {
        ApiError::bad_request(format!("Unsupported file type: {}", filename))
    })?;
    let file_size = bytes.len();
    info!("Received upload '{}' ({} bytes) for group {}", filename, file_size, query.group_id);

    // The temp file is removed when `spooled` drops at the end of the handler.
    let suffix = format!(".{}", file_type.as_str());
    let spooled = shared
        .thread_pool
        .spawn_blocking(WorkerLane::Documents, move || {
            let mut file = tempfile::Builder::new().suffix(&suffix).tempfile()?;
            file.write_all(&bytes)?;
            file.flush()?;
            Ok::<_, GatewayError>(file)
        })
        .await?;

    let result = shared
        .namespaces
        .add_document(spooled.path().to_path_buf(), &filename, file_type, &query.group_id)
        .await?;

    shared.counters.inc_documents_processed();
    metrics::add_chunks_ingested(result.chunk_count);
    // Cached answers predate the new document.
    shared.response_cache.invalidate_all();

    Ok(Json(DocumentInfo {
        filename: result.filename,
        file_type,
        chunk_count: result.chunk_count,
        status: result.status,
        group_id: result.group_id,
        file_size,
        processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
    }))
}
