//! HTTP server startup
//!
//! Builds the application context once, hands it to every handler through
//! axum state and serves the chat, knowledge-base and bot routes.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    config::Config,
    shared_state::{SharedState, UnifiedAppState},
};

/// Run the gateway until the listener fails.
pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing(&cfg.log_level);
    crate::metrics::init_metrics();
    cfg.validate()?;
    cfg.print_config();

    if cfg.openai_api_keys.is_empty() {
        warn!("No OpenAI API keys configured; chat requests will fail until one is set");
    }

    let shared_state = Arc::new(SharedState::new(cfg.clone())?);
    let app = build_router(UnifiedAppState::new(shared_state), &cfg);

    let addr = cfg.api_addr()?;
    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> tower_http::cors::CorsLayer {
    use axum::http::{HeaderValue, Method};
    use tower_http::cors::{AllowOrigin, Any, CorsLayer};

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

pub fn build_router(state: UnifiedAppState, cfg: &Config) -> axum::Router {
    use axum::{
        extract::DefaultBodyLimit,
        routing::{delete, get, post},
        Router,
    };
    use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

    use crate::api::{bot_api, chat_api, document_api, health_api, knowledge_base_api};

    Router::new()
        .route("/rag/chat", post(chat_api::chat))
        .route(
            "/rag/chat/history/:user_id",
            get(chat_api::get_chat_history).delete(chat_api::clear_chat_history),
        )
        .route("/rag/chat/health", get(chat_api::chat_health_check))
        .route("/rag/knowledge-base/upload", post(document_api::upload_document))
        .route("/rag/knowledge-base/info", get(knowledge_base_api::get_knowledge_base_info))
        .route("/rag/knowledge-base/clear", delete(knowledge_base_api::clear_knowledge_base))
        .route("/rag/knowledge-base/search", post(knowledge_base_api::search_knowledge_base))
        .route("/chat", post(bot_api::bot_chat))
        .route("/rag", post(bot_api::rag_bot))
        .route("/", get(health_api::root))
        .route("/health", get(health_api::health))
        .route("/stats", get(health_api::stats))
        .route("/metrics", get(crate::metrics::get_metrics))
        .layer(DefaultBodyLimit::max(cfg.max_file_size))
        .layer(cors_layer(&cfg.cors_origins))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(cfg.request_timeout_seconds)))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VectorBackendKind;
    use crate::llm::{Embedder, EmbedderFactory, EmbeddingService};
    use crate::test_support::{shared_model_pool, test_thread_pool, FakeEmbedder, ScriptedChatModel, TEST_DIMS};
    use crate::vector_store::InMemoryVectorBackend;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_router(model: Arc<ScriptedChatModel>) -> axum::Router {
        let cfg = Config {
            vector_backend: VectorBackendKind::Memory,
            embedding_dimension: TEST_DIMS,
            openai_api_keys: vec!["sk-test".into()],
            daily_group_limit: 1,
            ..Config::default()
        };
        let thread_pool = test_thread_pool();
        let factory: EmbedderFactory = Arc::new(|| {
            let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(TEST_DIMS));
            Ok(embedder)
        });
        let embeddings = Arc::new(EmbeddingService::new(factory, thread_pool.clone()));
        let state = SharedState::from_parts(
            cfg.clone(),
            thread_pool,
            shared_model_pool(model),
            embeddings,
            Arc::new(InMemoryVectorBackend::new()),
        )
        .unwrap();
        build_router(UnifiedAppState::new(Arc::new(state)), &cfg)
    }

    async fn send(router: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_chat_is_cached_on_repeat() {
        let model = Arc::new(ScriptedChatModel::with_replies("m", &["first answer", "second answer"]));
        let router = test_router(model);
        let body = json!({"user_id": "alice", "message": "What is the return policy?", "use_rag": false});

        let (status, first) = send(&router, "POST", "/rag/chat", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["response"], "first answer");
        assert_eq!(first["from_cache"], false);
        assert_eq!(first["message_count"], 2);
        assert_eq!(first["sources_used"], Value::Null);

        let (_, second) = send(&router, "POST", "/rag/chat", Some(body)).await;
        assert_eq!(second["response"], "first answer");
        assert_eq!(second["from_cache"], true);

        let (_, stats) = send(&router, "GET", "/stats", None).await;
        assert_eq!(stats["total_queries"], 1);
        assert_eq!(stats["cache_hit_rate"], 0.5);
    }

    #[tokio::test]
    async fn test_new_chat_bypasses_cache_and_resets_history() {
        let model = Arc::new(ScriptedChatModel::with_replies("m", &["hello", "more", "fresh start"]));
        let router = test_router(model);
        let turn = |message: &str, new_chat: bool| {
            json!({"user_id": "alice", "message": message, "use_rag": false, "new_chat": new_chat})
        };

        send(&router, "POST", "/rag/chat", Some(turn("hi", false))).await;
        let (_, second) = send(&router, "POST", "/rag/chat", Some(turn("more", false))).await;
        assert_eq!(second["message_count"], 4);

        let (status, third) = send(&router, "POST", "/rag/chat", Some(turn("hi", true))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(third["from_cache"], false);
        assert_eq!(third["response"], "fresh start");
        assert_eq!(third["message_count"], 2);

        let (_, history) = send(&router, "GET", "/rag/chat/history/alice", None).await;
        assert_eq!(history["message_count"], 2);
    }

    #[tokio::test]
    async fn test_clearing_knowledge_base_drops_cached_answers() {
        let model = Arc::new(ScriptedChatModel::with_replies("m", &["old answer", "new answer"]));
        let router = test_router(model);
        let body = json!({"user_id": "alice", "message": "exam dates?", "group_id": "g1"});

        let (_, first) = send(&router, "POST", "/rag/chat", Some(body.clone())).await;
        assert_eq!(first["response"], "old answer");

        send(&router, "DELETE", "/rag/knowledge-base/clear?group_id=g1", None).await;

        let (_, second) = send(&router, "POST", "/rag/chat", Some(body)).await;
        assert_eq!(second["from_cache"], false);
        assert_eq!(second["response"], "new answer");
    }

    #[tokio::test]
    async fn test_blank_chat_message_is_rejected() {
        let router = test_router(Arc::new(ScriptedChatModel::named("m")));
        let (status, body) =
            send(&router, "POST", "/rag/chat", Some(json!({"user_id": "alice", "message": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("message cannot be empty"));
    }

    #[tokio::test]
    async fn test_knowledge_base_routes_for_unknown_group() {
        let router = test_router(Arc::new(ScriptedChatModel::named("m")));

        let (status, info) = send(&router, "GET", "/rag/knowledge-base/info?group_id=nobody", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["status"], "index_not_found");

        let (status, cleared) = send(&router, "DELETE", "/rag/knowledge-base/clear?group_id=nobody", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cleared["status"], "success");

        let (status, results) = send(
            &router,
            "POST",
            "/rag/knowledge-base/search?group_id=nobody",
            Some(json!({"query": "exam dates"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(results["total_results"], 0);

        let (status, _) = send(
            &router,
            "POST",
            "/rag/knowledge-base/search",
            Some(json!({"query": "exam dates", "top_k": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bot_mentions_and_quota() {
        let model = Arc::new(ScriptedChatModel::with_replies("m", &["It means calling itself."]));
        let router = test_router(model);
        let message = |text: &str| {
            json!({"message": text, "group_id": "g1", "user_id": "u1", "username": "Uma"})
        };

        let (status, _) = send(&router, "POST", "/chat", Some(message("no mention here"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, reply) = send(&router, "POST", "/chat", Some(message("@explain recursion"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["response"], "It means calling itself.");
        assert_eq!(reply["type"], "aiResponse");
        assert_eq!(reply["bot_name"], "ExplainBot");

        let (status, _) = send(&router, "POST", "/chat", Some(message("@help notes please"))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_rag_bot_keeps_session() {
        let router = test_router(Arc::new(ScriptedChatModel::named("m")));
        let body = json!({"query": "when is the exam?", "group_id": "g1", "user_id": "u1"});

        let (status, first) = send(&router, "POST", "/rag", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["rag_enabled"], false);
        assert_eq!(first["sources_used"], json!([]));

        let (_, second) = send(&router, "POST", "/rag", Some(body)).await;
        assert_eq!(first["session_id"], second["session_id"]);
    }
}
