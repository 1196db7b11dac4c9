
use prometheus::{Encoder, TextEncoder, Registry, IntCounter, IntCounterVec};
use lazy_static::lazy_static;
use std::sync::OnceLock;
use axum::response::IntoResponse;
use axum::http::StatusCode;
use tracing::error;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static CACHE_LOOKUPS: OnceLock<IntCounterVec> = OnceLock::new();
static CHAT_MODE: OnceLock<IntCounterVec> = OnceLock::new();
static CHUNKS_INGESTED: OnceLock<IntCounter> = OnceLock::new();

pub fn init_metrics() {
    let req_counter = REQ_COUNTER.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("requests_total", "Total requests per route"),
            &["route", "status"]
        ).unwrap()
    });

    let cache_lookups = CACHE_LOOKUPS.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("cache_lookups_total", "Response cache lookups by result"),
            &["result"]
        ).unwrap()
    });

    let chat_mode = CHAT_MODE.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("chat_mode_total", "Processed chat messages by answering mode"),
            &["mode"]
        ).unwrap()
    });

    let chunks_ingested = CHUNKS_INGESTED.get_or_init(|| {
        IntCounter::new("chunks_ingested_total", "Document chunks written to the vector store").unwrap()
    });
    REGISTRY.register(Box::new(req_counter.clone())).ok();
    REGISTRY.register(Box::new(cache_lookups.clone())).ok();
    REGISTRY.register(Box::new(chat_mode.clone())).ok();
    REGISTRY.register(Box::new(chunks_ingested.clone())).ok();
}
pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}
pub fn inc_cache_lookup(hit: bool) {
    if let Some(counter) = CACHE_LOOKUPS.get() {
        counter.with_label_values(&[if hit { "hit" } else { "miss" }]).inc();
    }
}
/// `mode` is one of rag, plain or error.
pub fn inc_chat_mode(mode: &str) {
    if let Some(counter) = CHAT_MODE.get() {
        counter.with_label_values(&[mode]).inc();
    }
}
pub fn add_chunks_ingested(count: usize) {
    if let Some(counter) = CHUNKS_INGESTED.get() {
        counter.inc_by(count as u64);
    }
}
pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; version=0.0.4")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_registered() {
        init_metrics();
        init_metrics();
        inc_request("/rag/chat", "200");
        inc_cache_lookup(true);
        inc_chat_mode("rag");
        add_chunks_ingested(3);

        let names: Vec<String> = REGISTRY.gather().iter().map(|f| f.get_name().to_string()).collect();
        for expected in ["requests_total", "cache_lookups_total", "chat_mode_total", "chunks_ingested_total"] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
    }
}
