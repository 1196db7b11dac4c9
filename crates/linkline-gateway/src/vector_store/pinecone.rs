//! Pinecone REST client.
//!
//! Index management goes to the control plane; vectors go to the index host
//! the control plane reports, which is cached per index.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{DistanceMetric, IndexDescription, Metadata, ScoredMatch, VectorBackend, VectorRecord};
use crate::config::Config;
use crate::error::{GatewayError, Result};

const API_VERSION: &str = "2024-07";
const UPSERT_BATCH_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexModel>,
}

#[derive(Debug, Deserialize)]
struct IndexModel {
    name: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

impl From<IndexModel> for IndexDescription {
    fn from(model: IndexModel) -> Self {
        Self {
            name: model.name,
            host: model.host,
            ready: model.status.map(|s| s.ready).unwrap_or(false),
        }
    }
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct IndexStats {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: u64,
}

pub struct PineconeBackend {
    api_key: String,
    controller_url: String,
    cloud: String,
    region: String,
    http_client: reqwest::Client,
    hosts: DashMap<String, String>,
}

impl PineconeBackend {
    pub fn new(
        api_key: impl Into<String>,
        controller_url: impl Into<String>,
        cloud: impl Into<String>,
        region: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let controller_url: String = controller_url.into();
        Self {
            api_key: api_key.into(),
            controller_url: controller_url.trim_end_matches('/').to_string(),
            cloud: cloud.into(),
            region: region.into(),
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            hosts: DashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.pinecone_api_key.clone().ok_or_else(|| {
            GatewayError::Configuration("PINECONE_API_KEY not found in environment variables".to_string())
        })?;
        Ok(Self::new(
            api_key,
            &config.pinecone_controller_url,
            &config.pinecone_cloud,
            &config.pinecone_region,
            Duration::from_secs(config.request_timeout_seconds.max(1)),
        ))
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn control(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, format!("{}{}", self.controller_url, path))
    }

    async fn data(&self, index: &str, path: &str) -> Result<RequestBuilder> {
        let host = self.host_for(index).await?;
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{}", host)
        };
        Ok(self.request(Method::POST, format!("{}{}", base.trim_end_matches('/'), path)))
    }

    async fn host_for(&self, index: &str) -> Result<String> {
        if let Some(host) = self.hosts.get(index) {
            return Ok(host.clone());
        }
        let description = self.describe_index(index).await?;
        description
            .host
            .ok_or_else(|| GatewayError::Backend(format!("Pinecone index '{}' has no host yet", index)))
    }

    async fn send(what: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Backend(format!("Pinecone {} failed: {}", what, e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::from_status(&format!("Pinecone {}", what), status, &body))
    }

    fn remember_host(&self, description: &IndexDescription) {
        if let Some(host) = description.host.as_ref().filter(|h| !h.is_empty()) {
            self.hosts.insert(description.name.clone(), host.clone());
        }
    }
}

#[async_trait]
impl VectorBackend for PineconeBackend {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        let response = Self::send("list indexes", self.control(Method::GET, "/indexes")).await?;
        let list: IndexList = response.json().await?;
        Ok(list
            .indexes
            .into_iter()
            .map(|model| {
                let description = IndexDescription::from(model);
                self.remember_host(&description);
                description.name
            })
            .collect())
    }

    async fn create_index(&self, name: &str, dimension: usize, metric: DistanceMetric) -> Result<()> {
        let body = json!({
            "name": name,
            "dimension": dimension,
            "metric": metric.as_str(),
            "spec": { "serverless": { "cloud": self.cloud, "region": self.region } },
        });
        let response = self
            .control(Method::POST, "/indexes")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Backend(format!("Pinecone create index failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => {
                info!("Pinecone accepted creation of index {}", name);
                Ok(())
            }
            StatusCode::CONFLICT => {
                debug!("Pinecone index {} already exists", name);
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(GatewayError::from_status("Pinecone create index", status, &body))
            }
        }
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let response =
            Self::send("describe index", self.control(Method::GET, &format!("/indexes/{}", name))).await?;
        let model: IndexModel = response.json().await?;
        let description = IndexDescription::from(model);
        self.remember_host(&description);
        Ok(description)
    }

    async fn upsert(&self, index: &str, namespace: &str, records: Vec<VectorRecord>) -> Result<usize> {
        let mut upserted = 0;
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let request = self
                .data(index, "/vectors/upsert")
                .await?
                .json(&UpsertRequest { vectors: batch, namespace });
            let response: UpsertResponse = Self::send("upsert", request).await?.json().await?;
            upserted += response.upserted_count;
        }
        debug!("Upserted {} vector(s) into {}/{}", upserted, index, namespace);
        Ok(upserted)
    }

    async fn query(
        &self,
        index: &str,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>> {
        let body = json!({
            "namespace": namespace,
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        let request = self.data(index, "/query").await?.json(&body);
        let response: QueryResponse = Self::send("query", request).await?.json().await?;
        Ok(response
            .matches
            .into_iter()
            .map(|m| ScoredMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect())
    }

    async fn namespace_vector_count(&self, index: &str, namespace: &str) -> Result<u64> {
        let request = self.data(index, "/describe_index_stats").await?.json(&json!({}));
        let stats: IndexStats = Self::send("describe index stats", request).await?.json().await?;
        Ok(stats.namespaces.get(namespace).map(|ns| ns.vector_count).unwrap_or(0))
    }

    async fn delete_namespace(&self, index: &str, namespace: &str) -> Result<()> {
        let request = self
            .data(index, "/vectors/delete")
            .await?
            .json(&json!({ "deleteAll": true, "namespace": namespace }));
        match Self::send("delete", request).await {
            Ok(_) => Ok(()),
            // Deleting a namespace that was never written is not an error.
            Err(GatewayError::Backend(msg)) if msg.contains("404") => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn backend_name(&self) -> &'static str {
        "pinecone"
    }
}
