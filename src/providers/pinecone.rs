use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::IndexConfig;
use crate::domains::retrieval::{IndexRecord, RetrievalMatch};
use crate::error::{Result, RmpError};
use crate::interfaces::providers::VectorIndex;

pub const DEFAULT_CONTROLLER_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    namespace: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: Option<f32>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexRecord],
    namespace: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: usize,
}

#[derive(Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

/// Pinecone data-plane client for a single index namespace.
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    index_name: String,
    namespace: String,
    controller_url: String,
    host: OnceCell<String>,
}

impl PineconeIndex {
    pub fn new(api_key: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            index_name: index_name.into(),
            namespace: String::new(),
            controller_url: DEFAULT_CONTROLLER_URL.to_string(),
            host: OnceCell::new(),
        }
    }

    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RmpError::Config("index.api_key is required".to_string()))?;
        let mut index = Self::new(api_key, config.index_name.clone())
            .with_namespace(config.namespace.clone());
        if let Some(controller) = &config.controller_url {
            index = index.with_controller_url(controller.clone());
        }
        if let Some(host) = config.index_host.as_deref().filter(|h| !h.trim().is_empty()) {
            index = index.with_host(host);
        }
        Ok(index)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_controller_url(mut self, url: impl Into<String>) -> Self {
        self.controller_url = url.into();
        self
    }

    /// Skips the control-plane lookup.
    pub fn with_host(self, host: &str) -> Self {
        let _ = self.host.set(normalize_host(host));
        self
    }

    async fn host(&self) -> Result<&str> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/indexes/{}",
                    self.controller_url.trim_end_matches('/'),
                    self.index_name
                );
                let response = self
                    .client
                    .get(&url)
                    .header("Api-Key", &self.api_key)
                    .header("X-Pinecone-API-Version", API_VERSION)
                    .send()
                    .await
                    .map_err(|e| RmpError::Http(format!("Pinecone describe transport failed: {e}")))?;
                let described: DescribeIndexResponse = read_json(response, "describe").await?;
                info!(index = %self.index_name, host = %described.host, "Resolved Pinecone index host");
                Ok::<_, RmpError>(normalize_host(&described.host))
            })
            .await?;
        Ok(host.as_str())
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.host().await?, path);
        self.client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| RmpError::Http(format!("Pinecone {path} transport failed: {e}")))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
    operation: &str,
) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RmpError::Http(format!("Pinecone {operation} read failed: {e}")))?;
    if status != StatusCode::OK {
        return Err(RmpError::Http(format!(
            "Pinecone {operation} failed ({status}): {body}"
        )));
    }
    serde_json::from_str(&body).map_err(|e| {
        RmpError::Serialization(format!("Pinecone {operation} decode failed: {e}"))
    })
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<RetrievalMatch>> {
        let request = QueryRequest {
            vector: &vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: &self.namespace,
        };
        let response = self.post("/query", &request).await?;
        let parsed: QueryResponse = read_json(response, "query").await?;
        debug!(matches = parsed.matches.len(), "Pinecone query returned");
        Ok(parsed
            .matches
            .into_iter()
            .map(|hit| RetrievalMatch {
                id: hit.id,
                score: hit.score,
                metadata: hit.metadata.unwrap_or_default(),
            })
            .collect())
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let request = UpsertRequest {
            vectors: &records,
            namespace: &self.namespace,
        };
        let response = self.post("/vectors/upsert", &request).await?;
        let parsed: UpsertResponse = read_json(response, "upsert").await?;
        Ok(parsed.upserted_count)
    }
}
