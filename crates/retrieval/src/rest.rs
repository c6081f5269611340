//! REST implementation of [`VectorStore`].
//!
//! Wraps a `reqwest::Client` and translates `search` into the vector-store
//! service's HTTP API, with retry + exponential back-off on transient
//! (5xx / transport) failures. Created once at startup; the underlying
//! client keeps a connection pool for the process lifetime.

use std::time::Duration;

use serde::Deserialize;

use rl_domain::config::RetrievalConfig;
use rl_domain::error::{Error, Result};

use crate::{ScoredDocument, VectorStore};

pub struct RestVectorStoreClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    content: String,
    #[serde(default)]
    distance: f64,
}

impl RestVectorStoreClient {
    pub fn new(cfg: &RetrievalConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key: cfg.api_key.clone(),
            max_retries: cfg.max_retries,
        })
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }

    async fn post_search(&self, query: &str, max_results: usize) -> Result<SearchResponse> {
        let body = serde_json::json!({
            "query": query,
            "limit": max_results,
        });

        let mut attempt = 0u32;
        loop {
            let mut rb = self
                .http
                .post(self.search_url())
                .header("X-Trace-Id", uuid::Uuid::new_v4().to_string());
            if let Some(key) = &self.api_key {
                rb = rb.header("X-Api-Key", key);
            }

            match rb.json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<SearchResponse>()
                        .await
                        .map_err(|e| Error::VectorStore(format!("malformed response: {e}")));
                }
                Ok(resp) if resp.status().is_server_error() && attempt < self.max_retries => {
                    tracing::warn!(
                        status = resp.status().as_u16(),
                        attempt,
                        "vector store 5xx, retrying"
                    );
                }
                Ok(resp) => {
                    let status = resp.status();
                    let detail = resp.text().await.unwrap_or_default();
                    return Err(Error::VectorStore(format!(
                        "HTTP {} - {}",
                        status.as_u16(),
                        detail
                    )));
                }
                Err(e) if !e.is_timeout() && attempt < self.max_retries => {
                    tracing::warn!(error = %e, attempt, "vector store transport error, retrying");
                }
                Err(e) => return Err(Error::VectorStore(e.to_string())),
            }

            tokio::time::sleep(Duration::from_millis(200u64 << attempt.min(4))).await;
            attempt += 1;
        }
    }
}

#[async_trait::async_trait]
impl VectorStore for RestVectorStoreClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<ScoredDocument>> {
        let resp = self.post_search(query, max_results).await?;

        let mut docs: Vec<ScoredDocument> = resp
            .results
            .into_iter()
            .map(|hit| ScoredDocument {
                content: hit.content,
                distance: hit.distance,
            })
            .collect();

        // Most relevant first, regardless of service ordering.
        docs.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        docs.truncate(max_results);
        Ok(docs)
    }
}
