//! Qdrant vector index client
//!
//! REST client for the points API. The index is authoritative for similarity
//! ranking only; callers re-fetch memories from the store by returned id.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{VectorFilter, VectorMatch, VectorMetadata, VectorStore};
use crate::config::QdrantConfig;
use crate::error::{CoreError, Result};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    dimensions: usize,
}

impl QdrantIndex {
    pub fn new(config: &QdrantConfig, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            dimensions,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    fn unavailable(err: reqwest::Error) -> CoreError {
        CoreError::ServiceUnavailable(format!("vector index: {err}"))
    }

    /// Create the collection when it does not exist yet. Cosine distance,
    /// configured dimension.
    pub async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .map_err(Self::unavailable)?;
        if exists.status().is_success() {
            return Ok(());
        }

        let body = json!({
            "vectors": { "size": self.dimensions, "distance": "Cosine" }
        });
        let response = self
            .client
            .put(self.collection_url())
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;
        if !response.status().is_success() {
            return Err(CoreError::ServiceUnavailable(format!(
                "vector index: create collection returned {}",
                response.status()
            )));
        }
        info!(collection = %self.collection, dimensions = self.dimensions, "Created vector collection");
        Ok(())
    }

    fn build_filter(filter: &VectorFilter) -> Option<Value> {
        let mut must = Vec::new();
        if let Some(session) = &filter.session_id {
            must.push(json!({ "key": "session_id", "match": { "value": session } }));
        }
        if let Some(domain) = &filter.domain {
            must.push(json!({ "key": "domain", "match": { "value": domain } }));
        }
        if let Some(min) = filter.min_importance {
            must.push(json!({ "key": "importance", "range": { "gte": min } }));
        }
        if must.is_empty() {
            None
        } else {
            Some(json!({ "must": must }))
        }
    }
}

#[async_trait]
impl VectorStore for QdrantIndex {
    async fn upsert(&self, id: &str, vector: &[f32], metadata: &VectorMetadata) -> Result<()> {
        let body = json!({
            "points": [{
                "id": id,
                "vector": vector,
                "payload": metadata,
            }]
        });
        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;
        if !response.status().is_success() {
            return Err(CoreError::ServiceUnavailable(format!(
                "vector index: upsert returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>> {
        let mut body = json!({
            "vector": vector,
            "limit": k,
            "with_payload": false,
        });
        if let Some(filter_value) = Self::build_filter(filter) {
            body["filter"] = filter_value;
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;
        if !response.status().is_success() {
            return Err(CoreError::ServiceUnavailable(format!(
                "vector index: search returned {}",
                response.status()
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| CoreError::ServiceUnavailable(format!("vector index response: {e}")))?;
        let matches = parsed["result"]
            .as_array()
            .map(|hits| {
                hits.iter()
                    .filter_map(|hit| {
                        let id = hit["id"].as_str()?.to_string();
                        let score = hit["score"].as_f64()?.clamp(0.0, 1.0);
                        Some(VectorMatch { id, score })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(matches)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let body = json!({ "points": [id] });
        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;
        if !response.status().is_success() {
            return Err(CoreError::ServiceUnavailable(format!(
                "vector index: delete returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
