//! Pinecone-backed [`VectorIndex`].
//!
//! Talks to two Pinecone surfaces, both authenticated with the `Api-Key`
//! header:
//!
//! - the control plane (`/indexes`) once at startup, to find the index host
//!   or create the index when it does not exist;
//! - the index data plane for every knowledge operation.
//!
//! | Operation | Data-plane call |
//! |-----------|-----------------|
//! | upsert | `POST /vectors/upsert` |
//! | query | `POST /query` |
//! | delete namespace | `POST /vectors/delete` with `deleteAll` |
//! | stats | `POST /describe_index_stats` |

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::KnowledgeConfig;
use crate::error::{expect_status, expect_success, ServiceError};
use crate::models::Metadata;

use super::{IndexStats, ScoredVector, VectorIndex, VectorRecord};

const API_VERSION: &str = "2024-07";

/// Pinecone accepts at most 1000 vectors (and 2 MB) per upsert request.
const UPSERT_BATCH: usize = 100;

pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a Metadata,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    namespaces: HashMap<String, NamespaceSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceSummary {
    #[serde(default)]
    vector_count: u64,
}

#[derive(Deserialize)]
struct IndexDescription {
    #[serde(default)]
    host: String,
}

impl PineconeIndex {
    /// Build a client for a known data-plane host.
    pub fn new(host: &str, api_key: &str) -> Self {
        let host = host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        Self {
            client: reqwest::Client::new(),
            host,
            api_key: api_key.to_string(),
        }
    }

    /// Resolve the index host from configuration, creating the index if needed.
    pub async fn connect(config: &KnowledgeConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            bail!("Pinecone API key not provided");
        }
        if let Some(host) = &config.index_host {
            return Ok(Self::new(host, &config.api_key));
        }

        let client = reqwest::Client::new();
        let base = config.control_plane_url.trim_end_matches('/');
        let describe_url = format!("{}/indexes/{}", base, config.index_name);

        let response = client
            .get(&describe_url)
            .header("Api-Key", &config.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .with_context(|| format!("Failed to reach Pinecone at {}", base))?;

        let description: IndexDescription = if response.status() == reqwest::StatusCode::NOT_FOUND
        {
            tracing::info!(
                index = %config.index_name,
                dimension = config.dims,
                "creating Pinecone index"
            );
            let body = serde_json::json!({
                "name": config.index_name,
                "dimension": config.dims,
                "metric": config.metric,
                "spec": { "serverless": { "cloud": config.cloud, "region": config.region } },
            });
            let created = client
                .post(format!("{}/indexes", base))
                .header("Api-Key", &config.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .json(&body)
                .send()
                .await
                .context("Failed to create Pinecone index")?;
            expect_success(created, "Failed to create Pinecone index")
                .await?
                .json()
                .await
                .context("Invalid Pinecone create-index response")?
        } else {
            expect_success(response, "Failed to describe Pinecone index")
                .await?
                .json()
                .await
                .context("Invalid Pinecone describe-index response")?
        };

        if description.host.is_empty() {
            bail!("Pinecone index '{}' has no host yet", config.index_name);
        }
        Ok(Self::new(&description.host, &config.api_key))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, vectors: Vec<VectorRecord>) -> Result<(), ServiceError> {
        const CONTEXT: &str = "Failed to upsert vectors";

        for batch in vectors.chunks(UPSERT_BATCH) {
            let body = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|v| UpsertVector {
                        id: &v.id,
                        values: &v.values,
                        metadata: &v.metadata,
                    })
                    .collect(),
                namespace,
            };
            let response = self
                .post("/vectors/upsert")
                .json(&body)
                .send()
                .await
                .map_err(ServiceError::transport(CONTEXT))?;
            expect_success(response, CONTEXT).await?;
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredVector>, ServiceError> {
        const CONTEXT: &str = "Failed to query vectors";

        let body = QueryRequest {
            namespace,
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
        };
        let response = self
            .post("/query")
            .json(&body)
            .send()
            .await
            .map_err(ServiceError::transport(CONTEXT))?;
        let parsed: QueryResponse = expect_success(response, CONTEXT)
            .await?
            .json()
            .await
            .map_err(ServiceError::decode(CONTEXT))?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| ScoredVector {
                id: m.id,
                score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), ServiceError> {
        const CONTEXT: &str = "Failed to delete vectors";

        let body = serde_json::json!({ "deleteAll": true, "namespace": namespace });
        let response = self
            .post("/vectors/delete")
            .json(&body)
            .send()
            .await
            .map_err(ServiceError::transport(CONTEXT))?;
        // 404: the namespace never received a vector.
        expect_status(response, CONTEXT, |s| {
            s.is_success() || s == reqwest::StatusCode::NOT_FOUND
        })
        .await?;
        Ok(())
    }

    async fn describe_stats(&self) -> Result<IndexStats, ServiceError> {
        const CONTEXT: &str = "Failed to describe index stats";

        let response = self
            .post("/describe_index_stats")
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(ServiceError::transport(CONTEXT))?;
        let parsed: StatsResponse = expect_success(response, CONTEXT)
            .await?
            .json()
            .await
            .map_err(ServiceError::decode(CONTEXT))?;

        Ok(IndexStats {
            dimension: parsed.dimension,
            namespaces: parsed
                .namespaces
                .into_iter()
                .map(|(name, summary)| (name, summary.vector_count))
                .collect(),
        })
    }
}
