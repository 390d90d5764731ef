//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait covers the four namespaced operations the
//! knowledge base needs, enabling pluggable backends:
//!
//! - [`pinecone::PineconeIndex`]: the hosted index used in production.
//! - [`memory::InMemoryIndex`]: brute-force cosine search for tests and
//!   local runs.
//!
//! Implementations must be `Send + Sync` to be shared across request handlers.

pub mod memory;
pub mod pinecone;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::KnowledgeConfig;
use crate::error::ServiceError;
use crate::models::Metadata;

/// One vector to write, keyed by id within a namespace.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

/// A query hit, best first.
#[derive(Debug, Clone)]
pub struct ScoredVector {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub dimension: usize,
    /// Vector count per namespace.
    pub namespaces: HashMap<String, u64>,
}

/// Abstract namespaced vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite vectors by id.
    async fn upsert(&self, namespace: &str, vectors: Vec<VectorRecord>) -> Result<(), ServiceError>;

    /// Return at most `top_k` vectors by descending cosine similarity.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredVector>, ServiceError>;

    /// Remove every vector in `namespace`.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), ServiceError>;

    async fn describe_stats(&self) -> Result<IndexStats, ServiceError>;
}

/// Open the index selected by `knowledge.backend`.
///
/// For Pinecone this resolves the index host, creating the index first when
/// it does not exist yet.
pub async fn connect(config: &KnowledgeConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(memory::InMemoryIndex::new(config.dims))),
        "pinecone" => Ok(Arc::new(pinecone::PineconeIndex::connect(config).await?)),
        other => bail!("Unknown knowledge backend: {}", other),
    }
}
