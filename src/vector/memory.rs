//! In-memory [`VectorIndex`] implementation for testing and local runs.
//!
//! Uses nested `HashMap`s (namespace → id → vector) behind
//! `std::sync::RwLock`. Search is brute-force cosine similarity over the
//! namespace.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::ServiceError;
use crate::models::Metadata;

use super::{IndexStats, ScoredVector, VectorIndex, VectorRecord};

struct StoredVector {
    values: Vec<f32>,
    metadata: Metadata,
}

pub struct InMemoryIndex {
    dimension: usize,
    namespaces: RwLock<HashMap<String, HashMap<String, StoredVector>>>,
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Number of vectors stored under `namespace`.
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(namespace)
            .map_or(0, |ns| ns.len())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, namespace: &str, vectors: Vec<VectorRecord>) -> Result<(), ServiceError> {
        let mut namespaces = self.namespaces.write().unwrap_or_else(|e| e.into_inner());
        let ns = namespaces.entry(namespace.to_string()).or_default();
        for v in vectors {
            ns.insert(
                v.id,
                StoredVector {
                    values: v.values,
                    metadata: v.metadata,
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredVector>, ServiceError> {
        let namespaces = self.namespaces.read().unwrap_or_else(|e| e.into_inner());
        let Some(ns) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredVector> = ns
            .iter()
            .map(|(id, stored)| ScoredVector {
                id: id.clone(),
                score: cosine_similarity(vector, &stored.values),
                metadata: stored.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), ServiceError> {
        self.namespaces
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(namespace);
        Ok(())
    }

    async fn describe_stats(&self) -> Result<IndexStats, ServiceError> {
        let namespaces = self.namespaces.read().unwrap_or_else(|e| e.into_inner());
        Ok(IndexStats {
            dimension: self.dimension,
            namespaces: namespaces
                .iter()
                .map(|(name, ns)| (name.clone(), ns.len() as u64))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("content".into(), id.into());
        VectorRecord {
            id: id.to_string(),
            values,
            metadata,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let index = InMemoryIndex::new(2);
        index
            .upsert("ns", vec![record("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert("ns", vec![record("a", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(index.len("ns"), 1);

        let hits = index.query("ns", &[0.0, 1.0], 5).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn query_ranks_and_truncates() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(
                "ns",
                vec![
                    record("far", vec![-1.0, 0.0]),
                    record("near", vec![1.0, 0.1]),
                    record("mid", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("ns", &[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let index = InMemoryIndex::new(2);
        index
            .upsert("client_a", vec![record("x", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert!(index.query("client_b", &[1.0, 0.0], 5).await.unwrap().is_empty());

        index.delete_namespace("client_a").await.unwrap();
        let stats = index.describe_stats().await.unwrap();
        assert_eq!(stats.dimension, 2);
        assert!(!stats.namespaces.contains_key("client_a"));
    }
}
