//! Per-client knowledge base.
//!
//! Text is split with [`TextSplitter`], embedded through the configured
//! [`EmbeddingProvider`], and stored in the client's own namespace
//! (`client_<client_id>`) of a [`VectorIndex`]. Queries search only that
//! namespace.
//!
//! Chunk ids are deterministic, so ingesting the same text twice overwrites
//! the earlier vectors instead of duplicating them.

use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::chunk::{chunk_id, truncate_chars, TextSplitter};
use crate::config::Config;
use crate::embedding::{create_provider, embed_query, DisabledProvider, EmbeddingProvider};
use crate::error::ServiceError;
use crate::extract;
use crate::models::{
    ClientStats, IngestReport, KnowledgeChunk, KnowledgeMatch, Metadata, QueryResult,
};
use crate::vector::{self, VectorIndex, VectorRecord};

/// Characters of chunk text stored alongside each vector.
const MAX_STORED_CONTENT: usize = 1000;

pub const DEFAULT_TOP_K: usize = 5;

/// Namespace holding every vector of one client.
pub fn namespace_for(client_id: &str) -> String {
    format!("client_{}", client_id)
}

pub struct KnowledgeBase {
    index: Option<Arc<dyn VectorIndex>>,
    embedder: Arc<dyn EmbeddingProvider>,
    splitter: TextSplitter,
}

impl KnowledgeBase {
    /// `index` is `None` when the vector store could not be reached at
    /// startup; every operation then fails with [`ServiceError::NotInitialized`].
    pub fn new(
        index: Option<Arc<dyn VectorIndex>>,
        embedder: Arc<dyn EmbeddingProvider>,
        splitter: TextSplitter,
    ) -> Self {
        Self {
            index,
            embedder,
            splitter,
        }
    }

    /// Connect the configured index and embedding provider.
    ///
    /// Neither failure is fatal: an unreachable index leaves the knowledge
    /// base uninitialized and a broken provider is replaced by
    /// [`DisabledProvider`]. Both are logged.
    pub async fn from_config(config: &Config) -> Self {
        let index = match vector::connect(&config.knowledge).await {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!("vector index unavailable, knowledge base disabled: {:#}", e);
                None
            }
        };

        let embedder = match create_provider(&config.embedding, config.knowledge.dims) {
            Ok(provider) => provider,
            Err(e) => {
                tracing::warn!("embedding provider unavailable: {:#}", e);
                Arc::new(DisabledProvider) as Arc<dyn EmbeddingProvider>
            }
        };

        Self::new(
            index,
            embedder,
            TextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap),
        )
    }

    pub fn is_initialized(&self) -> bool {
        self.index.is_some()
    }

    fn index(&self) -> Result<&Arc<dyn VectorIndex>, ServiceError> {
        self.index.as_ref().ok_or(ServiceError::NotInitialized)
    }

    /// Split, embed and upsert `content` for `client_id`.
    pub async fn process_text_content(
        &self,
        client_id: &str,
        content: &str,
        metadata: Metadata,
    ) -> Result<IngestReport, ServiceError> {
        let index = self.index()?;
        let namespace = namespace_for(client_id);

        let pieces = self.splitter.split_text(content);
        let embeddings = if pieces.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_texts(&pieces).await?
        };
        if embeddings.len() != pieces.len() {
            return Err(ServiceError::Embedding(format!(
                "expected {} embeddings, got {}",
                pieces.len(),
                embeddings.len()
            )));
        }

        let created_at = Utc::now().to_rfc3339();
        let chunks: Vec<KnowledgeChunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| {
                let mut chunk_metadata = metadata.clone();
                chunk_metadata.insert("client_id".into(), client_id.into());
                chunk_metadata.insert("chunk_index".into(), i.into());
                chunk_metadata.insert("content_type".into(), "text".into());
                chunk_metadata.insert("created_at".into(), created_at.clone().into());
                KnowledgeChunk {
                    id: chunk_id(client_id, &text, i),
                    client_id: client_id.to_string(),
                    text,
                    metadata: chunk_metadata,
                    embedding,
                }
            })
            .collect();

        let chunks_processed = chunks.len();
        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .map(|chunk| {
                let mut metadata = chunk.metadata;
                metadata.insert(
                    "content".into(),
                    truncate_chars(&chunk.text, MAX_STORED_CONTENT).into(),
                );
                VectorRecord {
                    id: chunk.id,
                    values: chunk.embedding,
                    metadata,
                }
            })
            .collect();

        if !records.is_empty() {
            index.upsert(&namespace, records).await?;
        }

        tracing::info!(client_id, chunks = chunks_processed, "knowledge ingested");
        Ok(IngestReport {
            chunks_processed,
            namespace,
        })
    }

    /// Extract text from a document and ingest it.
    ///
    /// `file_type` defaults to the file extension. Unreadable or empty
    /// documents fail with [`ServiceError::Extraction`].
    pub async fn process_document_file(
        &self,
        client_id: &str,
        file_path: &Path,
        file_type: Option<&str>,
    ) -> Result<IngestReport, ServiceError> {
        self.index()?;

        let file_type = file_type
            .map(|t| t.trim_start_matches('.').to_ascii_lowercase())
            .unwrap_or_else(|| extract::detect_file_type(file_path));

        let content = match extract::extract_file_text(file_path, Some(&file_type)) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %file_path.display(), "text extraction failed: {}", e);
                String::new()
            }
        };
        if content.trim().is_empty() {
            return Err(ServiceError::Extraction(file_path.display().to_string()));
        }

        let mut metadata = Metadata::new();
        metadata.insert(
            "source_file".into(),
            file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
                .into(),
        );
        metadata.insert(
            "file_type".into(),
            if file_type.is_empty() {
                "unknown".into()
            } else {
                file_type.into()
            },
        );
        metadata.insert("source_type".into(), "document".into());

        self.process_text_content(client_id, &content, metadata).await
    }

    /// Top-`top_k` matches for `query` within the client's namespace.
    pub async fn query_knowledge_base(
        &self,
        client_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<QueryResult, ServiceError> {
        let index = self.index()?;
        let vector = embed_query(self.embedder.as_ref(), query).await?;
        let hits = index.query(&namespace_for(client_id), &vector, top_k).await?;

        let chunks: Vec<KnowledgeMatch> = hits
            .into_iter()
            .map(|hit| KnowledgeMatch {
                content: hit
                    .metadata
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                score: hit.score,
                metadata: hit.metadata,
            })
            .collect();

        let context = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(QueryResult {
            context,
            total_results: chunks.len(),
            chunks,
        })
    }

    /// Remove every vector the client owns.
    pub async fn delete_client_data(&self, client_id: &str) -> Result<(), ServiceError> {
        let index = self.index()?;
        index.delete_namespace(&namespace_for(client_id)).await?;
        tracing::info!(client_id, "client knowledge deleted");
        Ok(())
    }

    pub async fn get_client_stats(&self, client_id: &str) -> Result<ClientStats, ServiceError> {
        let index = self.index()?;
        let namespace = namespace_for(client_id);
        let stats = index.describe_stats().await?;
        Ok(ClientStats {
            total_vectors: stats.namespaces.get(&namespace).copied().unwrap_or(0),
            namespace,
            dimension: stats.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::memory::InMemoryIndex;
    use async_trait::async_trait;

    /// Embeds text as letter frequencies over a small alphabet.
    struct LetterEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let count = |c: char| t.chars().filter(|x| *x == c).count() as f32 + 0.01;
                    vec![count('a'), count('b'), count('c'), count('d')]
                })
                .collect())
        }
    }

    fn knowledge_base(index: Arc<InMemoryIndex>) -> KnowledgeBase {
        KnowledgeBase::new(Some(index), Arc::new(LetterEmbedder), TextSplitter::new(12, 0))
    }

    #[tokio::test]
    async fn uninitialized_index_fails_every_operation() {
        let kb = KnowledgeBase::new(None, Arc::new(LetterEmbedder), TextSplitter::new(12, 0));
        assert!(!kb.is_initialized());
        assert!(matches!(
            kb.process_text_content("c", "aaa", Metadata::new()).await,
            Err(ServiceError::NotInitialized)
        ));
        assert!(matches!(
            kb.query_knowledge_base("c", "aaa", 5).await,
            Err(ServiceError::NotInitialized)
        ));
        assert!(matches!(
            kb.delete_client_data("c").await,
            Err(ServiceError::NotInitialized)
        ));
        assert!(matches!(
            kb.get_client_stats("c").await,
            Err(ServiceError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn ingest_stores_metadata_and_content() {
        let index = Arc::new(InMemoryIndex::new(4));
        let kb = knowledge_base(index.clone());
        let mut metadata = Metadata::new();
        metadata.insert("business_name".into(), "Loja".into());

        let report = kb
            .process_text_content("c1", "aaaa aaaa\n\nbbbb bbbb", metadata)
            .await
            .unwrap();
        assert_eq!(report.namespace, "client_c1");
        assert_eq!(report.chunks_processed, 2);
        assert_eq!(index.len("client_c1"), 2);

        let result = kb.query_knowledge_base("c1", "aaaa", 1).await.unwrap();
        let top = &result.chunks[0];
        assert_eq!(top.content, "aaaa aaaa");
        assert_eq!(top.metadata["business_name"], "Loja");
        assert_eq!(top.metadata["client_id"], "c1");
        assert_eq!(top.metadata["chunk_index"], 0);
        assert_eq!(top.metadata["content_type"], "text");
        assert!(top.metadata.contains_key("created_at"));
    }

    #[tokio::test]
    async fn reingesting_same_text_overwrites() {
        let index = Arc::new(InMemoryIndex::new(4));
        let kb = knowledge_base(index.clone());
        let text = "aaaa aaaa\n\nbbbb bbbb\n\ncccc cccc";

        kb.process_text_content("c1", text, Metadata::new()).await.unwrap();
        kb.process_text_content("c1", text, Metadata::new()).await.unwrap();
        assert_eq!(index.len("client_c1"), 3);

        let result = kb.query_knowledge_base("c1", "abc", 10).await.unwrap();
        let mut contents: Vec<&str> = result.chunks.iter().map(|c| c.content.as_str()).collect();
        contents.sort();
        contents.dedup();
        assert_eq!(contents.len(), result.total_results);
    }

    #[tokio::test]
    async fn query_is_ranked_and_bounded() {
        let index = Arc::new(InMemoryIndex::new(4));
        let kb = knowledge_base(index);
        let text = "aaaaaaaa\n\nbbbbbbbb\n\ncccccccc\n\ndddddddd\n\naaaabbbb\n\nccccdddd\n\naabbccdd";
        kb.process_text_content("c1", text, Metadata::new()).await.unwrap();

        let result = kb
            .query_knowledge_base("c1", "aaaa", DEFAULT_TOP_K)
            .await
            .unwrap();
        assert_eq!(result.total_results, 5);
        assert_eq!(result.chunks[0].content, "aaaaaaaa");
        assert!(result
            .chunks
            .windows(2)
            .all(|w| w[0].score >= w[1].score));

        let expected: Vec<&str> = result.chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(result.context, expected.join("\n\n"));
    }

    #[tokio::test]
    async fn clients_do_not_see_each_other() {
        let index = Arc::new(InMemoryIndex::new(4));
        let kb = knowledge_base(index);
        kb.process_text_content("c1", "aaaa", Metadata::new()).await.unwrap();

        let other = kb.query_knowledge_base("c2", "aaaa", 5).await.unwrap();
        assert_eq!(other.total_results, 0);
        assert_eq!(other.context, "");
    }

    #[tokio::test]
    async fn stats_and_delete() {
        let index = Arc::new(InMemoryIndex::new(4));
        let kb = knowledge_base(index);
        kb.process_text_content("c1", "aaaaaaaa\n\nbbbbbbbb", Metadata::new())
            .await
            .unwrap();

        let stats = kb.get_client_stats("c1").await.unwrap();
        assert_eq!(stats.total_vectors, 2);
        assert_eq!(stats.namespace, "client_c1");
        assert_eq!(stats.dimension, 4);

        kb.delete_client_data("c1").await.unwrap();
        assert_eq!(kb.get_client_stats("c1").await.unwrap().total_vectors, 0);
    }

    #[tokio::test]
    async fn empty_document_is_an_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "   \n").unwrap();

        let kb = knowledge_base(Arc::new(InMemoryIndex::new(4)));
        let err = kb.process_document_file("c1", &path, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Extraction(_)));

        let legacy = dir.path().join("old.doc");
        std::fs::write(&legacy, b"\xd0\xcf\x11\xe0").unwrap();
        assert!(matches!(
            kb.process_document_file("c1", &legacy, None).await,
            Err(ServiceError::Extraction(_))
        ));
    }

    #[tokio::test]
    async fn document_metadata_records_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("menu.md");
        std::fs::write(&path, "# Menu\n\ncafe e bolo").unwrap();

        let kb = knowledge_base(Arc::new(InMemoryIndex::new(4)));
        let report = kb.process_document_file("c1", &path, None).await.unwrap();
        assert!(report.chunks_processed >= 1);

        let result = kb.query_knowledge_base("c1", "cafe", 1).await.unwrap();
        let meta = &result.chunks[0].metadata;
        assert_eq!(meta["source_file"], "menu.md");
        assert_eq!(meta["file_type"], "md");
        assert_eq!(meta["source_type"], "document");
    }
}
