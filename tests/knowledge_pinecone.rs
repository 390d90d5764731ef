//! Knowledge base over the OpenAI embeddings API and a Pinecone index,
//! both mocked.

use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use whatsapp_gpt::chunk::TextSplitter;
use whatsapp_gpt::config::{EmbeddingConfig, KnowledgeConfig};
use whatsapp_gpt::embedding::OpenAIProvider;
use whatsapp_gpt::knowledge::KnowledgeBase;
use whatsapp_gpt::models::Metadata;
use whatsapp_gpt::vector::pinecone::PineconeIndex;
use whatsapp_gpt::vector::VectorIndex;

fn embedder(server: &Server) -> Arc<OpenAIProvider> {
    let config = EmbeddingConfig {
        base_url: server.url(),
        api_key: "sk-test".to_string(),
        ..Default::default()
    };
    Arc::new(OpenAIProvider::new(&config, 3).unwrap())
}

async fn mock_single_embedding(server: &mut Server) -> mockito::Mock {
    server
        .mock("POST", "/embeddings")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({ "model": "text-embedding-ada-002" })))
        .with_status(200)
        .with_body(r#"{"data":[{"index":0,"embedding":[0.1,0.2,0.3]}]}"#)
        .create_async()
        .await
}

#[tokio::test]
async fn ingest_upserts_into_client_namespace() {
    let mut openai = Server::new_async().await;
    let mut pinecone = Server::new_async().await;
    let embed = mock_single_embedding(&mut openai).await;
    let upsert = pinecone
        .mock("POST", "/vectors/upsert")
        .match_header("Api-Key", "pc-key")
        .match_body(Matcher::PartialJson(json!({ "namespace": "client_c1" })))
        .with_status(200)
        .with_body(r#"{"upsertedCount":1}"#)
        .create_async()
        .await;

    let index = Arc::new(PineconeIndex::new(&pinecone.url(), "pc-key"));
    let kb = KnowledgeBase::new(Some(index), embedder(&openai), TextSplitter::new(1000, 200));

    let report = kb
        .process_text_content("c1", "Abrimos às 8h.", Metadata::new())
        .await
        .unwrap();
    assert_eq!(report.chunks_processed, 1);
    assert_eq!(report.namespace, "client_c1");
    embed.assert_async().await;
    upsert.assert_async().await;
}

#[tokio::test]
async fn query_maps_matches_and_joins_context() {
    let mut openai = Server::new_async().await;
    let mut pinecone = Server::new_async().await;
    mock_single_embedding(&mut openai).await;
    let query = pinecone
        .mock("POST", "/query")
        .match_body(Matcher::PartialJson(json!({
            "namespace": "client_c1",
            "topK": 2,
            "includeMetadata": true
        })))
        .with_status(200)
        .with_body(
            json!({
                "matches": [
                    { "id": "a", "score": 0.92, "metadata": { "content": "Abrimos às 8h." } },
                    { "id": "b", "score": 0.81, "metadata": { "content": "Fechamos às 18h." } }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let index = Arc::new(PineconeIndex::new(&pinecone.url(), "pc-key"));
    let kb = KnowledgeBase::new(Some(index), embedder(&openai), TextSplitter::new(1000, 200));

    let result = kb.query_knowledge_base("c1", "horário?", 2).await.unwrap();
    query.assert_async().await;
    assert_eq!(result.total_results, 2);
    assert!((result.chunks[0].score - 0.92).abs() < 1e-6);
    assert_eq!(result.context, "Abrimos às 8h.\n\nFechamos às 18h.");
}

#[tokio::test]
async fn stats_and_purge() {
    let mut openai = Server::new_async().await;
    let mut pinecone = Server::new_async().await;
    pinecone
        .mock("POST", "/describe_index_stats")
        .with_status(200)
        .with_body(r#"{"dimension":1536,"namespaces":{"client_c1":{"vectorCount":7}}}"#)
        .create_async()
        .await;
    // Deleting a namespace that never existed answers 404.
    let delete = pinecone
        .mock("POST", "/vectors/delete")
        .match_body(Matcher::Json(json!({ "deleteAll": true, "namespace": "client_c9" })))
        .with_status(404)
        .create_async()
        .await;
    let embed = openai.mock("POST", "/embeddings").expect(0).create_async().await;

    let index = Arc::new(PineconeIndex::new(&pinecone.url(), "pc-key"));
    let kb = KnowledgeBase::new(Some(index), embedder(&openai), TextSplitter::new(1000, 200));

    let stats = kb.get_client_stats("c1").await.unwrap();
    assert_eq!(stats.total_vectors, 7);
    assert_eq!(stats.dimension, 1536);
    assert_eq!(kb.get_client_stats("c2").await.unwrap().total_vectors, 0);

    kb.delete_client_data("c9").await.unwrap();
    delete.assert_async().await;
    embed.assert_async().await;
}

#[tokio::test]
async fn embedding_failure_surfaces_remote_error() {
    let mut openai = Server::new_async().await;
    let pinecone = Server::new_async().await;
    openai
        .mock("POST", "/embeddings")
        .with_status(429)
        .with_body(r#"{"error":{"message":"Rate limit reached"}}"#)
        .create_async()
        .await;

    let index = Arc::new(PineconeIndex::new(&pinecone.url(), "pc-key"));
    let kb = KnowledgeBase::new(Some(index), embedder(&openai), TextSplitter::new(1000, 200));

    let err = kb
        .process_text_content("c1", "texto", Metadata::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Rate limit reached"));
}

#[tokio::test]
async fn connect_creates_missing_index() {
    let mut control = Server::new_async().await;
    let mut data = Server::new_async().await;
    control
        .mock("GET", "/indexes/agents")
        .match_header("Api-Key", "pc-key")
        .with_status(404)
        .create_async()
        .await;
    let create = control
        .mock("POST", "/indexes")
        .match_body(Matcher::PartialJson(json!({
            "name": "agents",
            "dimension": 1536,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } }
        })))
        .with_status(201)
        .with_body(json!({ "name": "agents", "host": data.url() }).to_string())
        .create_async()
        .await;
    let stats = data
        .mock("POST", "/describe_index_stats")
        .with_status(200)
        .with_body(r#"{"dimension":1536,"namespaces":{}}"#)
        .create_async()
        .await;

    let config = KnowledgeConfig {
        api_key: "pc-key".to_string(),
        index_name: "agents".to_string(),
        control_plane_url: control.url(),
        ..Default::default()
    };
    let index = PineconeIndex::connect(&config).await.unwrap();
    assert_eq!(index.describe_stats().await.unwrap().dimension, 1536);

    create.assert_async().await;
    stats.assert_async().await;
}

#[tokio::test]
async fn connect_uses_existing_index_host() {
    let mut control = Server::new_async().await;
    let data = Server::new_async().await;
    let describe = control
        .mock("GET", "/indexes/agents")
        .with_status(200)
        .with_body(json!({ "name": "agents", "host": data.url() }).to_string())
        .create_async()
        .await;
    let create = control.mock("POST", "/indexes").expect(0).create_async().await;

    let config = KnowledgeConfig {
        api_key: "pc-key".to_string(),
        index_name: "agents".to_string(),
        control_plane_url: control.url(),
        ..Default::default()
    };
    PineconeIndex::connect(&config).await.unwrap();

    describe.assert_async().await;
    create.assert_async().await;
}
