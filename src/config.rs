//! TOML configuration.
//!
//! Every section is optional. Values left empty in the file fall back to the
//! environment variables the deployment already exports
//! (`EVOLUTION_API_URL`, `N8N_API_KEY`, `PINECONE_API_KEY`, ...) and then to
//! built-in defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Path every route is mounted under. Empty mounts at the root.
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            route_prefix: default_route_prefix(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_route_prefix() -> String {
    "/api/whatsapp-gpt".to_string()
}

/// Evolution API connection.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct MessagingConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

/// n8n public API connection.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

/// Vector index selection and Pinecone settings.
#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    /// `pinecone` or `memory`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub index_name: String,
    /// Data-plane host. Resolved through the control plane when unset.
    #[serde(default)]
    pub index_host: Option<String>,
    #[serde(default = "default_control_plane_url")]
    pub control_plane_url: String,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            api_key: String::new(),
            index_name: String::new(),
            index_host: None,
            control_plane_url: default_control_plane_url(),
            cloud: default_cloud(),
            region: default_region(),
            metric: default_metric(),
            dims: default_dims(),
        }
    }
}

fn default_backend() -> String {
    "pinecone".to_string()
}
fn default_control_plane_url() -> String {
    "https://api.pinecone.io".to_string()
}
fn default_cloud() -> String {
    "aws".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_metric() -> String {
    "cosine".to_string()
}
fn default_dims() -> usize {
    1536
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_embedding_url(),
            api_key: String::new(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_embedding_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}

/// Recursive splitter sizes, in characters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

impl Config {
    /// Defaults plus environment, for running without a config file.
    pub fn minimal() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        fill_url(
            &mut self.messaging.base_url,
            "EVOLUTION_API_URL",
            "http://localhost:8080",
        );
        fill(&mut self.messaging.api_key, "EVOLUTION_API_KEY", "change-me");
        fill_url(&mut self.workflow.base_url, "N8N_API_URL", "http://localhost:5678");
        fill(&mut self.workflow.api_key, "N8N_API_KEY", "");
        fill(&mut self.knowledge.api_key, "PINECONE_API_KEY", "");
        fill(
            &mut self.knowledge.index_name,
            "PINECONE_INDEX_NAME",
            "whatsapp-gpt",
        );
        fill(&mut self.embedding.api_key, "OPENAI_API_KEY", "");
    }

    fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.knowledge.dims == 0 {
            anyhow::bail!("knowledge.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        match self.knowledge.backend.as_str() {
            "pinecone" | "memory" => {}
            other => anyhow::bail!(
                "Unknown knowledge backend: '{}'. Must be pinecone or memory.",
                other
            ),
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled or openai.",
                other
            ),
        }

        Ok(())
    }
}

fn fill(value: &mut String, var: &str, default: &str) {
    if value.is_empty() {
        *value = std::env::var(var).unwrap_or_else(|_| default.to_string());
    }
}

/// [`fill`], then strip trailing slashes so paths can be appended.
fn fill_url(value: &mut String, var: &str, default: &str) {
    fill(value, var, default);
    let trimmed = value.trim_end_matches('/').len();
    value.truncate(trimmed);
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Like [`load_config`], but a missing file yields [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(
            "config file {} not found, using defaults and environment",
            path.display()
        );
        Ok(Config::minimal())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_values_win_over_defaults() {
        let cfg = parse_config(
            r#"
[messaging]
base_url = "http://evolution.test/"
api_key = "k1"

[workflow]
base_url = "http://n8n.test"
api_key = "k2"

[knowledge]
backend = "memory"
api_key = "k3"
index_name = "agents"
"#,
        )
        .unwrap();
        assert_eq!(cfg.messaging.base_url, "http://evolution.test");
        assert_eq!(cfg.workflow.api_key, "k2");
        assert_eq!(cfg.knowledge.backend, "memory");
        assert_eq!(cfg.knowledge.index_name, "agents");
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert_eq!(cfg.chunking.chunk_overlap, 200);
        assert_eq!(cfg.server.route_prefix, "/api/whatsapp-gpt");
    }

    #[test]
    fn secrets_keep_trailing_slashes() {
        let cfg = parse_config(
            r#"
[messaging]
base_url = "http://evolution.test//"
api_key = "abc/def//"

[workflow]
api_key = "n8n/"

[knowledge]
api_key = "pc/"
index_name = "agents/"

[embedding]
api_key = "sk/"
"#,
        )
        .unwrap();
        assert_eq!(cfg.messaging.base_url, "http://evolution.test");
        assert_eq!(cfg.messaging.api_key, "abc/def//");
        assert_eq!(cfg.workflow.api_key, "n8n/");
        assert_eq!(cfg.knowledge.api_key, "pc/");
        assert_eq!(cfg.knowledge.index_name, "agents/");
        assert_eq!(cfg.embedding.api_key, "sk/");
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn unknown_backend_rejected() {
        let err = parse_config("[knowledge]\nbackend = \"qdrant\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown knowledge backend"));
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        let err = parse_config("[embedding]\nprovider = \"ollama\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }
}
