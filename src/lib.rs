//! # WhatsApp GPT
//!
//! Provisions AI customer-service agents on WhatsApp for small businesses.
//!
//! One setup call wires three external services together for a new client:
//! a WhatsApp messaging bridge (Evolution API), a workflow engine (n8n) that
//! runs the conversation loop, and a per-client knowledge base held in a
//! vector index (Pinecone, with OpenAI embeddings).
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────┐
//!  HTTP / CLI ──▶│ SetupOrchestrator│
//!                └───┬─────┬────┬───┘
//!                    ▼     ▼    ▼
//!           ┌─────────┐ ┌─────┐ ┌───────────────┐
//!           │Evolution│ │ n8n │ │ KnowledgeBase │
//!           │  API    │ │     │ │ split+embed   │
//!           └─────────┘ └─────┘ └──────┬────────┘
//!                                      ▼
//!                                ┌───────────┐
//!                                │VectorIndex│
//!                                └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wagpt serve                                  # start the HTTP API
//! wagpt setup --business-name "Padaria Sol" --knowledge-text "..."
//! wagpt knowledge query <client_id> "horário"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Service and setup errors |
//! | [`messaging`] | Evolution API client |
//! | [`workflow`] | n8n client |
//! | [`workflow_template`] | Agent workflow graph builder |
//! | [`chunk`] | Recursive text splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`extract`] | Document text extraction |
//! | [`vector`] | Vector index backends |
//! | [`knowledge`] | Per-client knowledge base |
//! | [`setup`] | Agent provisioning pipeline |
//! | [`server`] | HTTP JSON API |
//! | [`commands`] | CLI command implementations |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod knowledge;
pub mod messaging;
pub mod models;
pub mod server;
pub mod setup;
pub mod vector;
pub mod workflow;
pub mod workflow_template;
