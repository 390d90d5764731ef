//! # WhatsApp GPT CLI (`wagpt`)
//!
//! Runs the HTTP API and exposes every service operation from the shell.
//!
//! ## Usage
//!
//! ```bash
//! wagpt --config ./config/wagpt.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wagpt serve` | Start the HTTP API |
//! | `wagpt setup` | Provision an agent for a new client |
//! | `wagpt instance ...` | Messaging instances: list, status, qr, delete, send |
//! | `wagpt workflow ...` | Workflows: status, activate, deactivate, delete, template |
//! | `wagpt knowledge ...` | Knowledge: add, ingest-file, query, stats, purge |
//!
//! A missing config file is not an error: defaults apply and credentials
//! are read from the environment (`EVOLUTION_API_KEY`, `N8N_API_KEY`,
//! `PINECONE_API_KEY`, `OPENAI_API_KEY`, ...). Log verbosity follows
//! `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use whatsapp_gpt::models::BusinessProfile;
use whatsapp_gpt::{commands, config, knowledge, server};

/// WhatsApp GPT: provision AI customer-service agents on WhatsApp.
#[derive(Parser)]
#[command(
    name = "wagpt",
    about = "WhatsApp GPT: provision AI customer-service agents on WhatsApp",
    version,
    long_about = "Creates a WhatsApp instance, a conversational workflow and a per-client \
    knowledge base for a business in one step, and manages each of them afterwards."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wagpt.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Provision a complete agent for a new client.
    ///
    /// Creates the WhatsApp instance and workflow, wires the webhook,
    /// ingests the business profile and activates the workflow.
    Setup {
        #[arg(long, default_value = "")]
        business_name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        hours: String,
        #[arg(long, default_value = "")]
        contact: String,
        /// Knowledge text to ingest.
        #[arg(long, conflicts_with = "knowledge_file")]
        knowledge_text: Option<String>,
        /// Read the knowledge text from a UTF-8 file.
        #[arg(long)]
        knowledge_file: Option<PathBuf>,
    },

    /// Manage messaging instances.
    Instance {
        #[command(subcommand)]
        action: InstanceAction,
    },

    /// Manage client workflows.
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Manage client knowledge bases.
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },
}

#[derive(Subcommand)]
enum InstanceAction {
    /// List every instance on the bridge.
    List,
    /// Show the WhatsApp connection state.
    Status { instance: String },
    /// Print the pairing QR code.
    Qr { instance: String },
    /// Delete an instance.
    Delete { instance: String },
    /// Send a text message.
    Send {
        instance: String,
        /// Recipient phone number or JID.
        number: String,
        text: String,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    Status { workflow_id: String },
    Activate { workflow_id: String },
    Deactivate { workflow_id: String },
    Delete { workflow_id: String },
    /// Print the workflow JSON a client would receive.
    Template {
        #[arg(long, default_value = "example")]
        client_id: String,
        #[arg(long)]
        business_name: Option<String>,
    },
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// Ingest a text snippet.
    Add { client_id: String, text: String },
    /// Ingest a document (txt, md, pdf, docx).
    IngestFile {
        client_id: String,
        path: PathBuf,
        /// Override the type detected from the extension.
        #[arg(long)]
        file_type: Option<String>,
    },
    /// Similarity search in a client's knowledge.
    Query {
        client_id: String,
        query: String,
        #[arg(long, default_value_t = knowledge::DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Show vector count and dimension.
    Stats { client_id: String },
    /// Delete every vector the client owns.
    Purge { client_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Printing the template needs no services.
    if let Commands::Workflow {
        action:
            WorkflowAction::Template {
                client_id,
                business_name,
            },
    } = &cli.command
    {
        return commands::run_workflow_template(client_id, business_name.as_deref());
    }

    let cfg = config::load_or_minimal(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Setup {
            business_name,
            description,
            hours,
            contact,
            knowledge_text,
            knowledge_file,
        } => {
            let knowledge_text = match knowledge_file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => knowledge_text.unwrap_or_default(),
            };
            let profile = BusinessProfile {
                business_name,
                business_description: description,
                business_hours: hours,
                contact_info: contact,
                knowledge_text,
            };
            commands::run_setup(&cfg, profile).await?;
        }
        Commands::Instance { action } => match action {
            InstanceAction::List => commands::run_instance_list(&cfg).await?,
            InstanceAction::Status { instance } => {
                commands::run_instance_status(&cfg, &instance).await?
            }
            InstanceAction::Qr { instance } => commands::run_instance_qr(&cfg, &instance).await?,
            InstanceAction::Delete { instance } => {
                commands::run_instance_delete(&cfg, &instance).await?
            }
            InstanceAction::Send {
                instance,
                number,
                text,
            } => commands::run_instance_send(&cfg, &instance, &number, &text).await?,
        },
        Commands::Workflow { action } => match action {
            WorkflowAction::Status { workflow_id } => {
                commands::run_workflow_status(&cfg, &workflow_id).await?
            }
            WorkflowAction::Activate { workflow_id } => {
                commands::run_workflow_activate(&cfg, &workflow_id, true).await?
            }
            WorkflowAction::Deactivate { workflow_id } => {
                commands::run_workflow_activate(&cfg, &workflow_id, false).await?
            }
            WorkflowAction::Delete { workflow_id } => {
                commands::run_workflow_delete(&cfg, &workflow_id).await?
            }
            WorkflowAction::Template { .. } => {
                // Handled above (before config loading)
                unreachable!()
            }
        },
        Commands::Knowledge { action } => match action {
            KnowledgeAction::Add { client_id, text } => {
                commands::run_knowledge_add(&cfg, &client_id, &text).await?
            }
            KnowledgeAction::IngestFile {
                client_id,
                path,
                file_type,
            } => {
                commands::run_knowledge_ingest_file(&cfg, &client_id, &path, file_type.as_deref())
                    .await?
            }
            KnowledgeAction::Query {
                client_id,
                query,
                top_k,
            } => commands::run_knowledge_query(&cfg, &client_id, &query, top_k).await?,
            KnowledgeAction::Stats { client_id } => {
                commands::run_knowledge_stats(&cfg, &client_id).await?
            }
            KnowledgeAction::Purge { client_id } => {
                commands::run_knowledge_purge(&cfg, &client_id).await?
            }
        },
    }

    Ok(())
}
