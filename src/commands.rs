//! CLI command implementations.
//!
//! Each `run_*` function drives one service operation and prints the
//! outcome to stdout. Failures are returned as errors so the binary exits
//! non-zero.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::knowledge::KnowledgeBase;
use crate::messaging::{EvolutionClient, MessagingBridge};
use crate::models::{BusinessProfile, Metadata};
use crate::setup::SetupOrchestrator;
use crate::workflow::{client_workflow_graph, N8nClient, WorkflowEngine};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Setup summary wording for the knowledge step.
fn knowledge_outcome(profile: &BusinessProfile, processed: bool) -> &'static str {
    if processed {
        "ingested"
    } else if profile.knowledge_text.is_empty() {
        "skipped"
    } else {
        "failed (see log)"
    }
}

pub async fn run_setup(config: &Config, profile: BusinessProfile) -> Result<()> {
    let orchestrator = SetupOrchestrator::new(
        Arc::new(EvolutionClient::new(&config.messaging)),
        Arc::new(N8nClient::new(&config.workflow)),
        Arc::new(KnowledgeBase::from_config(config).await),
    );
    let setup = orchestrator.setup_agent(&profile).await?;

    println!("Agent ready for client {}", setup.client_id);
    println!("  instance:  {}", setup.instance_id);
    println!("  workflow:  {}", setup.workflow_id);
    println!(
        "  webhook:   {}",
        setup.webhook_url.as_deref().unwrap_or("(not resolved)")
    );
    println!(
        "  knowledge: {}",
        knowledge_outcome(&profile, setup.knowledge_processed)
    );
    println!("  active:    {}", setup.workflow_active);
    if let Some(qr) = &setup.qr_code {
        println!("\nScan to pair WhatsApp:\n{}", qr);
    }
    Ok(())
}

// ============ instance ============

pub async fn run_instance_list(config: &Config) -> Result<()> {
    let instances = EvolutionClient::new(&config.messaging).list_instances().await?;
    print_json(&instances)
}

pub async fn run_instance_status(config: &Config, instance: &str) -> Result<()> {
    let status = EvolutionClient::new(&config.messaging)
        .check_connection_status(instance)
        .await?;
    println!("{}: {:?}", instance, status.status);
    Ok(())
}

pub async fn run_instance_qr(config: &Config, instance: &str) -> Result<()> {
    let qr = EvolutionClient::new(&config.messaging)
        .get_qr_code(instance)
        .await?;
    if qr.code.is_none() && qr.pairing_code.is_none() {
        bail!("instance {} returned no QR code (already paired?)", instance);
    }
    if let Some(code) = &qr.code {
        println!("{}", code);
    }
    if let Some(pairing) = &qr.pairing_code {
        println!("pairing code: {}", pairing);
    }
    Ok(())
}

pub async fn run_instance_delete(config: &Config, instance: &str) -> Result<()> {
    EvolutionClient::new(&config.messaging)
        .delete_instance(instance)
        .await?;
    println!("Deleted instance {}", instance);
    Ok(())
}

pub async fn run_instance_send(
    config: &Config,
    instance: &str,
    number: &str,
    text: &str,
) -> Result<()> {
    let response = EvolutionClient::new(&config.messaging)
        .send_message(instance, number, text)
        .await?;
    print_json(&response)
}

// ============ workflow ============

pub async fn run_workflow_status(config: &Config, workflow_id: &str) -> Result<()> {
    let status = N8nClient::new(&config.workflow)
        .get_workflow_status(workflow_id)
        .await?;
    println!(
        "{} ({}): {}",
        status.name,
        status.id,
        if status.active { "active" } else { "inactive" }
    );
    Ok(())
}

pub async fn run_workflow_activate(config: &Config, workflow_id: &str, active: bool) -> Result<()> {
    let client = N8nClient::new(&config.workflow);
    if active {
        client.activate_workflow(workflow_id).await?;
        println!("Activated workflow {}", workflow_id);
    } else {
        client.deactivate_workflow(workflow_id).await?;
        println!("Deactivated workflow {}", workflow_id);
    }
    Ok(())
}

pub async fn run_workflow_delete(config: &Config, workflow_id: &str) -> Result<()> {
    N8nClient::new(&config.workflow)
        .delete_workflow(workflow_id)
        .await?;
    println!("Deleted workflow {}", workflow_id);
    Ok(())
}

/// Print the workflow a client would receive, without creating it.
pub fn run_workflow_template(client_id: &str, business_name: Option<&str>) -> Result<()> {
    let graph = client_workflow_graph(client_id, business_name)?;
    print_json(&graph.to_json()?)
}

// ============ knowledge ============

async fn knowledge_base(config: &Config) -> Result<KnowledgeBase> {
    let kb = KnowledgeBase::from_config(config).await;
    if !kb.is_initialized() {
        bail!("vector index is not available; check the [knowledge] settings");
    }
    Ok(kb)
}

pub async fn run_knowledge_add(config: &Config, client_id: &str, text: &str) -> Result<()> {
    let report = knowledge_base(config)
        .await?
        .process_text_content(client_id, text, Metadata::new())
        .await?;
    println!(
        "Processed {} chunks into {}",
        report.chunks_processed, report.namespace
    );
    Ok(())
}

pub async fn run_knowledge_ingest_file(
    config: &Config,
    client_id: &str,
    path: &Path,
    file_type: Option<&str>,
) -> Result<()> {
    if !path.is_file() {
        bail!("file not found: {}", path.display());
    }
    let report = knowledge_base(config)
        .await?
        .process_document_file(client_id, path, file_type)
        .await
        .with_context(|| format!("Failed to ingest {}", path.display()))?;
    println!(
        "Processed {} chunks from {} into {}",
        report.chunks_processed,
        path.display(),
        report.namespace
    );
    Ok(())
}

pub async fn run_knowledge_query(
    config: &Config,
    client_id: &str,
    query: &str,
    top_k: usize,
) -> Result<()> {
    let result = knowledge_base(config)
        .await?
        .query_knowledge_base(client_id, query, top_k)
        .await?;

    if result.chunks.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, chunk) in result.chunks.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, chunk.score, chunk.content.replace('\n', " "));
    }
    Ok(())
}

pub async fn run_knowledge_stats(config: &Config, client_id: &str) -> Result<()> {
    let stats = knowledge_base(config)
        .await?
        .get_client_stats(client_id)
        .await?;
    println!("namespace:     {}", stats.namespace);
    println!("total vectors: {}", stats.total_vectors);
    println!("dimension:     {}", stats.dimension);
    Ok(())
}

pub async fn run_knowledge_purge(config: &Config, client_id: &str) -> Result<()> {
    knowledge_base(config)
        .await?
        .delete_client_data(client_id)
        .await?;
    println!("Deleted all knowledge for client {}", client_id);
    Ok(())
}
