//! Workflow-engine client (n8n public API).
//!
//! Clones the agent workflow from [`crate::workflow_template`] for each
//! client and manages its lifecycle. Requests carry the `X-N8N-API-KEY`
//! header.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::config::WorkflowConfig;
use crate::error::{expect_success, ServiceError};
use crate::models::{ClientWorkflow, WorkflowStatus};
use crate::workflow_template::{self, WorkflowGraph, WEBHOOK_NODE_TYPE};

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Create the client's workflow and resolve its webhook URL.
    ///
    /// A webhook URL that cannot be resolved is `None`, not an error.
    async fn create_client_workflow(
        &self,
        client_id: &str,
        instance_id: &str,
        business_name: Option<&str>,
    ) -> Result<ClientWorkflow, ServiceError>;

    async fn activate_workflow(&self, workflow_id: &str) -> Result<(), ServiceError>;

    async fn deactivate_workflow(&self, workflow_id: &str) -> Result<(), ServiceError>;

    async fn delete_workflow(&self, workflow_id: &str) -> Result<(), ServiceError>;

    async fn get_workflow_status(&self, workflow_id: &str) -> Result<WorkflowStatus, ServiceError>;
}

/// The template, named for one client.
pub fn client_workflow_graph(
    client_id: &str,
    business_name: Option<&str>,
) -> Result<WorkflowGraph, ServiceError> {
    let mut graph = workflow_template::agent_workflow()?;
    let label = business_name.filter(|n| !n.is_empty()).unwrap_or(client_id);
    graph.name = format!("WhatsApp GPT - {}", label);
    Ok(graph)
}

#[derive(Deserialize)]
struct CreatedWorkflow {
    id: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteNode {
    #[serde(rename = "type", default)]
    node_type: String,
    #[serde(default)]
    webhook_id: Option<String>,
    #[serde(default)]
    parameters: Value,
}

/// Webhook URL of the first webhook node: by webhook id, else by path.
pub fn webhook_url_from_nodes(base_url: &str, workflow: &Value) -> Option<String> {
    let nodes: Vec<RemoteNode> = serde_json::from_value(workflow.get("nodes")?.clone()).ok()?;
    let node = nodes.into_iter().find(|n| n.node_type == WEBHOOK_NODE_TYPE)?;

    if let Some(id) = node.webhook_id.filter(|id| !id.is_empty()) {
        return Some(format!("{}/webhook/{}", base_url, id));
    }
    node.parameters
        .get("path")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .map(|path| format!("{}/webhook/{}", base_url, path))
}

/// Engine ids are strings, but some versions return them as numbers.
fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct N8nClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl N8nClient {
    pub fn new(config: &WorkflowConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/api/v1/workflows{}", self.base_url, path))
            .header("X-N8N-API-KEY", &self.api_key)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        context: &'static str,
    ) -> Result<reqwest::Response, ServiceError> {
        let response = builder
            .send()
            .await
            .map_err(ServiceError::transport(context))?;
        expect_success(response, context).await
    }

    async fn fetch_workflow(
        &self,
        workflow_id: &str,
        context: &'static str,
    ) -> Result<Value, ServiceError> {
        self.send(
            self.request(reqwest::Method::GET, &format!("/{}", workflow_id)),
            context,
        )
        .await?
        .json()
        .await
        .map_err(ServiceError::decode(context))
    }

    /// Look up the webhook URL of a stored workflow.
    pub async fn get_webhook_url(&self, workflow_id: &str) -> Option<String> {
        match self.fetch_workflow(workflow_id, "Failed to get workflow").await {
            Ok(workflow) => webhook_url_from_nodes(&self.base_url, &workflow),
            Err(e) => {
                tracing::warn!(workflow_id, "Error getting webhook URL: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl WorkflowEngine for N8nClient {
    async fn create_client_workflow(
        &self,
        client_id: &str,
        instance_id: &str,
        business_name: Option<&str>,
    ) -> Result<ClientWorkflow, ServiceError> {
        const CONTEXT: &str = "Failed to create workflow";

        let graph = client_workflow_graph(client_id, business_name)?;
        let response = self
            .send(
                self.request(reqwest::Method::POST, "").json(&graph.to_json()?),
                CONTEXT,
            )
            .await?;
        let created: CreatedWorkflow = response
            .json()
            .await
            .map_err(ServiceError::decode(CONTEXT))?;
        let workflow_id = id_string(&created.id);

        let webhook_url = self.get_webhook_url(&workflow_id).await;
        tracing::info!(
            workflow_id = %workflow_id,
            client_id,
            webhook = webhook_url.as_deref().unwrap_or("-"),
            "workflow created"
        );

        Ok(ClientWorkflow {
            workflow_id,
            client_id: client_id.to_string(),
            instance_id: instance_id.to_string(),
            name: graph.name,
            status: "created".to_string(),
            webhook_url,
            created_at: Utc::now(),
        })
    }

    async fn activate_workflow(&self, workflow_id: &str) -> Result<(), ServiceError> {
        self.send(
            self.request(reqwest::Method::POST, &format!("/{}/activate", workflow_id)),
            "Failed to activate workflow",
        )
        .await?;
        Ok(())
    }

    async fn deactivate_workflow(&self, workflow_id: &str) -> Result<(), ServiceError> {
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/{}/deactivate", workflow_id),
            ),
            "Failed to deactivate workflow",
        )
        .await?;
        Ok(())
    }

    async fn delete_workflow(&self, workflow_id: &str) -> Result<(), ServiceError> {
        self.send(
            self.request(reqwest::Method::DELETE, &format!("/{}", workflow_id)),
            "Failed to delete workflow",
        )
        .await?;
        Ok(())
    }

    async fn get_workflow_status(&self, workflow_id: &str) -> Result<WorkflowStatus, ServiceError> {
        let workflow = self
            .fetch_workflow(workflow_id, "Failed to get workflow status")
            .await?;
        Ok(WorkflowStatus {
            active: workflow
                .get("active")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            name: workflow
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            id: workflow.get("id").map(id_string).unwrap_or_default(),
            workflow,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn name_prefers_business_name() {
        let named = client_workflow_graph("c1", Some("Padaria Sol")).unwrap();
        assert_eq!(named.name, "WhatsApp GPT - Padaria Sol");
        let unnamed = client_workflow_graph("c1", Some("")).unwrap();
        assert_eq!(unnamed.name, "WhatsApp GPT - c1");
    }

    #[test]
    fn webhook_url_prefers_webhook_id() {
        let wf = json!({ "nodes": [
            { "type": "n8n-nodes-base.if", "parameters": {} },
            { "type": WEBHOOK_NODE_TYPE, "webhookId": "abc", "parameters": { "path": "whatsapp-webhook" } }
        ]});
        assert_eq!(
            webhook_url_from_nodes("http://n8n", &wf).as_deref(),
            Some("http://n8n/webhook/abc")
        );
    }

    #[test]
    fn webhook_url_falls_back_to_path() {
        let wf = json!({ "nodes": [
            { "type": WEBHOOK_NODE_TYPE, "parameters": { "path": "whatsapp-webhook" } }
        ]});
        assert_eq!(
            webhook_url_from_nodes("http://n8n", &wf).as_deref(),
            Some("http://n8n/webhook/whatsapp-webhook")
        );
        assert_eq!(webhook_url_from_nodes("http://n8n", &json!({ "nodes": [] })), None);
        assert_eq!(webhook_url_from_nodes("http://n8n", &json!({})), None);
    }

    #[test]
    fn numeric_ids_become_strings() {
        assert_eq!(id_string(&json!(42)), "42");
        assert_eq!(id_string(&json!("wf-1")), "wf-1");
    }
}
