//! The conversational workflow every client gets.
//!
//! The graph is built from typed nodes and checked before it is handed to
//! the engine:
//!
//! ```text
//! Webhook Trigger → Message Filter → Extract Message
//!     → Query Knowledge Base → Generate AI Response → Send WhatsApp Reply
//! ```
//!
//! Node parameters stay free-form JSON; the engine owns their schema.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};

use crate::error::ServiceError;

pub const WEBHOOK_NODE_TYPE: &str = "n8n-nodes-base.webhook";
pub const WEBHOOK_PATH: &str = "whatsapp-webhook";

const TEMPLATE_NAME: &str = "WhatsApp GPT Agent Template";
const TIMEZONE: &str = "Africa/Maputo";

const SYSTEM_PROMPT: &str = "Você é um assistente virtual inteligente para atendimento ao cliente via WhatsApp. Use o contexto fornecido para responder às perguntas de forma útil, profissional e amigável. Se não souber a resposta, seja honesto e ofereça ajuda alternativa. Sempre responda em português.";

const USER_PROMPT: &str =
    "Contexto: {{$json.context}}\n\nPergunta do cliente: {{$('Extract Message').item.json.messageText}}";

const EXTRACT_MESSAGE_JS: &str = r#"// Extract message data
const messageData = $input.first().json;
const message = messageData.data?.message;
const remoteJid = messageData.data?.key?.remoteJid;
const messageText = message?.conversation || message?.extendedTextMessage?.text || '';

// Skip if no message text or if it's from us
if (!messageText || messageData.data?.key?.fromMe) {
  return [];
}

return [{
  messageText,
  remoteJid,
  instanceId: messageData.instance,
  timestamp: new Date().toISOString()
}];"#;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub type_version: u32,
    pub position: [i32; 2],
    pub parameters: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<String>,
}

impl Node {
    fn new(id: &str, name: &str, node_type: &str, type_version: u32, x: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            node_type: node_type.to_string(),
            type_version,
            position: [x, 300],
            parameters: json!({}),
            webhook_id: None,
        }
    }

    fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn is_webhook(&self) -> bool {
        self.node_type == WEBHOOK_NODE_TYPE
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub timezone: String,
}

/// A validated workflow graph, ready to post to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowGraph {
    pub name: String,
    pub nodes: Vec<Node>,
    /// Source node name → target node names, in wiring order.
    #[serde(serialize_with = "serialize_connections")]
    pub connections: BTreeMap<String, Vec<String>>,
    pub active: bool,
    pub settings: Settings,
    pub tags: Vec<Tag>,
}

fn serialize_connections<S>(
    connections: &BTreeMap<String, Vec<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let mut out = Map::new();
    for (source, targets) in connections {
        let outputs: Vec<Value> = targets
            .iter()
            .map(|t| json!({ "node": t, "type": "main", "index": 0 }))
            .collect();
        out.insert(source.clone(), json!({ "main": [outputs] }));
    }
    out.serialize(serializer)
}

impl WorkflowGraph {
    pub fn webhook_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_webhook())
    }

    /// Serialize to the engine's JSON shape.
    pub fn to_json(&self) -> Result<Value, ServiceError> {
        serde_json::to_value(self).map_err(|e| ServiceError::Template(e.to_string()))
    }
}

/// Assembles a [`WorkflowGraph`] node by node.
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    name: String,
    nodes: Vec<Node>,
    connections: BTreeMap<String, Vec<String>>,
    tags: Vec<Tag>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn connect(mut self, from: &str, to: &str) -> Self {
        self.connections
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
        self
    }

    pub fn tag(mut self, name: &str, id: &str) -> Self {
        self.tags.push(Tag {
            name: name.to_string(),
            id: id.to_string(),
        });
        self
    }

    /// Validate and produce the graph.
    ///
    /// Node names must be unique, every connection must join two existing
    /// nodes, and there must be exactly one webhook trigger.
    pub fn build(self) -> Result<WorkflowGraph, ServiceError> {
        self.validate()?;

        Ok(WorkflowGraph {
            name: self.name,
            nodes: self.nodes,
            connections: self.connections,
            active: false,
            settings: Settings {
                timezone: TIMEZONE.to_string(),
            },
            tags: self.tags,
        })
    }

    fn validate(&self) -> Result<(), ServiceError> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(ServiceError::Template(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
        }

        for (source, targets) in &self.connections {
            for endpoint in std::iter::once(source).chain(targets) {
                if !names.contains(endpoint.as_str()) {
                    return Err(ServiceError::Template(format!(
                        "connection references unknown node '{}'",
                        endpoint
                    )));
                }
            }
        }

        let webhooks = self.nodes.iter().filter(|n| n.is_webhook()).count();
        if webhooks != 1 {
            return Err(ServiceError::Template(format!(
                "expected exactly one webhook trigger, found {}",
                webhooks
            )));
        }
        Ok(())
    }
}

fn webhook_trigger() -> Node {
    let mut node = Node::new("webhook-trigger", "Webhook Trigger", WEBHOOK_NODE_TYPE, 1, 240)
        .with_parameters(json!({ "path": WEBHOOK_PATH, "options": {} }));
    node.webhook_id = Some(uuid::Uuid::new_v4().to_string());
    node
}

fn message_filter() -> Node {
    Node::new("message-filter", "Message Filter", "n8n-nodes-base.if", 1, 460).with_parameters(
        json!({
            "conditions": {
                "string": [{
                    "value1": "={{$json.event}}",
                    "operation": "equal",
                    "value2": "messages.upsert"
                }]
            }
        }),
    )
}

fn extract_message() -> Node {
    Node::new("extract-message", "Extract Message", "n8n-nodes-base.code", 2, 680)
        .with_parameters(json!({ "jsCode": EXTRACT_MESSAGE_JS }))
}

/// Body/header parameter list in the engine's `{parameters: [{name, value}]}` form.
fn parameter_list(pairs: &[(&str, &str)]) -> Value {
    let parameters: Vec<Value> = pairs
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    json!({ "parameters": parameters })
}

fn query_knowledge_base() -> Node {
    Node::new(
        "query-knowledge-base",
        "Query Knowledge Base",
        "n8n-nodes-base.httpRequest",
        4,
        900,
    )
    .with_parameters(json!({
        "url": "={{$env.VECTOR_STORE_URL}}/query",
        "sendHeaders": true,
        "headerParameters": parameter_list(&[
            ("Authorization", "Bearer {{$env.VECTOR_STORE_API_KEY}}"),
        ]),
        "sendBody": true,
        "bodyParameters": parameter_list(&[
            ("query", "={{$json.messageText}}"),
            ("namespace", "={{$json.instanceId}}"),
            ("top_k", "3"),
        ]),
    }))
}

fn generate_response() -> Node {
    Node::new(
        "generate-ai-response",
        "Generate AI Response",
        "@n8n/n8n-nodes-langchain.openAi",
        1,
        1120,
    )
    .with_parameters(json!({
        "model": "gpt-4o",
        "messages": {
            "messageValues": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": USER_PROMPT }
            ]
        },
        "options": { "temperature": 0.7, "maxTokens": 500 }
    }))
}

fn send_reply() -> Node {
    Node::new(
        "send-whatsapp-reply",
        "Send WhatsApp Reply",
        "n8n-nodes-base.httpRequest",
        4,
        1340,
    )
    .with_parameters(json!({
        "url": "={{$env.EVOLUTION_API_URL}}/message/sendText/{{$('Extract Message').item.json.instanceId}}",
        "sendHeaders": true,
        "headerParameters": parameter_list(&[("apikey", "={{$env.EVOLUTION_API_KEY}}")]),
        "sendBody": true,
        "bodyParameters": parameter_list(&[
            ("number", "={{$('Extract Message').item.json.remoteJid}}"),
            ("text", "={{$json.choices[0].message.content}}"),
        ]),
    }))
}

/// The six-node WhatsApp agent workflow with a fresh webhook id.
pub fn agent_workflow() -> Result<WorkflowGraph, ServiceError> {
    WorkflowBuilder::new(TEMPLATE_NAME)
        .node(webhook_trigger())
        .node(message_filter())
        .node(extract_message())
        .node(query_knowledge_base())
        .node(generate_response())
        .node(send_reply())
        .connect("Webhook Trigger", "Message Filter")
        .connect("Message Filter", "Extract Message")
        .connect("Extract Message", "Query Knowledge Base")
        .connect("Query Knowledge Base", "Generate AI Response")
        .connect("Generate AI Response", "Send WhatsApp Reply")
        .tag("WhatsApp GPT", "whatsapp-gpt")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_workflow_is_a_six_stage_chain() {
        let graph = agent_workflow().unwrap();
        assert_eq!(graph.nodes.len(), 6);
        assert_eq!(graph.connections.len(), 5);
        assert!(!graph.active);
        assert_eq!(graph.settings.timezone, "Africa/Maputo");

        let webhook = graph.webhook_node().unwrap();
        assert_eq!(webhook.parameters["path"], WEBHOOK_PATH);
        assert!(webhook.webhook_id.is_some());
    }

    #[test]
    fn each_build_gets_a_fresh_webhook_id() {
        let a = agent_workflow().unwrap();
        let b = agent_workflow().unwrap();
        assert_ne!(
            a.webhook_node().unwrap().webhook_id,
            b.webhook_node().unwrap().webhook_id
        );
    }

    #[test]
    fn serializes_in_engine_shape() {
        let json = agent_workflow().unwrap().to_json().unwrap();
        assert_eq!(json["nodes"][0]["type"], WEBHOOK_NODE_TYPE);
        assert_eq!(json["nodes"][0]["typeVersion"], 1);
        assert!(json["nodes"][0]["webhookId"].is_string());
        assert!(json["nodes"][1].get("webhookId").is_none());
        assert_eq!(
            json["connections"]["Webhook Trigger"]["main"][0][0],
            json!({ "node": "Message Filter", "type": "main", "index": 0 })
        );
        assert_eq!(json["nodes"][4]["parameters"]["model"], "gpt-4o");
        assert_eq!(json["nodes"][4]["parameters"]["options"]["maxTokens"], 500);
        assert_eq!(json["tags"][0]["id"], "whatsapp-gpt");
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = WorkflowBuilder::new("t")
            .node(webhook_trigger())
            .node(webhook_trigger())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate node name"));
    }

    #[test]
    fn rejects_dangling_connection() {
        let err = WorkflowBuilder::new("t")
            .node(webhook_trigger())
            .connect("Webhook Trigger", "Nowhere")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Nowhere"));
    }

    #[test]
    fn requires_exactly_one_webhook() {
        let err = WorkflowBuilder::new("t")
            .node(message_filter())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("found 0"));
    }
}
