//! Core data models shared by the service clients, the setup pipeline and
//! the HTTP layer.
//!
//! None of these are persisted locally. Each one mirrors a record held by an
//! external service, or a result assembled from such records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata attached to knowledge chunks.
pub type Metadata = serde_json::Map<String, Value>;

/// Lifecycle of a messaging instance as seen by this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Created,
    Connected,
    Disconnected,
}

/// A per-client WhatsApp instance held by the messaging bridge.
#[derive(Debug, Clone, Serialize)]
pub struct MessagingInstance {
    pub instance_id: String,
    pub instance_name: String,
    pub client_id: String,
    pub status: InstanceStatus,
    pub qr_code: Option<String>,
    pub webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Pairing payload returned by the bridge's connect endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCode {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub base64: Option<String>,
    #[serde(default)]
    pub pairing_code: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
}

/// Normalized WhatsApp connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Open,
    Connecting,
    Close,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub status: ConnectionState,
    /// Raw bridge response.
    pub data: Value,
}

/// Events the bridge can deliver to a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookEvent {
    ApplicationStartup,
    QrcodeUpdated,
    MessagesSet,
    MessagesUpsert,
    MessagesUpdate,
    MessagesDelete,
    SendMessage,
    ContactsUpdate,
    PresenceUpdate,
    ChatsUpsert,
    GroupsUpsert,
    ConnectionUpdate,
    Call,
}

impl WebhookEvent {
    /// Event set used when the caller does not choose one.
    pub const DEFAULTS: [WebhookEvent; 5] = [
        WebhookEvent::MessagesUpsert,
        WebhookEvent::ConnectionUpdate,
        WebhookEvent::Call,
        WebhookEvent::GroupsUpsert,
        WebhookEvent::ContactsUpdate,
    ];
}

/// A client's automation workflow held by the workflow engine.
///
/// `client_id` and `instance_id` only live here; the engine knows the
/// workflow by id and name.
#[derive(Debug, Clone, Serialize)]
pub struct ClientWorkflow {
    pub workflow_id: String,
    pub client_id: String,
    pub instance_id: String,
    pub name: String,
    pub status: String,
    pub webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    pub workflow: Value,
    pub active: bool,
    pub name: String,
    pub id: String,
}

/// One embedded fragment of a client's knowledge.
#[derive(Debug, Clone)]
pub struct KnowledgeChunk {
    pub id: String,
    pub client_id: String,
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub chunks_processed: usize,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeMatch {
    pub content: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// Ranked matches plus their contents joined into one context string.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub context: String,
    pub chunks: Vec<KnowledgeMatch>,
    pub total_results: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    pub total_vectors: u64,
    pub namespace: String,
    pub dimension: usize,
}

/// Business-profile input to agent setup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BusinessProfile {
    pub business_name: String,
    pub business_description: String,
    pub business_hours: String,
    pub contact_info: String,
    pub knowledge_text: String,
}

/// Consolidated result of a completed agent setup.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSetup {
    pub client_id: String,
    pub instance_id: String,
    pub workflow_id: String,
    pub qr_code: Option<String>,
    pub webhook_url: Option<String>,
    pub knowledge_processed: bool,
    pub workflow_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_normalizes_unknown_values() {
        let open: ConnectionState = serde_json::from_value(serde_json::json!("open")).unwrap();
        let odd: ConnectionState = serde_json::from_value(serde_json::json!("refused")).unwrap();
        assert_eq!(open, ConnectionState::Open);
        assert_eq!(odd, ConnectionState::Unknown);
    }

    #[test]
    fn webhook_events_use_bridge_names() {
        let json = serde_json::to_value(WebhookEvent::DEFAULTS).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                "MESSAGES_UPSERT",
                "CONNECTION_UPDATE",
                "CALL",
                "GROUPS_UPSERT",
                "CONTACTS_UPDATE"
            ])
        );
    }

    #[test]
    fn business_profile_fields_are_optional() {
        let profile: BusinessProfile =
            serde_json::from_value(serde_json::json!({ "business_name": "Padaria" })).unwrap();
        assert_eq!(profile.business_name, "Padaria");
        assert!(profile.knowledge_text.is_empty());
    }
}
