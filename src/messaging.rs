//! Messaging-bridge client (Evolution API).
//!
//! Every operation is one HTTP call authenticated with the `apikey` header.
//! Failures come back as [`ServiceError`]; nothing is retried.
//!
//! | Operation | Call |
//! |-----------|------|
//! | create instance | `POST /instance/create` (201 only) |
//! | QR code | `GET /instance/connect/{name}` |
//! | connection state | `GET /instance/connectionState/{name}` |
//! | webhook | `POST /webhook/set/{name}` |
//! | send text | `POST /message/sendText/{name}` |
//! | delete | `DELETE /instance/delete/{name}` |
//! | list | `GET /instance/fetchInstances` |

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::MessagingConfig;
use crate::error::{expect_status, expect_success, ServiceError};
use crate::models::{
    ConnectionState, ConnectionStatus, InstanceStatus, MessagingInstance, QrCode, WebhookEvent,
};

/// Operations the setup pipeline and routes need from the messaging bridge.
#[async_trait]
pub trait MessagingBridge: Send + Sync {
    /// Create a QR-enabled instance for `client_id` and fetch its pairing QR.
    ///
    /// A failed QR fetch leaves `qr_code` empty and is not an error.
    async fn create_instance(
        &self,
        client_id: &str,
        business_name: Option<&str>,
    ) -> Result<MessagingInstance, ServiceError>;

    async fn get_qr_code(&self, instance_name: &str) -> Result<QrCode, ServiceError>;

    async fn check_connection_status(
        &self,
        instance_name: &str,
    ) -> Result<ConnectionStatus, ServiceError>;

    /// Point the instance's event delivery at `webhook_url`.
    /// `None` selects [`WebhookEvent::DEFAULTS`].
    async fn configure_webhook(
        &self,
        instance_name: &str,
        webhook_url: &str,
        events: Option<&[WebhookEvent]>,
    ) -> Result<Value, ServiceError>;

    async fn send_message(
        &self,
        instance_name: &str,
        number: &str,
        text: &str,
    ) -> Result<Value, ServiceError>;

    async fn delete_instance(&self, instance_name: &str) -> Result<(), ServiceError>;

    async fn list_instances(&self) -> Result<Value, ServiceError>;
}

/// Globally unique instance name carrying the client id.
pub fn instance_name_for(client_id: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("whatsapp_gpt_{}_{}", client_id, &suffix[..8])
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInstanceRequest<'a> {
    instance_name: &'a str,
    token: &'a str,
    qrcode: bool,
    number: &'a str,
    integration: &'a str,
}

#[derive(Serialize)]
struct WebhookRequest<'a> {
    url: &'a str,
    enabled: bool,
    events: &'a [WebhookEvent],
    webhook_by_events: bool,
}

#[derive(Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ConnectionStateResponse {
    #[serde(default)]
    instance: Option<InstanceState>,
}

#[derive(Deserialize)]
struct InstanceState {
    #[serde(default)]
    state: Option<ConnectionState>,
}

/// HTTP client for one Evolution API server.
pub struct EvolutionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EvolutionClient {
    pub fn new(config: &MessagingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.api_key)
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
}

async fn json_body(response: reqwest::Response, context: &'static str) -> Result<Value, ServiceError> {
    response.json().await.map_err(ServiceError::decode(context))
}

#[async_trait]
impl MessagingBridge for EvolutionClient {
    async fn create_instance(
        &self,
        client_id: &str,
        business_name: Option<&str>,
    ) -> Result<MessagingInstance, ServiceError> {
        const CONTEXT: &str = "Failed to create instance";

        let instance_name = instance_name_for(client_id);
        let body = CreateInstanceRequest {
            instance_name: &instance_name,
            token: &self.api_key,
            qrcode: true,
            number: "",
            integration: "WHATSAPP-BAILEYS",
        };

        let response = self
            .request(reqwest::Method::POST, "/instance/create")
            .json(&body)
            .send()
            .await
            .map_err(ServiceError::transport(CONTEXT))?;
        expect_status(response, CONTEXT, |s| s == reqwest::StatusCode::CREATED).await?;

        tracing::info!(
            instance = %instance_name,
            client_id,
            business = business_name.unwrap_or_default(),
            "messaging instance created"
        );

        let qr_code = match self.get_qr_code(&instance_name).await {
            Ok(qr) => qr.code,
            Err(e) => {
                tracing::warn!(instance = %instance_name, "QR code not available yet: {}", e);
                None
            }
        };

        Ok(MessagingInstance {
            instance_id: instance_name.clone(),
            instance_name,
            client_id: client_id.to_string(),
            status: InstanceStatus::Created,
            qr_code,
            webhook_url: None,
            created_at: Utc::now(),
        })
    }

    async fn get_qr_code(&self, instance_name: &str) -> Result<QrCode, ServiceError> {
        const CONTEXT: &str = "Failed to get QR code";

        let response = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!("/instance/connect/{}", instance_name),
                ),
                CONTEXT,
            )
            .await?;
        response.json().await.map_err(ServiceError::decode(CONTEXT))
    }

    async fn check_connection_status(
        &self,
        instance_name: &str,
    ) -> Result<ConnectionStatus, ServiceError> {
        const CONTEXT: &str = "Failed to check status";

        let response = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!("/instance/connectionState/{}", instance_name),
                ),
                CONTEXT,
            )
            .await?;
        let data = json_body(response, CONTEXT).await?;

        let status = serde_json::from_value::<ConnectionStateResponse>(data.clone())
            .ok()
            .and_then(|r| r.instance)
            .and_then(|i| i.state)
            .unwrap_or(ConnectionState::Unknown);

        Ok(ConnectionStatus { status, data })
    }

    async fn configure_webhook(
        &self,
        instance_name: &str,
        webhook_url: &str,
        events: Option<&[WebhookEvent]>,
    ) -> Result<Value, ServiceError> {
        const CONTEXT: &str = "Failed to configure webhook";

        let body = WebhookRequest {
            url: webhook_url,
            enabled: true,
            events: events.unwrap_or(&WebhookEvent::DEFAULTS),
            webhook_by_events: true,
        };
        let response = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/webhook/set/{}", instance_name),
                )
                .json(&body),
                CONTEXT,
            )
            .await?;
        json_body(response, CONTEXT).await
    }

    async fn send_message(
        &self,
        instance_name: &str,
        number: &str,
        text: &str,
    ) -> Result<Value, ServiceError> {
        const CONTEXT: &str = "Failed to send message";

        let response = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/message/sendText/{}", instance_name),
                )
                .json(&SendTextRequest { number, text }),
                CONTEXT,
            )
            .await?;
        json_body(response, CONTEXT).await
    }

    async fn delete_instance(&self, instance_name: &str) -> Result<(), ServiceError> {
        self.send(
            self.request(
                reqwest::Method::DELETE,
                &format!("/instance/delete/{}", instance_name),
            ),
            "Failed to delete instance",
        )
        .await?;
        Ok(())
    }

    async fn list_instances(&self) -> Result<Value, ServiceError> {
        const CONTEXT: &str = "Failed to list instances";

        let response = self
            .send(
                self.request(reqwest::Method::GET, "/instance/fetchInstances"),
                CONTEXT,
            )
            .await?;
        json_body(response, CONTEXT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_embeds_client_and_suffix() {
        let name = instance_name_for("abc-123");
        assert!(name.starts_with("whatsapp_gpt_abc-123_"));
        let suffix = name.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(name, instance_name_for("abc-123"));
    }
}
