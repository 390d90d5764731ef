//! HTTP JSON API.
//!
//! Exposes agent setup and thin proxies over the three services. All routes
//! are nested under `[server].route_prefix` (default `/api/whatsapp-gpt`).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/setup-whatsapp-agent` | Provision instance, workflow and knowledge |
//! | `GET`  | `/check-connection/{instance_id}` | WhatsApp connection state |
//! | `GET`  | `/get-qr-code/{instance_id}` | Pairing QR code |
//! | `POST` | `/add-knowledge` | Ingest text for a client |
//! | `POST` | `/query-knowledge` | Similarity search in a client's knowledge |
//! | `GET`  | `/workflow-status/{workflow_id}` | Workflow details |
//! | `POST` | `/send-test-message` | Send a WhatsApp text |
//! | `GET`  | `/client-stats/{client_id}` | Knowledge-base stats |
//! | `GET`  | `/health` | Liveness (returns version) |
//!
//! # Response Contract
//!
//! Every body is a JSON object with a `success` flag:
//!
//! ```json
//! { "success": false, "error": "client_id and content are required" }
//! ```
//!
//! Missing fields and malformed JSON are `400`. A failed setup or a panicking
//! handler is `500`. A failed call to an external service is passed through
//! as `200` with `success: false`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser setup form
//! can be served from anywhere.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::ServiceError;
use crate::knowledge::{KnowledgeBase, DEFAULT_TOP_K};
use crate::messaging::{EvolutionClient, MessagingBridge};
use crate::models::{BusinessProfile, Metadata};
use crate::setup::SetupOrchestrator;
use crate::workflow::{N8nClient, WorkflowEngine};

const DEFAULT_TEST_MESSAGE: &str = "Olá! Este é um teste do seu agente WhatsApp GPT. 🤖";

/// Shared service handles, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub messaging: Arc<dyn MessagingBridge>,
    pub workflows: Arc<dyn WorkflowEngine>,
    pub knowledge: Arc<KnowledgeBase>,
    setup: Arc<SetupOrchestrator>,
}

impl AppState {
    pub fn new(
        messaging: Arc<dyn MessagingBridge>,
        workflows: Arc<dyn WorkflowEngine>,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        let setup = Arc::new(SetupOrchestrator::new(
            messaging.clone(),
            workflows.clone(),
            knowledge.clone(),
        ));
        Self {
            messaging,
            workflows,
            knowledge,
            setup,
        }
    }

    /// Construct the production clients from configuration.
    pub async fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(EvolutionClient::new(&config.messaging)),
            Arc::new(N8nClient::new(&config.workflow)),
            Arc::new(KnowledgeBase::from_config(config).await),
        )
    }
}

/// Starts the HTTP server on `[server].bind` and runs until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await;
    let app = router(state, &config.server.route_prefix);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        "WhatsApp GPT API listening on http://{}{}",
        config.server.bind,
        config.server.route_prefix
    );
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router with every route nested under `prefix`.
pub fn router(state: AppState, prefix: &str) -> Router {
    let api = Router::new()
        .route("/setup-whatsapp-agent", post(handle_setup))
        .route("/check-connection/{instance_id}", get(handle_check_connection))
        .route("/get-qr-code/{instance_id}", get(handle_get_qr_code))
        .route("/add-knowledge", post(handle_add_knowledge))
        .route("/query-knowledge", post(handle_query_knowledge))
        .route("/workflow-status/{workflow_id}", get(handle_workflow_status))
        .route("/send-test-message", post(handle_send_test_message))
        .route("/client-stats/{client_id}", get(handle_client_stats))
        .route("/health", get(handle_health))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let prefix = prefix.trim_matches('/');
    let app = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(&format!("/{}", prefix), api)
    };

    app.layer(CatchPanicLayer::custom(handle_panic)).layer(cors)
}

// ============ Responses ============

/// Error that renders as `{ "success": false, "error": ... }`.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("request handler panicked: {}", detail);
    internal(format!("Internal error: {}", detail)).into_response()
}

fn failure_body(error: impl ToString) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

/// Render a service outcome with `success` merged into the payload's fields.
fn passthrough<T: Serialize>(result: Result<T, ServiceError>) -> Value {
    let payload = match result {
        Ok(payload) => payload,
        Err(e) => return failure_body(e),
    };
    match serde_json::to_value(payload) {
        Ok(Value::Object(mut fields)) => {
            fields.insert("success".into(), true.into());
            Value::Object(fields)
        }
        Ok(other) => json!({ "success": true, "data": other }),
        Err(e) => failure_body(e),
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| bad_request(format!("Invalid JSON body: {}", rejection.body_text())))
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

// ============ POST /setup-whatsapp-agent ============

async fn handle_setup(
    State(state): State<AppState>,
    payload: Result<Json<BusinessProfile>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let profile = json_body(payload)?;
    let setup = state
        .setup
        .setup_agent(&profile)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "data": setup,
        "message": "WhatsApp GPT agent setup completed successfully",
    })))
}

// ============ GET /check-connection, /get-qr-code ============

async fn handle_check_connection(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Json<Value> {
    Json(passthrough(
        state.messaging.check_connection_status(&instance_id).await,
    ))
}

async fn handle_get_qr_code(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Json<Value> {
    let result = state
        .messaging
        .get_qr_code(&instance_id)
        .await
        .map(|qrcode| json!({ "qrcode": qrcode }));
    Json(passthrough(result))
}

// ============ POST /add-knowledge ============

#[derive(Deserialize)]
struct AddKnowledgeRequest {
    client_id: Option<String>,
    content: Option<String>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

async fn handle_add_knowledge(
    State(state): State<AppState>,
    payload: Result<Json<AddKnowledgeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = json_body(payload)?;
    let (Some(client_id), Some(content)) = (present(&req.client_id), present(&req.content)) else {
        return Err(bad_request("client_id and content are required"));
    };

    let result = state
        .knowledge
        .process_text_content(client_id, content, req.metadata.clone().unwrap_or_default())
        .await
        .map(|report| {
            json!({
                "chunks_processed": report.chunks_processed,
                "namespace": report.namespace,
                "message": "Text content processed successfully",
            })
        });
    Ok(Json(passthrough(result)))
}

// ============ POST /query-knowledge ============

#[derive(Deserialize)]
struct QueryKnowledgeRequest {
    client_id: Option<String>,
    query: Option<String>,
    top_k: Option<i64>,
}

async fn handle_query_knowledge(
    State(state): State<AppState>,
    payload: Result<Json<QueryKnowledgeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = json_body(payload)?;
    let (Some(client_id), Some(query)) = (present(&req.client_id), present(&req.query)) else {
        return Err(bad_request("client_id and query are required"));
    };
    let top_k = match req.top_k {
        None => DEFAULT_TOP_K,
        Some(k) if k >= 1 => k as usize,
        Some(_) => return Err(bad_request("top_k must be a positive integer")),
    };

    Ok(Json(passthrough(
        state
            .knowledge
            .query_knowledge_base(client_id, query, top_k)
            .await,
    )))
}

// ============ GET /workflow-status ============

async fn handle_workflow_status(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Json<Value> {
    Json(passthrough(
        state.workflows.get_workflow_status(&workflow_id).await,
    ))
}

// ============ POST /send-test-message ============

#[derive(Deserialize)]
struct SendTestMessageRequest {
    instance_id: Option<String>,
    number: Option<String>,
    message: Option<String>,
}

async fn handle_send_test_message(
    State(state): State<AppState>,
    payload: Result<Json<SendTestMessageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = json_body(payload)?;
    let (Some(instance_id), Some(number)) = (present(&req.instance_id), present(&req.number))
    else {
        return Err(bad_request("instance_id and number are required"));
    };
    let text = req.message.as_deref().unwrap_or(DEFAULT_TEST_MESSAGE);

    let result = state
        .messaging
        .send_message(instance_id, number, text)
        .await
        .map(|data| json!({ "message": "Message sent successfully", "data": data }));
    Ok(Json(passthrough(result)))
}

// ============ GET /client-stats ============

async fn handle_client_stats(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Json<Value> {
    let knowledge_base = passthrough(state.knowledge.get_client_stats(&client_id).await);
    let mut stats = Map::new();
    stats.insert("knowledge_base".into(), knowledge_base);
    stats.insert("client_id".into(), client_id.into());
    stats.insert("last_updated".into(), Utc::now().to_rfc3339().into());

    Json(json!({ "success": true, "stats": stats }))
}

// ============ GET /health ============

async fn handle_health() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "WhatsApp GPT API is running",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
