//! Error types for the service clients and the setup pipeline.
//!
//! Every expected failure of an external call is a [`ServiceError`]. Routes
//! render it as `{ "success": false, "error": "<message>" }` instead of
//! letting it escape as a fault.

/// Failure of a single external-service operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The remote service answered with a status the operation does not accept.
    #[error("{context}: HTTP {status}: {body}")]
    Status {
        context: &'static str,
        status: u16,
        body: String,
    },

    /// The request never produced a response (DNS, connect, TLS, body read).
    #[error("{context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The response arrived but did not have the expected shape.
    #[error("{context}: unexpected response: {message}")]
    Decode {
        context: &'static str,
        message: String,
    },

    #[error("Vector store not initialized")]
    NotInitialized,

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Could not extract text from file: {0}")]
    Extraction(String),

    #[error("Invalid workflow template: {0}")]
    Template(String),
}

impl ServiceError {
    pub(crate) fn transport(context: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| ServiceError::Transport { context, source }
    }

    pub(crate) fn decode(context: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |e| ServiceError::Decode {
            context,
            message: e.to_string(),
        }
    }
}

/// Hard failure of the agent-setup pipeline.
///
/// Only the two mandatory steps can abort setup. Side effects of steps that
/// already ran are left in place.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Failed to create WhatsApp instance: {0}")]
    Instance(#[source] ServiceError),

    #[error("Failed to create workflow: {0}")]
    Workflow(#[source] ServiceError),
}

/// Checks the status of a response and hands it back when accepted.
///
/// Non-accepted responses are drained into a [`ServiceError::Status`] so the
/// remote error body reaches the caller.
pub(crate) async fn expect_status(
    response: reqwest::Response,
    context: &'static str,
    accept: impl Fn(reqwest::StatusCode) -> bool,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if accept(status) {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        context,
        status: status.as_u16(),
        body,
    })
}

/// [`expect_status`] for the common case of any 2xx status.
pub(crate) async fn expect_success(
    response: reqwest::Response,
    context: &'static str,
) -> Result<reqwest::Response, ServiceError> {
    expect_status(response, context, |s| s.is_success()).await
}
