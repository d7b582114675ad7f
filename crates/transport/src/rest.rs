//! Google REST JSON transport.
//!
//! [`RestTransport`] sends authenticated JSON `POST` requests and normalizes
//! failures into [`TransportError`] with a classified [`StatusCode`].
//!
//! # Error classification
//!
//! - Error envelope `{"error": {"code", "message", "status"}}`: the `status`
//!   string wins when it names a known code.
//! - Otherwise the HTTP status is mapped with [`StatusCode::from_http`].
//! - Send failures map to `DEADLINE_EXCEEDED` (timeout) or `UNAVAILABLE`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use cmekcheck_core::status::StatusCode;

use crate::auth::Credentials;
use crate::error::TransportError;

/// Authenticated JSON transport shared by the service clients.
#[derive(Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    credentials: Arc<Credentials>,
}

impl RestTransport {
    /// Builds a transport whose requests time out after `request_timeout`.
    pub fn new(credentials: Credentials, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = build_client(request_timeout)?;
        Ok(Self::with_client(client, credentials))
    }

    /// Builds a transport on top of an existing client.
    pub fn with_client(client: reqwest::Client, credentials: Credentials) -> Self {
        Self {
            client,
            credentials: Arc::new(credentials),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Sends `body` as JSON and decodes the JSON response.
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.credentials.token().await?;

        debug!(url, "POST");
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::from_send(url, &e))?;

        decode_response(url, response).await
    }
}

impl std::fmt::Debug for RestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestTransport")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

/// Creates a `reqwest` client with a per-request timeout.
pub fn build_client(request_timeout: Duration) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .user_agent(concat!("cmekcheck/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TransportError::ClientBuild(e.to_string()))
}

/// Decodes a successful response or converts an error response.
pub(crate) async fn decode_response<T: DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| TransportError::from_send(url, &e))?;

    if !status.is_success() {
        let (code, message) = classify_error(status.as_u16(), &text);
        debug!(url, http_status = status.as_u16(), %code, "error response");
        return Err(TransportError::Status {
            url: url.to_owned(),
            http_status: status.as_u16(),
            code,
            message,
        });
    }

    serde_json::from_str(&text).map_err(|e| TransportError::Decode {
        url: url.to_owned(),
        reason: e.to_string(),
    })
}

/// Classifies an error response body into a status code and message.
pub fn classify_error(http_status: u16, body: &str) -> (StatusCode, String) {
    let fallback = StatusCode::from_http(http_status);

    let Ok(envelope) = serde_json::from_str::<Value>(body) else {
        let message = if body.trim().is_empty() {
            format!("status code {http_status}")
        } else {
            body.trim().to_owned()
        };
        return (fallback, message);
    };

    let err = &envelope["error"];
    let code = err["status"]
        .as_str()
        .and_then(|s| s.parse::<StatusCode>().ok())
        .unwrap_or(fallback);
    let message = err["message"]
        .as_str()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("status code {http_status}"));
    (code, message)
}
