//! Credentials for Google API calls.
//!
//! Production runs impersonate a service account: a source token from
//! Application Default Credentials is exchanged for a short-lived token of the
//! target account through the IAM Credentials `generateAccessToken` method.
//!
//! While the caller's token-creator grant has not propagated, the exchange is
//! rejected with HTTP 401/403. That rejection is classified as
//! [`StatusCode::Unauthenticated`] so the retry policy can wait it out.
//! Only successful exchanges are cached, so every retry performs a fresh one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use cmekcheck_core::status::{HasStatusCode, StatusCode};

use crate::error::TransportError;
use crate::rest::decode_response;

/// OAuth scope requested for every token.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Bearer credentials attached to every request.
pub enum Credentials {
    /// Fixed token, used as-is.
    Static(String),
    /// Token minted for an impersonated service account.
    Impersonated(ImpersonatedCredentials),
}

impl Credentials {
    /// Returns a bearer token.
    pub async fn token(&self) -> Result<String, TransportError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Impersonated(creds) => creds.token().await,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Credentials::Static(..)"),
            Self::Impersonated(creds) => f
                .debug_tuple("Credentials::Impersonated")
                .field(&creds.target)
                .finish(),
        }
    }
}

/// Token used to call the IAM Credentials API itself.
#[derive(Clone)]
pub enum SourceToken {
    /// Application Default Credentials.
    Adc(Arc<dyn gcp_auth::TokenProvider>),
    /// Fixed token.
    Static(String),
}

impl SourceToken {
    /// Resolves Application Default Credentials.
    pub async fn adc() -> Result<Self, TransportError> {
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| TransportError::SourceCredentials(e.to_string()))?;
        Ok(Self::Adc(provider))
    }

    async fn token(&self) -> Result<String, TransportError> {
        match self {
            Self::Adc(provider) => {
                let token = provider
                    .token(&[CLOUD_PLATFORM_SCOPE])
                    .await
                    .map_err(|e| TransportError::SourceCredentials(e.to_string()))?;
                Ok(token.as_str().to_owned())
            }
            Self::Static(token) => Ok(token.clone()),
        }
    }
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
    #[serde(default)]
    expire_time: Option<String>,
}

/// Credentials of an impersonated service account.
pub struct ImpersonatedCredentials {
    target: String,
    source: SourceToken,
    iam_endpoint: String,
    client: reqwest::Client,
    lifetime: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl ImpersonatedCredentials {
    pub fn new(
        source: SourceToken,
        target: impl Into<String>,
        iam_endpoint: impl Into<String>,
        client: reqwest::Client,
        lifetime: Duration,
    ) -> Self {
        Self {
            target: target.into(),
            source,
            iam_endpoint: iam_endpoint.into().trim_end_matches('/').to_owned(),
            client,
            lifetime,
            cached: Mutex::new(None),
        }
    }

    /// Impersonated service account email.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns a cached token or mints a new one.
    pub async fn token(&self) -> Result<String, TransportError> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.refresh_at {
                return Ok(entry.token.clone());
            }
        }

        let token = self.generate().await?;
        let refresh_at = Instant::now() + self.lifetime.saturating_sub(REFRESH_MARGIN);
        *cached = Some(CachedToken {
            token: token.clone(),
            refresh_at,
        });
        Ok(token)
    }

    async fn generate(&self) -> Result<String, TransportError> {
        let source = self.source.token().await?;
        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{}:generateAccessToken",
            self.iam_endpoint, self.target
        );
        let body = json!({
            "scope": [CLOUD_PLATFORM_SCOPE],
            "lifetime": format!("{}s", self.lifetime.as_secs()),
        });

        debug!(target_account = %self.target, "requesting impersonated token");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&source)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.impersonation_error(TransportError::from_send(&url, &e)))?;

        let parsed: GenerateAccessTokenResponse = decode_response(&url, response)
            .await
            .map_err(|e| self.impersonation_error(e))?;

        info!(
            target_account = %self.target,
            expire_time = parsed.expire_time.as_deref().unwrap_or("unknown"),
            "impersonated token issued"
        );
        Ok(parsed.access_token)
    }

    fn impersonation_error(&self, err: TransportError) -> TransportError {
        let (code, message) = match &err {
            TransportError::Status {
                http_status,
                message,
                ..
            } if matches!(http_status, 401 | 403) => (
                StatusCode::Unauthenticated,
                format!("status code {http_status}: {message}"),
            ),
            TransportError::Status {
                http_status,
                code,
                message,
                ..
            } => (*code, format!("status code {http_status}: {message}")),
            other => (other.status_code(), other.to_string()),
        };
        TransportError::Impersonation {
            target: self.target.clone(),
            code,
            message,
        }
    }
}

impl fmt::Debug for ImpersonatedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpersonatedCredentials")
            .field("target", &self.target)
            .field("iam_endpoint", &self.iam_endpoint)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
