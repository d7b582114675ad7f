//! Secret Manager API abstraction for testability.
//!
//! [`SecretManagerClient`] covers secret creation and version addition.
//! Production code uses [`RestSecretManagerClient`]; unit tests use
//! `MockSecretManagerClient`.
//!
//! Payload bytes travel base64-encoded in `payload.data`.

use std::future::Future;

use base64::{Engine, engine::general_purpose};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;

use cmekcheck_core::error::ApiError;
use cmekcheck_transport::RestTransport;

/// Operation name of `CreateSecret`.
pub const OP_CREATE_SECRET: &str = "secretmanager.create_secret";
/// Operation name of `AddSecretVersion`.
pub const OP_ADD_SECRET_VERSION: &str = "secretmanager.add_secret_version";

/// Secret resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    /// Full name: `projects/{p}/secrets/{id}`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<Replication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

impl Secret {
    /// Secret with automatic replication encrypted by `kms_key_name`.
    pub fn with_cmek(kms_key_name: impl Into<String>) -> Self {
        Self {
            replication: Some(Replication {
                automatic: Some(AutomaticReplication {
                    customer_managed_encryption: Some(CustomerManagedEncryption {
                        kms_key_name: kms_key_name.into(),
                    }),
                }),
            }),
            ..Default::default()
        }
    }

    /// CMEK key bound to the automatic replication policy, if any.
    pub fn cmek_key_name(&self) -> Option<&str> {
        self.replication
            .as_ref()?
            .automatic
            .as_ref()?
            .customer_managed_encryption
            .as_ref()
            .map(|c| c.kms_key_name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic: Option<AutomaticReplication>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomaticReplication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_managed_encryption: Option<CustomerManagedEncryption>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerManagedEncryption {
    pub kms_key_name: String,
}

/// Secret version resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretVersion {
    /// Full name: `{secret}/versions/{n}`
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

/// `CreateSecret` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSecretRequest {
    /// `projects/{p}`
    pub parent: String,
    pub secret_id: String,
    pub secret: Secret,
}

/// `AddSecretVersion` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSecretVersionRequest {
    /// Full secret name
    pub parent: String,
    pub payload: Bytes,
}

/// Trait abstracting the Secret Manager calls used by the workflow.
pub trait SecretManagerClient: Send + Sync + 'static {
    /// Creates a secret.
    fn create_secret(
        &self,
        request: CreateSecretRequest,
    ) -> impl Future<Output = Result<Secret, ApiError>> + Send;

    /// Appends a version carrying `payload` to an existing secret.
    fn add_secret_version(
        &self,
        request: AddSecretVersionRequest,
    ) -> impl Future<Output = Result<SecretVersion, ApiError>> + Send;
}

/// Production Secret Manager client speaking the REST v1 API.
#[derive(Debug, Clone)]
pub struct RestSecretManagerClient {
    transport: RestTransport,
    endpoint: String,
}

impl RestSecretManagerClient {
    /// Creates a client for `endpoint` (e.g. `https://secretmanager.googleapis.com`).
    pub fn new(transport: RestTransport, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
        }
    }
}

impl SecretManagerClient for RestSecretManagerClient {
    async fn create_secret(&self, request: CreateSecretRequest) -> Result<Secret, ApiError> {
        let url = format!(
            "{}/v1/{}/secrets?secretId={}",
            self.endpoint, request.parent, request.secret_id
        );
        self.transport
            .post_json(&url, &request.secret)
            .await
            .map_err(|e| e.into_api_error(OP_CREATE_SECRET))
    }

    async fn add_secret_version(
        &self,
        request: AddSecretVersionRequest,
    ) -> Result<SecretVersion, ApiError> {
        let url = format!("{}/v1/{}:addVersion", self.endpoint, request.parent);
        let body = json!({
            "payload": { "data": general_purpose::STANDARD.encode(&request.payload) }
        });
        self.transport
            .post_json(&url, &body)
            .await
            .map_err(|e| e.into_api_error(OP_ADD_SECRET_VERSION))
    }
}

/// 테스트용 Mock Secret Manager 클라이언트
#[cfg(test)]
#[derive(Default)]
pub struct MockSecretManagerClient {
    /// 시크릿 생성 에러
    secret_error: Option<ApiError>,
    /// 버전 추가 에러
    version_error: Option<ApiError>,
    /// 응답에 echo할 CMEK 키 (None이면 요청 값을 그대로 echo)
    echoed_key: Option<String>,
    /// 받은 시크릿 요청
    pub secret_requests: std::sync::Mutex<Vec<CreateSecretRequest>>,
    /// 받은 버전 요청
    pub version_requests: std::sync::Mutex<Vec<AddSecretVersionRequest>>,
}

#[cfg(test)]
impl MockSecretManagerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret_error(mut self, error: ApiError) -> Self {
        self.secret_error = Some(error);
        self
    }

    pub fn with_version_error(mut self, error: ApiError) -> Self {
        self.version_error = Some(error);
        self
    }

    /// 응답의 CMEK 키를 요청과 다른 값으로 바꿉니다.
    pub fn with_echoed_key(mut self, key: impl Into<String>) -> Self {
        self.echoed_key = Some(key.into());
        self
    }

    pub fn secret_calls(&self) -> usize {
        self.secret_requests.lock().unwrap().len()
    }

    pub fn version_calls(&self) -> usize {
        self.version_requests.lock().unwrap().len()
    }
}

#[cfg(test)]
impl SecretManagerClient for MockSecretManagerClient {
    async fn create_secret(&self, request: CreateSecretRequest) -> Result<Secret, ApiError> {
        self.secret_requests.lock().unwrap().push(request.clone());
        if let Some(err) = &self.secret_error {
            return Err(err.clone());
        }

        let mut secret = match &self.echoed_key {
            Some(key) => Secret::with_cmek(key.clone()),
            None => request.secret.clone(),
        };
        secret.name = format!("{}/secrets/{}", request.parent, request.secret_id);
        Ok(secret)
    }

    async fn add_secret_version(
        &self,
        request: AddSecretVersionRequest,
    ) -> Result<SecretVersion, ApiError> {
        self.version_requests.lock().unwrap().push(request.clone());
        if let Some(err) = &self.version_error {
            return Err(err.clone());
        }
        Ok(SecretVersion {
            name: format!("{}/versions/1", request.parent),
            state: Some("ENABLED".to_owned()),
            create_time: None,
        })
    }
}
