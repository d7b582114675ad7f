//! Cloud KMS API abstraction for testability.
//!
//! The [`KeyManagementClient`] trait covers the two KMS calls the workflow
//! makes. Production code uses [`RestKmsClient`] while unit tests use
//! `MockKmsClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ KeyHierarchyProvisioner  │
//! └────────────┬─────────────┘
//!              │
//!              ▼
//!   ┌─────────────────────┐
//!   │ KeyManagementClient │ (trait)
//!   └─────────────────────┘
//!        │           │
//!        ▼           ▼
//!   ┌─────────┐  ┌──────┐
//!   │  Rest   │  │ Mock │
//!   └────┬────┘  └──────┘
//!        │
//!        ▼
//!   cloudkms.googleapis.com
//! ```
//!
//! # Errors
//!
//! Every failure is an [`ApiError`] whose `operation` is one of
//! [`OP_CREATE_KEY_RING`] or [`OP_CREATE_CRYPTO_KEY`].

use std::future::Future;

use serde::{Deserialize, Serialize};

use cmekcheck_core::error::ApiError;
use cmekcheck_transport::RestTransport;

/// Operation name of `CreateKeyRing`.
pub const OP_CREATE_KEY_RING: &str = "kms.create_key_ring";
/// Operation name of `CreateCryptoKey`.
pub const OP_CREATE_CRYPTO_KEY: &str = "kms.create_crypto_key";

/// Crypto key purpose for symmetric encryption.
pub const PURPOSE_ENCRYPT_DECRYPT: &str = "ENCRYPT_DECRYPT";

/// KMS key ring resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRing {
    /// Full name: `projects/{p}/locations/{l}/keyRings/{id}`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

/// KMS crypto key resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoKey {
    /// Full name: `{keyRing}/cryptoKeys/{id}`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub purpose: String,
    /// Primary version, present once an initial version exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<CryptoKeyVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

/// KMS crypto key version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoKeyVersion {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// `CreateKeyRing` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateKeyRingRequest {
    /// `projects/{p}/locations/{l}`
    pub parent: String,
    pub key_ring_id: String,
    pub key_ring: KeyRing,
}

/// `CreateCryptoKey` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCryptoKeyRequest {
    /// Full key ring name
    pub parent: String,
    pub crypto_key_id: String,
    pub crypto_key: CryptoKey,
    /// When `false`, KMS creates and activates an initial version.
    pub skip_initial_version_creation: bool,
}

/// Trait abstracting the Cloud KMS calls used by the workflow.
///
/// The trait is `Send + Sync + 'static`, allowing the client to be shared as
/// `Arc<K>` across async contexts.
pub trait KeyManagementClient: Send + Sync + 'static {
    /// Creates a key ring.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`]. A not-yet-propagated impersonation
    /// grant surfaces as `UNAUTHENTICATED`.
    fn create_key_ring(
        &self,
        request: CreateKeyRingRequest,
    ) -> impl Future<Output = Result<KeyRing, ApiError>> + Send;

    /// Creates a crypto key inside an existing key ring.
    fn create_crypto_key(
        &self,
        request: CreateCryptoKeyRequest,
    ) -> impl Future<Output = Result<CryptoKey, ApiError>> + Send;
}

/// Production KMS client speaking the REST v1 API.
#[derive(Debug, Clone)]
pub struct RestKmsClient {
    transport: RestTransport,
    endpoint: String,
}

impl RestKmsClient {
    /// Creates a client for `endpoint` (e.g. `https://cloudkms.googleapis.com`).
    pub fn new(transport: RestTransport, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
        }
    }
}

impl KeyManagementClient for RestKmsClient {
    async fn create_key_ring(&self, request: CreateKeyRingRequest) -> Result<KeyRing, ApiError> {
        let url = format!(
            "{}/v1/{}/keyRings?keyRingId={}",
            self.endpoint, request.parent, request.key_ring_id
        );
        self.transport
            .post_json(&url, &request.key_ring)
            .await
            .map_err(|e| e.into_api_error(OP_CREATE_KEY_RING))
    }

    async fn create_crypto_key(
        &self,
        request: CreateCryptoKeyRequest,
    ) -> Result<CryptoKey, ApiError> {
        let url = format!(
            "{}/v1/{}/cryptoKeys?cryptoKeyId={}&skipInitialVersionCreation={}",
            self.endpoint,
            request.parent,
            request.crypto_key_id,
            request.skip_initial_version_creation
        );
        self.transport
            .post_json(&url, &request.crypto_key)
            .await
            .map_err(|e| e.into_api_error(OP_CREATE_CRYPTO_KEY))
    }
}

/// 테스트용 Mock KMS 클라이언트
///
/// 키 링 생성 실패 시퀀스와 호출 기록을 설정할 수 있습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockKmsClient {
    /// 성공 전에 순서대로 반환할 키 링 에러
    key_ring_failures: std::sync::Mutex<std::collections::VecDeque<ApiError>>,
    /// 매 호출마다 반환할 키 링 에러
    key_ring_error: Option<ApiError>,
    /// 암호화 키 생성 에러
    crypto_key_error: Option<ApiError>,
    /// 응답에서 name을 비울지 여부
    omit_names: bool,
    /// 받은 키 링 요청
    pub key_ring_requests: std::sync::Mutex<Vec<CreateKeyRingRequest>>,
    /// 받은 암호화 키 요청
    pub crypto_key_requests: std::sync::Mutex<Vec<CreateCryptoKeyRequest>>,
}

#[cfg(test)]
impl MockKmsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 처음 N번의 키 링 호출이 주어진 에러로 실패하도록 설정합니다.
    pub fn with_key_ring_failures(self, errors: Vec<ApiError>) -> Self {
        *self.key_ring_failures.lock().unwrap() = errors.into();
        self
    }

    /// 키 링 호출이 항상 실패하도록 설정합니다.
    pub fn with_key_ring_error(mut self, error: ApiError) -> Self {
        self.key_ring_error = Some(error);
        self
    }

    /// 암호화 키 호출이 실패하도록 설정합니다.
    pub fn with_crypto_key_error(mut self, error: ApiError) -> Self {
        self.crypto_key_error = Some(error);
        self
    }

    /// 응답에서 name 필드를 생략합니다.
    pub fn with_missing_names(mut self) -> Self {
        self.omit_names = true;
        self
    }

    pub fn key_ring_calls(&self) -> usize {
        self.key_ring_requests.lock().unwrap().len()
    }

    pub fn crypto_key_calls(&self) -> usize {
        self.crypto_key_requests.lock().unwrap().len()
    }
}

#[cfg(test)]
impl KeyManagementClient for MockKmsClient {
    async fn create_key_ring(&self, request: CreateKeyRingRequest) -> Result<KeyRing, ApiError> {
        self.key_ring_requests.lock().unwrap().push(request.clone());

        if let Some(err) = self.key_ring_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(err) = &self.key_ring_error {
            return Err(err.clone());
        }

        let name = if self.omit_names {
            String::new()
        } else {
            format!("{}/keyRings/{}", request.parent, request.key_ring_id)
        };
        Ok(KeyRing {
            name,
            create_time: Some("2026-01-01T00:00:00Z".to_owned()),
        })
    }

    async fn create_crypto_key(
        &self,
        request: CreateCryptoKeyRequest,
    ) -> Result<CryptoKey, ApiError> {
        self.crypto_key_requests.lock().unwrap().push(request.clone());

        if let Some(err) = &self.crypto_key_error {
            return Err(err.clone());
        }

        let name = if self.omit_names {
            String::new()
        } else {
            format!("{}/cryptoKeys/{}", request.parent, request.crypto_key_id)
        };
        let primary = (!request.skip_initial_version_creation).then(|| CryptoKeyVersion {
            name: format!("{name}/cryptoKeyVersions/1"),
            state: Some("ENABLED".to_owned()),
        });
        Ok(CryptoKey {
            name,
            purpose: request.crypto_key.purpose,
            primary,
            create_time: Some("2026-01-01T00:00:01Z".to_owned()),
        })
    }
}
