//! 키 계층 프로비저너 -- 키 링과 ENCRYPT_DECRYPT 암호화 키 생성
//!
//! 1. `projects/{p}/locations/{l}` 아래에 무작위 ID의 키 링을 생성합니다.
//!    방금 부여된 가장 권한이 아직 전파되지 않았을 수 있으므로 이 호출만
//!    [`RetryingInvoker`]로 감쌉니다.
//! 2. 생성된 키 링 안에 초기 버전이 활성화된 암호화 키를 생성합니다.
//!    재시도하지 않습니다.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use cmekcheck_core::config::RetryConfig;
use cmekcheck_core::error::{CmekCheckError, ProvisionError};
use cmekcheck_core::metrics as m;
use cmekcheck_core::naming::{IdGenerator, ResourceKind, validate_resource_id};
use cmekcheck_core::pipeline::Stage;
use cmekcheck_core::retry::{RetryPolicy, RetryingInvoker};
use cmekcheck_core::types::IdentityContext;

use crate::error::KeyHierarchyError;
use crate::kms::{
    CreateCryptoKeyRequest, CreateKeyRingRequest, CryptoKey, KeyManagementClient, KeyRing,
    OP_CREATE_KEY_RING, PURPOSE_ENCRYPT_DECRYPT,
};

/// 생성된 키 계층
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyHierarchy {
    pub key_ring: KeyRing,
    pub crypto_key: CryptoKey,
}

/// 키 계층 프로비저너
pub struct KeyHierarchyProvisioner<K: KeyManagementClient> {
    kms: Arc<K>,
    identity: IdentityContext,
    location: String,
    retry: RetryConfig,
    ids: Arc<dyn IdGenerator>,
}

impl<K: KeyManagementClient> KeyHierarchyProvisioner<K> {
    /// 새 프로비저너를 생성합니다.
    ///
    /// # Arguments
    /// - `kms`: KMS 클라이언트
    /// - `identity`: 대상 프로젝트와 가장 계정
    /// - `location`: 키 링 위치 (예: `"global"`)
    /// - `retry`: 키 링 생성 재시도 설정
    /// - `ids`: 리소스 ID 생성기
    pub fn new(
        kms: Arc<K>,
        identity: IdentityContext,
        location: impl Into<String>,
        retry: RetryConfig,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            kms,
            identity,
            location: location.into(),
            retry,
            ids,
        }
    }

    /// 키 링과 암호화 키를 순서대로 생성합니다.
    pub async fn provision(&self) -> Result<KeyHierarchy, KeyHierarchyError> {
        let key_ring = self.create_key_ring().await?;
        let crypto_key = self.create_crypto_key(&key_ring).await?;
        Ok(KeyHierarchy {
            key_ring,
            crypto_key,
        })
    }

    /// 키 링을 생성합니다. 설정된 일시적 에러는 데드라인까지 재시도합니다.
    pub async fn create_key_ring(&self) -> Result<KeyRing, KeyHierarchyError> {
        let key_ring_id = self.ids.generate(ResourceKind::KeyRing);
        validate_resource_id(&key_ring_id)?;

        let request = CreateKeyRingRequest {
            parent: self.identity.location_parent(&self.location),
            key_ring_id,
            key_ring: KeyRing::default(),
        };

        // 데드라인은 이 단계의 시작 시점 기준
        let deadline = Instant::now() + self.retry.deadline();
        let policy = RetryPolicy::on_code(self.retry.transient_code, self.retry.backoff(), deadline);
        let invoker = RetryingInvoker::new(policy);

        let kms = &self.kms;
        let key_ring = invoker
            .invoke(OP_CREATE_KEY_RING, || {
                let request = request.clone();
                async move { kms.create_key_ring(request).await }
            })
            .await?;

        if key_ring.name.is_empty() {
            return Err(ProvisionError::MissingField {
                resource: "key ring",
                field: "name",
            }
            .into());
        }

        info!(
            key_ring = key_ring.name.as_str(),
            location = self.location.as_str(),
            "key ring created"
        );
        metrics::counter!(m::RESOURCES_CREATED_TOTAL, m::LABEL_KIND => ResourceKind::KeyRing.as_str())
            .increment(1);

        Ok(key_ring)
    }

    /// 키 링 안에 ENCRYPT_DECRYPT 암호화 키를 생성합니다 (재시도 없음).
    pub async fn create_crypto_key(
        &self,
        key_ring: &KeyRing,
    ) -> Result<CryptoKey, KeyHierarchyError> {
        let crypto_key_id = self.ids.generate(ResourceKind::CryptoKey);
        validate_resource_id(&crypto_key_id)?;

        let request = CreateCryptoKeyRequest {
            parent: key_ring.name.clone(),
            crypto_key_id,
            crypto_key: CryptoKey {
                purpose: PURPOSE_ENCRYPT_DECRYPT.to_owned(),
                ..Default::default()
            },
            skip_initial_version_creation: false,
        };

        let crypto_key = self.kms.create_crypto_key(request).await?;

        if crypto_key.name.is_empty() {
            return Err(ProvisionError::MissingField {
                resource: "crypto key",
                field: "name",
            }
            .into());
        }

        info!(
            crypto_key = crypto_key.name.as_str(),
            primary_version = crypto_key
                .primary
                .as_ref()
                .map(|v| v.name.as_str())
                .unwrap_or("none"),
            "crypto key created"
        );
        metrics::counter!(m::RESOURCES_CREATED_TOTAL, m::LABEL_KIND => ResourceKind::CryptoKey.as_str())
            .increment(1);

        Ok(crypto_key)
    }
}

impl<K: KeyManagementClient> Stage<()> for KeyHierarchyProvisioner<K> {
    type Output = KeyHierarchy;

    fn name(&self) -> &str {
        "key-hierarchy"
    }

    async fn run(&self, _input: ()) -> Result<KeyHierarchy, CmekCheckError> {
        Ok(self.provision().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cmekcheck_core::error::ApiError;
    use cmekcheck_core::status::StatusCode;

    use crate::kms::{MockKmsClient, OP_CREATE_CRYPTO_KEY};

    struct FixedIds;

    impl IdGenerator for FixedIds {
        fn generate(&self, kind: ResourceKind) -> String {
            match kind {
                ResourceKind::KeyRing => "kr-abc123",
                ResourceKind::CryptoKey => "key-xyz789",
                ResourceKind::Secret => "sec-qqq111",
            }
            .to_owned()
        }
    }

    struct BadIds;

    impl IdGenerator for BadIds {
        fn generate(&self, _kind: ResourceKind) -> String {
            "Not_Valid".to_owned()
        }
    }

    fn lag() -> ApiError {
        ApiError::new(
            StatusCode::Unauthenticated,
            OP_CREATE_KEY_RING,
            "transport: impersonate: status code 403",
        )
    }

    fn identity() -> IdentityContext {
        IdentityContext::new("test-proj", "tester@test-proj.iam.gserviceaccount.com").unwrap()
    }

    fn provisioner(
        kms: Arc<MockKmsClient>,
        retry: RetryConfig,
    ) -> KeyHierarchyProvisioner<MockKmsClient> {
        KeyHierarchyProvisioner::new(kms, identity(), "global", retry, Arc::new(FixedIds))
    }

    fn short_deadline() -> RetryConfig {
        RetryConfig {
            deadline_secs: 2,
            ..RetryConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn provisions_key_ring_and_crypto_key() {
        let kms = Arc::new(MockKmsClient::new());
        let hierarchy = provisioner(kms.clone(), RetryConfig::default())
            .provision()
            .await
            .unwrap();

        assert_eq!(
            hierarchy.key_ring.name,
            "projects/test-proj/locations/global/keyRings/kr-abc123"
        );
        assert_eq!(
            hierarchy.crypto_key.name,
            "projects/test-proj/locations/global/keyRings/kr-abc123/cryptoKeys/key-xyz789"
        );
        assert_eq!(hierarchy.crypto_key.purpose, "ENCRYPT_DECRYPT");
        assert!(hierarchy.crypto_key.primary.is_some());

        let ring_requests = kms.key_ring_requests.lock().unwrap();
        assert_eq!(ring_requests[0].parent, "projects/test-proj/locations/global");
        assert_eq!(ring_requests[0].key_ring_id, "kr-abc123");

        let key_requests = kms.crypto_key_requests.lock().unwrap();
        assert_eq!(key_requests[0].parent, hierarchy.key_ring.name);
        assert!(!key_requests[0].skip_initial_version_creation);
        assert_eq!(key_requests[0].crypto_key.purpose, PURPOSE_ENCRYPT_DECRYPT);
    }

    #[tokio::test(start_paused = true)]
    async fn key_ring_in_custom_location() {
        let kms = Arc::new(MockKmsClient::new());
        let provisioner = KeyHierarchyProvisioner::new(
            kms,
            identity(),
            "europe-west1",
            RetryConfig::default(),
            Arc::new(FixedIds),
        );
        let ring = provisioner.create_key_ring().await.unwrap();
        assert_eq!(
            ring.name,
            "projects/test-proj/locations/europe-west1/keyRings/kr-abc123"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_key_ring_failures_are_retried() {
        let kms = Arc::new(MockKmsClient::new().with_key_ring_failures(vec![lag(), lag()]));
        let start = Instant::now();

        let hierarchy = provisioner(kms.clone(), RetryConfig::default())
            .provision()
            .await
            .unwrap();

        assert_eq!(kms.key_ring_calls(), 3);
        assert_eq!(kms.crypto_key_calls(), 1);
        // 1s + 2s backoff
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert!(!hierarchy.crypto_key.name.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_lag_ends_in_deadline_without_crypto_key() {
        let kms = Arc::new(MockKmsClient::new().with_key_ring_error(lag()));
        let start = Instant::now();

        let err = provisioner(kms.clone(), short_deadline())
            .provision()
            .await
            .unwrap_err();

        match &err {
            KeyHierarchyError::KeyRingDeadline { last, attempts, .. } => {
                assert_eq!(last.code, StatusCode::Unauthenticated);
                assert_eq!(*attempts as usize, kms.key_ring_calls());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(kms.crypto_key_calls(), 0);
        assert!(start.elapsed() <= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_key_ring_error_is_not_retried() {
        let kms = Arc::new(MockKmsClient::new().with_key_ring_error(ApiError::new(
            StatusCode::PermissionDenied,
            OP_CREATE_KEY_RING,
            "denied",
        )));

        let err = provisioner(kms.clone(), RetryConfig::default())
            .provision()
            .await
            .unwrap_err();

        assert!(matches!(err, KeyHierarchyError::Api(ref e) if e.code == StatusCode::PermissionDenied));
        assert_eq!(kms.key_ring_calls(), 1);
        assert_eq!(kms.crypto_key_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn crypto_key_failure_is_not_retried_even_if_transient() {
        let kms = Arc::new(MockKmsClient::new().with_crypto_key_error(ApiError::new(
            StatusCode::Unauthenticated,
            OP_CREATE_CRYPTO_KEY,
            "lag",
        )));

        let err = provisioner(kms.clone(), RetryConfig::default())
            .provision()
            .await
            .unwrap_err();

        assert!(matches!(err, KeyHierarchyError::Api(_)));
        assert_eq!(kms.crypto_key_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_name_in_response_is_rejected() {
        let kms = Arc::new(MockKmsClient::new().with_missing_names());
        let err = provisioner(kms, RetryConfig::default())
            .provision()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KeyHierarchyError::Provision(ProvisionError::MissingField { field: "name", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_generated_id_is_rejected_before_calling_kms() {
        let kms = Arc::new(MockKmsClient::new());
        let provisioner = KeyHierarchyProvisioner::new(
            kms.clone(),
            identity(),
            "global",
            RetryConfig::default(),
            Arc::new(BadIds),
        );
        let err = provisioner.provision().await.unwrap_err();
        assert!(matches!(
            err,
            KeyHierarchyError::Provision(ProvisionError::InvalidResourceId { .. })
        ));
        assert_eq!(kms.key_ring_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stage_reports_deadline_as_top_level_error() {
        let kms = Arc::new(MockKmsClient::new().with_key_ring_error(lag()));
        let stage = provisioner(kms, short_deadline());
        assert_eq!(stage.name(), "key-hierarchy");

        let err = stage.run(()).await.unwrap_err();
        assert!(err.is_deadline_exceeded());
    }
}
