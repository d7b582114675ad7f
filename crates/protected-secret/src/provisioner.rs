//! 보호 시크릿 프로비저너 -- CMEK로 보호되는 시크릿과 버전 생성
//!
//! 1. `projects/{p}` 아래에 자동 복제 + CMEK(`kmsKeyName` = 암호화 키 전체 이름)
//!    정책의 시크릿을 생성합니다.
//! 2. OS 난수원에서 payload를 생성합니다 (기본 1바이트).
//! 3. payload를 담은 시크릿 버전을 추가합니다.
//!
//! 어떤 호출도 재시도하지 않으며, 다시 읽거나 복호화하지 않습니다.

use std::sync::Arc;

use bytes::Bytes;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use tracing::info;

use cmekcheck_core::config::MAX_PAYLOAD_LEN;
use cmekcheck_core::error::{CmekCheckError, ProvisionError};
use cmekcheck_core::metrics as m;
use cmekcheck_core::naming::{IdGenerator, ResourceKind, validate_resource_id};
use cmekcheck_core::pipeline::Stage;
use cmekcheck_core::types::IdentityContext;
use cmekcheck_key_hierarchy::CryptoKey;

use crate::error::ProtectedSecretError;
use crate::secret_manager::{
    AddSecretVersionRequest, CreateSecretRequest, Secret, SecretManagerClient, SecretVersion,
};

/// 생성된 보호 시크릿 (보고용)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtectedSecret {
    pub secret: Secret,
    pub version: SecretVersion,
}

/// 보호 시크릿 프로비저너
pub struct ProtectedSecretProvisioner<S: SecretManagerClient> {
    secrets: Arc<S>,
    identity: IdentityContext,
    payload_len: usize,
    ids: Arc<dyn IdGenerator>,
}

impl<S: SecretManagerClient> ProtectedSecretProvisioner<S> {
    /// 새 프로비저너를 생성합니다.
    pub fn new(
        secrets: Arc<S>,
        identity: IdentityContext,
        payload_len: usize,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            secrets,
            identity,
            payload_len,
            ids,
        }
    }

    /// 암호화 키로 보호되는 시크릿과 버전 하나를 생성합니다.
    pub async fn provision(
        &self,
        crypto_key: &CryptoKey,
    ) -> Result<ProtectedSecret, ProtectedSecretError> {
        if crypto_key.name.is_empty() {
            return Err(ProvisionError::MissingField {
                resource: "crypto key",
                field: "name",
            }
            .into());
        }

        let secret = self.create_secret(&crypto_key.name).await?;
        let payload = random_payload(self.payload_len)?;
        let version = self.add_version(&secret, payload).await?;

        Ok(ProtectedSecret { secret, version })
    }

    /// CMEK 정책의 시크릿을 생성합니다.
    pub async fn create_secret(&self, kms_key_name: &str) -> Result<Secret, ProtectedSecretError> {
        let secret_id = self.ids.generate(ResourceKind::Secret);
        validate_resource_id(&secret_id)?;

        let request = CreateSecretRequest {
            parent: self.identity.project_parent(),
            secret_id,
            secret: Secret::with_cmek(kms_key_name),
        };
        let secret = self.secrets.create_secret(request).await?;

        if secret.name.is_empty() {
            return Err(ProvisionError::MissingField {
                resource: "secret",
                field: "name",
            }
            .into());
        }
        // 응답에 정책이 없으면 검사하지 않음
        if let Some(actual) = secret.cmek_key_name() {
            if actual != kms_key_name {
                return Err(ProvisionError::CmekMismatch {
                    secret: secret.name.clone(),
                    expected: kms_key_name.to_owned(),
                    actual: actual.to_owned(),
                }
                .into());
            }
        }

        info!(
            secret = secret.name.as_str(),
            kms_key = kms_key_name,
            "secret created"
        );
        metrics::counter!(m::RESOURCES_CREATED_TOTAL, m::LABEL_KIND => ResourceKind::Secret.as_str())
            .increment(1);

        Ok(secret)
    }

    /// 시크릿에 payload 버전을 추가합니다.
    pub async fn add_version(
        &self,
        secret: &Secret,
        payload: Bytes,
    ) -> Result<SecretVersion, ProtectedSecretError> {
        let payload_len = payload.len();
        let request = AddSecretVersionRequest {
            parent: secret.name.clone(),
            payload,
        };
        let version = self.secrets.add_secret_version(request).await?;

        if version.name.is_empty() {
            return Err(ProvisionError::MissingField {
                resource: "secret version",
                field: "name",
            }
            .into());
        }

        info!(
            version = version.name.as_str(),
            payload_len, "secret version added"
        );
        metrics::counter!(m::RESOURCES_CREATED_TOTAL, m::LABEL_KIND => "secret_version")
            .increment(1);

        Ok(version)
    }
}

/// `len` 바이트의 암호학적 난수 payload를 생성합니다.
pub fn random_payload(len: usize) -> Result<Bytes, ProtectedSecretError> {
    if len == 0 || len > MAX_PAYLOAD_LEN {
        return Err(ProtectedSecretError::InvalidPayloadLength {
            len,
            max: MAX_PAYLOAD_LEN,
        });
    }
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    Ok(Bytes::from(buf))
}

impl<S: SecretManagerClient> Stage<CryptoKey> for ProtectedSecretProvisioner<S> {
    type Output = ProtectedSecret;

    fn name(&self) -> &str {
        "protected-secret"
    }

    async fn run(&self, input: CryptoKey) -> Result<ProtectedSecret, CmekCheckError> {
        Ok(self.provision(&input).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cmekcheck_core::error::ApiError;
    use cmekcheck_core::status::StatusCode;

    use crate::secret_manager::{MockSecretManagerClient, OP_ADD_SECRET_VERSION, OP_CREATE_SECRET};

    const KEY: &str =
        "projects/test-proj/locations/global/keyRings/kr-abc123/cryptoKeys/key-xyz789";

    struct FixedIds;

    impl IdGenerator for FixedIds {
        fn generate(&self, _kind: ResourceKind) -> String {
            "sec-qqq111".to_owned()
        }
    }

    fn crypto_key() -> CryptoKey {
        CryptoKey {
            name: KEY.to_owned(),
            purpose: "ENCRYPT_DECRYPT".to_owned(),
            ..Default::default()
        }
    }

    fn provisioner(
        secrets: Arc<MockSecretManagerClient>,
        payload_len: usize,
    ) -> ProtectedSecretProvisioner<MockSecretManagerClient> {
        let identity =
            IdentityContext::new("test-proj", "tester@test-proj.iam.gserviceaccount.com").unwrap();
        ProtectedSecretProvisioner::new(secrets, identity, payload_len, Arc::new(FixedIds))
    }

    #[tokio::test]
    async fn provisions_cmek_secret_with_one_byte_version() {
        let secrets = Arc::new(MockSecretManagerClient::new());
        let result = provisioner(secrets.clone(), 1)
            .provision(&crypto_key())
            .await
            .unwrap();

        assert_eq!(result.secret.name, "projects/test-proj/secrets/sec-qqq111");
        assert_eq!(result.secret.cmek_key_name(), Some(KEY));
        assert_eq!(
            result.version.name,
            "projects/test-proj/secrets/sec-qqq111/versions/1"
        );

        let secret_requests = secrets.secret_requests.lock().unwrap();
        assert_eq!(secret_requests[0].parent, "projects/test-proj");
        assert_eq!(secret_requests[0].secret_id, "sec-qqq111");
        assert_eq!(secret_requests[0].secret.cmek_key_name(), Some(KEY));

        let version_requests = secrets.version_requests.lock().unwrap();
        assert_eq!(version_requests[0].parent, result.secret.name);
        assert_eq!(version_requests[0].payload.len(), 1);
    }

    #[tokio::test]
    async fn configurable_payload_length() {
        let secrets = Arc::new(MockSecretManagerClient::new());
        provisioner(secrets.clone(), 32)
            .provision(&crypto_key())
            .await
            .unwrap();
        assert_eq!(secrets.version_requests.lock().unwrap()[0].payload.len(), 32);
    }

    #[tokio::test]
    async fn secret_creation_failure_skips_version() {
        let secrets = Arc::new(MockSecretManagerClient::new().with_secret_error(ApiError::new(
            StatusCode::Unauthenticated,
            OP_CREATE_SECRET,
            "lag",
        )));
        let err = provisioner(secrets.clone(), 1)
            .provision(&crypto_key())
            .await
            .unwrap_err();

        assert!(matches!(err, ProtectedSecretError::Api(ref e) if e.code == StatusCode::Unauthenticated));
        // 재시도 없음
        assert_eq!(secrets.secret_calls(), 1);
        assert_eq!(secrets.version_calls(), 0);
    }

    #[tokio::test]
    async fn version_failure_is_reported() {
        let secrets = Arc::new(MockSecretManagerClient::new().with_version_error(ApiError::new(
            StatusCode::FailedPrecondition,
            OP_ADD_SECRET_VERSION,
            "key disabled",
        )));
        let err = provisioner(secrets.clone(), 1)
            .provision(&crypto_key())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtectedSecretError::Api(ref e) if e.operation == OP_ADD_SECRET_VERSION));
        assert_eq!(secrets.version_calls(), 1);
    }

    #[tokio::test]
    async fn mismatched_cmek_key_is_rejected() {
        let secrets = Arc::new(MockSecretManagerClient::new().with_echoed_key("other-key"));
        let err = provisioner(secrets.clone(), 1)
            .provision(&crypto_key())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProtectedSecretError::Provision(ProvisionError::CmekMismatch { .. })
        ));
        assert_eq!(secrets.version_calls(), 0);
    }

    #[tokio::test]
    async fn unnamed_crypto_key_is_rejected() {
        let secrets = Arc::new(MockSecretManagerClient::new());
        let err = provisioner(secrets.clone(), 1)
            .provision(&CryptoKey::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtectedSecretError::Provision(_)));
        assert_eq!(secrets.secret_calls(), 0);
    }

    #[test]
    fn random_payload_has_requested_length() {
        assert_eq!(random_payload(1).unwrap().len(), 1);
        assert_eq!(random_payload(MAX_PAYLOAD_LEN).unwrap().len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn random_payload_rejects_out_of_range() {
        assert!(random_payload(0).is_err());
        assert!(random_payload(MAX_PAYLOAD_LEN + 1).is_err());
    }

    #[test]
    fn random_payload_varies() {
        let a = random_payload(32).unwrap();
        let b = random_payload(32).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn stage_runs_with_crypto_key_input() {
        let secrets = Arc::new(MockSecretManagerClient::new());
        let stage = provisioner(secrets, 1);
        assert_eq!(stage.name(), "protected-secret");
        let result = stage.run(crypto_key()).await.unwrap();
        assert_eq!(result.secret.cmek_key_name(), Some(KEY));
    }
}
