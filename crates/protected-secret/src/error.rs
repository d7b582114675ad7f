//! 보호 시크릿 프로비저너 에러 타입

use cmekcheck_core::error::{ApiError, CmekCheckError, ConfigError, ProvisionError};

/// 보호 시크릿 프로비저닝 에러
#[derive(Debug, thiserror::Error)]
pub enum ProtectedSecretError {
    /// Secret Manager 에러 (재시도하지 않음)
    #[error("secret manager error: {0}")]
    Api(#[from] ApiError),

    /// 응답 검증 또는 ID 검증 실패
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// 유효하지 않은 payload 크기
    #[error("payload length {len} is out of range (1-{max})")]
    InvalidPayloadLength { len: usize, max: usize },
}

impl From<ProtectedSecretError> for CmekCheckError {
    fn from(err: ProtectedSecretError) -> Self {
        match err {
            ProtectedSecretError::Api(err) => CmekCheckError::Api(err),
            ProtectedSecretError::Provision(err) => CmekCheckError::Provision(err),
            ProtectedSecretError::InvalidPayloadLength { .. } => {
                CmekCheckError::Config(ConfigError::InvalidValue {
                    field: "secret_manager.payload_len".to_owned(),
                    reason: err.to_string(),
                })
            }
        }
    }
}
